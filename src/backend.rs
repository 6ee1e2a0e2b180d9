pub mod backend;
pub mod dispatch_queue;
pub mod functional_unit;
pub mod register_file;
pub mod result_bus;
pub mod scheduling_window;

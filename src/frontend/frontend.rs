use std::cell::RefCell;
use std::rc::Rc;

use log::info;

use crate::backend::dispatch_queue::DispatchQueue;
use crate::cpu::{CPUConfig, PerfCounters, Trace};
use crate::instructions::instructions::{InstrTable, RawInstr};

/// Where the frontend pulls its instructions from. Returning None signals
/// the end of the instruction stream; the source isn't asked again afterwards.
pub(crate) trait InstrSource {
    fn next_instr(&mut self) -> Option<RawInstr>;
}

pub(crate) struct FrontendControl {
    // set once the instruction source has run dry
    pub(crate) exhausted: bool,
}

pub(crate) struct Frontend {
    instr_table: Rc<RefCell<InstrTable>>,
    dispatch_queue: Rc<RefCell<DispatchQueue>>,
    n_wide: u8,
    frontend_control: Rc<RefCell<FrontendControl>>,
    source_option: Option<Box<dyn InstrSource>>,
    trace: Trace,
    perf_counters: Rc<RefCell<PerfCounters>>,
}

impl Frontend {
    pub(crate) fn new(cpu_config: &CPUConfig,
                      instr_table: Rc<RefCell<InstrTable>>,
                      dispatch_queue: Rc<RefCell<DispatchQueue>>,
                      frontend_control: Rc<RefCell<FrontendControl>>,
                      perf_counters: Rc<RefCell<PerfCounters>>,
    ) -> Frontend {
        Frontend {
            instr_table,
            dispatch_queue,
            n_wide: cpu_config.fetch_width,
            frontend_control,
            source_option: None,
            trace: cpu_config.trace.clone(),
            perf_counters,
        }
    }

    pub(crate) fn init(&mut self, source: Box<dyn InstrSource>) {
        self.source_option = Some(source);
        self.frontend_control.borrow_mut().exhausted = false;
    }

    // Fetch and decode only happen in the second half of the cycle, after all other stages.
    pub(crate) fn do_cycle(&mut self) {
        let source = match &mut self.source_option {
            None => return,
            Some(source) => source,
        };

        let mut frontend_control = self.frontend_control.borrow_mut();
        if frontend_control.exhausted {
            return;
        }

        let mut instr_table = self.instr_table.borrow_mut();
        let mut dispatch_queue = self.dispatch_queue.borrow_mut();
        let mut perf_counters = self.perf_counters.borrow_mut();
        let cycle = perf_counters.cycle_cnt;

        for _ in 0..self.n_wide {
            let raw = match source.next_instr() {
                Some(raw) => raw,
                None => {
                    frontend_control.exhausted = true;
                    break;
                }
            };

            let id = instr_table.allocate(&raw, cycle);
            dispatch_queue.enqueue(id);
            perf_counters.fetched_cnt += 1;

            if self.trace.fetch {
                info!("Fetched {} [{}]", instr_table.get(id), raw);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instructions::instructions::{OpClass, Program};

    struct CountingSource {
        remaining: u32,
        calls: Rc<RefCell<u32>>,
    }

    impl InstrSource for CountingSource {
        fn next_instr(&mut self) -> Option<RawInstr> {
            *self.calls.borrow_mut() += 1;
            if self.remaining == 0 {
                return None;
            }
            self.remaining -= 1;
            Some(RawInstr::new(OpClass::K0, None, [None, None]))
        }
    }

    fn new_frontend(fetch_width: u8) -> (Frontend, Rc<RefCell<InstrTable>>, Rc<RefCell<DispatchQueue>>, Rc<RefCell<FrontendControl>>) {
        let mut cpu_config = CPUConfig::default();
        cpu_config.fetch_width = fetch_width;
        let instr_table = Rc::new(RefCell::new(InstrTable::new()));
        let dispatch_queue = Rc::new(RefCell::new(DispatchQueue::new()));
        let frontend_control = Rc::new(RefCell::new(FrontendControl { exhausted: false }));
        let perf_counters = Rc::new(RefCell::new(PerfCounters::new()));
        let frontend = Frontend::new(
            &cpu_config,
            Rc::clone(&instr_table),
            Rc::clone(&dispatch_queue),
            Rc::clone(&frontend_control),
            perf_counters,
        );
        (frontend, instr_table, dispatch_queue, frontend_control)
    }

    #[test]
    fn test_fetch_width() {
        let (mut frontend, instr_table, dispatch_queue, frontend_control) = new_frontend(2);
        let raw = RawInstr::new(OpClass::K1, Some(1), [None, None]);
        frontend.init(Box::new(Program::new(vec![raw; 5])));

        frontend.do_cycle();
        assert_eq!(dispatch_queue.borrow().iter().collect::<Vec<_>>(), vec![1, 2]);
        assert!(!frontend_control.borrow().exhausted);

        frontend.do_cycle();
        frontend.do_cycle();
        assert_eq!(instr_table.borrow().size(), 5);
        assert!(frontend_control.borrow().exhausted);
    }

    #[test]
    fn test_no_reads_after_exhausted() {
        let (mut frontend, _, _, frontend_control) = new_frontend(4);
        let calls = Rc::new(RefCell::new(0));
        frontend.init(Box::new(CountingSource { remaining: 1, calls: Rc::clone(&calls) }));

        frontend.do_cycle();
        assert!(frontend_control.borrow().exhausted);
        assert_eq!(*calls.borrow(), 2);

        frontend.do_cycle();
        assert_eq!(*calls.borrow(), 2);
    }
}

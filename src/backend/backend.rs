use std::cell::RefCell;
use std::rc::Rc;

use log::info;

use crate::backend::dispatch_queue::DispatchQueue;
use crate::backend::functional_unit::FUPool;
use crate::backend::register_file::RegFile;
use crate::backend::result_bus::CDBTable;
use crate::backend::scheduling_window::SchedulingWindow;
use crate::cpu::{CPUConfig, PerfCounters, Trace};
use crate::frontend::frontend::FrontendControl;
use crate::instructions::instructions::{InstrTable, OpClass, RegisterType, SOURCE_COUNT};

/// Every stage does part of its work in the first half of a clock cycle and
/// the rest in the second half.
#[derive(Clone, Copy, PartialEq, Debug)]
pub(crate) enum CycleHalf {
    First,
    Second,
}

pub(crate) struct Backend {
    instr_table: Rc<RefCell<InstrTable>>,
    dispatch_queue: Rc<RefCell<DispatchQueue>>,
    frontend_control: Rc<RefCell<FrontendControl>>,
    perf_counters: Rc<RefCell<PerfCounters>>,
    pub(crate) reg_file: RegFile,
    pub(crate) cdb_table: CDBTable,
    pub(crate) fu_pool: FUPool,
    pub(crate) window: SchedulingWindow,
    // the units of the instructions that completed this cycle; returned after the broadcast.
    fu_release_buffer: Vec<OpClass>,
    trace: Trace,
    pub(crate) finished: bool,
}

impl Backend {
    pub(crate) fn new(cpu_config: &CPUConfig,
                      instr_table: Rc<RefCell<InstrTable>>,
                      dispatch_queue: Rc<RefCell<DispatchQueue>>,
                      frontend_control: Rc<RefCell<FrontendControl>>,
                      perf_counters: Rc<RefCell<PerfCounters>>) -> Backend {
        Backend {
            instr_table,
            dispatch_queue,
            frontend_control,
            perf_counters,
            reg_file: RegFile::new(cpu_config.register_count),
            cdb_table: CDBTable::new(cpu_config.result_bus_count),
            fu_pool: FUPool::new(cpu_config.fu_count),
            window: SchedulingWindow::new(cpu_config.window_capacity()),
            fu_release_buffer: Vec::new(),
            trace: cpu_config.trace.clone(),
            finished: false,
        }
    }

    // The stages run in a fixed order: state update, execute, schedule, dispatch.
    // Once the last instruction retired, the remainder of the cycle is skipped.
    pub(crate) fn do_cycle_half(&mut self, half: CycleHalf) {
        self.cycle_state_update(half);
        if self.finished {
            return;
        }
        self.cycle_execute(half);
        self.cycle_schedule(half);
        self.cycle_dispatch(half);
    }

    // After the last instruction retired no bus, unit, window slot or register claim is held.
    pub(crate) fn is_drained(&self) -> bool {
        self.window.is_empty()
            && self.dispatch_queue.borrow().is_empty()
            && self.cdb_table.busy_count() == 0
            && OpClass::ALL.iter().all(|op_class| self.fu_pool.idle(*op_class) == self.fu_pool.capacity(*op_class))
            && (0..self.reg_file.count()).all(|reg| self.reg_file.get(reg as RegisterType).ready)
    }

    fn cycle_state_update(&mut self, half: CycleHalf) {
        let mut instr_table = self.instr_table.borrow_mut();
        let mut perf_counters = self.perf_counters.borrow_mut();
        let cycle = perf_counters.cycle_cnt;

        match half {
            CycleHalf::First => {
                for id in self.window.iter() {
                    let instr = instr_table.get_mut(id);
                    if instr.executed && !instr.is_retired() {
                        instr.cycle_state_update = cycle;
                    }
                }
            }
            CycleHalf::Second => {
                let trace = self.trace.retire;
                let retired = self.window.remove_if(|id| {
                    let instr = instr_table.get(id);
                    if instr.is_retired() && trace {
                        info!("Retired {}", instr);
                    }
                    instr.is_retired()
                });
                perf_counters.retired_cnt += retired;

                if self.frontend_control.borrow().exhausted
                    && perf_counters.retired_cnt == perf_counters.fetched_cnt {
                    self.finished = true;
                }
            }
        }
    }

    fn cycle_execute(&mut self, half: CycleHalf) {
        match half {
            CycleHalf::First => {
                let mut instr_table = self.instr_table.borrow_mut();
                let mut perf_counters = self.perf_counters.borrow_mut();
                let cycle = perf_counters.cycle_cnt;

                for id in self.window.iter() {
                    let instr = instr_table.get_mut(id);
                    if !instr.fired || instr.executed {
                        continue;
                    }

                    if let Some(dest_reg) = instr.dest_reg {
                        if !self.cdb_table.has_idle() {
                            // no bus to publish the result on; try again next cycle
                            perf_counters.bus_stall_cnt += 1;
                            continue;
                        }
                        self.cdb_table.allocate(id, dest_reg);
                    }

                    instr.cycle_execute = cycle;
                    instr.executed = true;
                    self.fu_release_buffer.push(instr.op_class);
                    perf_counters.execute_cnt += 1;

                    if self.trace.execute {
                        info!("Executed {}", instr);
                    }
                }
            }
            CycleHalf::Second => self.cdb_broadcast(),
        }
    }

    // Wakes up every waiting source operand and register that matches the tag
    // on a busy bus. Afterwards all buses and the units of the completed
    // instructions are free again.
    fn cdb_broadcast(&mut self) {
        let mut instr_table = self.instr_table.borrow_mut();

        for cdb in self.cdb_table.busy() {
            if self.trace.broadcast {
                info!("Broadcast tag {} on CDB {} for R{}", cdb.tag, cdb.index, cdb.dest_reg);
            }

            for id in self.window.iter() {
                let instr = instr_table.get_mut(id);
                for k in 0..SOURCE_COUNT {
                    if !instr.src_ready[k] && instr.src_tag[k] == cdb.tag {
                        instr.src_ready[k] = true;
                        instr.src_tag[k] = 0;
                    }
                }
            }

            self.reg_file.resolve(cdb.dest_reg, cdb.tag);
        }

        self.cdb_table.release_all();
        for op_class in self.fu_release_buffer.drain(..) {
            self.fu_pool.deallocate(op_class);
        }
    }

    fn cycle_schedule(&mut self, half: CycleHalf) {
        let mut instr_table = self.instr_table.borrow_mut();
        let mut perf_counters = self.perf_counters.borrow_mut();
        let cycle = perf_counters.cycle_cnt;

        match half {
            CycleHalf::First => {
                for id in self.window.iter() {
                    let instr = instr_table.get_mut(id);
                    if instr.fired {
                        continue;
                    }

                    if instr.cycle_schedule == 0 {
                        instr.cycle_schedule = cycle;
                        if self.trace.schedule {
                            info!("Scheduled {}", instr);
                        }
                    }

                    if instr.sources_ready() {
                        instr.fire = true;
                    }
                }
            }
            CycleHalf::Second => {
                for id in self.window.iter() {
                    let instr = instr_table.get_mut(id);
                    if !instr.fire || instr.fired {
                        continue;
                    }

                    debug_assert!(instr.sources_ready());
                    if !instr.sources_ready() {
                        continue;
                    }

                    if !self.fu_pool.has_idle(instr.op_class) {
                        perf_counters.fu_stall_cnt += 1;
                        continue;
                    }

                    self.fu_pool.allocate(instr.op_class);
                    instr.fired = true;
                    instr.cycle_fire = cycle;
                    perf_counters.fire_cnt += 1;

                    if self.trace.schedule {
                        info!("Fired {}", instr);
                    }
                }
            }
        }
    }

    fn cycle_dispatch(&mut self, half: CycleHalf) {
        let mut instr_table = self.instr_table.borrow_mut();
        let mut dispatch_queue = self.dispatch_queue.borrow_mut();

        match half {
            CycleHalf::First => {
                {
                    let mut perf_counters = self.perf_counters.borrow_mut();
                    let size = dispatch_queue.size() as u64;
                    perf_counters.sum_disp_size += size;
                    if size > perf_counters.max_disp_size {
                        perf_counters.max_disp_size = size;
                    }
                }

                // instructions that retire in this cycle don't count; their slot can be reused.
                let resident = self.window.iter()
                    .filter(|id| !instr_table.get(*id).is_retired())
                    .count();
                let reserved = dispatch_queue.iter()
                    .filter(|id| instr_table.get(*id).reserved)
                    .count();
                let mut available = self.window.capacity.saturating_sub(resident + reserved);

                for id in dispatch_queue.iter() {
                    if available == 0 {
                        break;
                    }

                    let instr = instr_table.get_mut(id);
                    if instr.reserved {
                        continue;
                    }

                    instr.reserved = true;
                    available -= 1;
                }
            }
            CycleHalf::Second => {
                while let Some(id) = dispatch_queue.peek() {
                    let instr = instr_table.get_mut(id);
                    if !instr.reserved {
                        // the window is full; everything behind it has to wait as well
                        break;
                    }

                    for k in 0..SOURCE_COUNT {
                        match instr.src_reg[k] {
                            Some(reg) => {
                                let entry = self.reg_file.get(reg);
                                instr.src_ready[k] = entry.ready;
                                instr.src_tag[k] = if entry.ready { 0 } else { entry.tag };
                            }
                            None => {
                                instr.src_ready[k] = true;
                                instr.src_tag[k] = 0;
                            }
                        }
                    }

                    // sources are read before the destination is claimed, so an
                    // instruction can read the register it overwrites.
                    if let Some(dest_reg) = instr.dest_reg {
                        self.reg_file.claim(dest_reg, id);
                    }

                    self.window.insert(id);
                    dispatch_queue.dequeue();

                    if self.trace.dispatch {
                        info!("Dispatched {}", instr);
                    }
                }
            }
        }
    }
}

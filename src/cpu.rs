use std::cell::RefCell;
use std::error::Error;
use std::fmt;
use std::fs::File;
use std::rc::Rc;

use log::info;
use serde::Deserialize;

use crate::backend::backend::{Backend, CycleHalf};
use crate::backend::dispatch_queue::DispatchQueue;
use crate::frontend::frontend::{Frontend, FrontendControl, InstrSource};
use crate::instructions::instructions::{CycleType, Instr, InstrId, InstrTable, OP_CLASS_COUNT};

pub(crate) struct PerfCounters {
    pub cycle_cnt: u64,
    pub fetched_cnt: u64,
    pub fire_cnt: u64,
    pub execute_cnt: u64,
    pub retired_cnt: u64,
    // fired instructions that couldn't complete for lack of a result bus
    pub bus_stall_cnt: u64,
    // eligible instructions that couldn't fire for lack of a functional unit
    pub fu_stall_cnt: u64,
    pub sum_disp_size: u64,
    pub max_disp_size: u64,
}

impl PerfCounters {
    pub fn new() -> Self {
        Self {
            cycle_cnt: 1,
            fetched_cnt: 0,
            fire_cnt: 0,
            execute_cnt: 0,
            retired_cnt: 0,
            bus_stall_cnt: 0,
            fu_stall_cnt: 0,
            sum_disp_size: 0,
            max_disp_size: 0,
        }
    }
}

#[derive(Clone, Deserialize, Debug, Default)]
#[serde(default)]
pub(crate) struct Trace {
    pub fetch: bool,
    pub dispatch: bool,
    pub schedule: bool,
    pub execute: bool,
    pub broadcast: bool,
    pub retire: bool,
    pub cycle: bool,
}

#[derive(Clone, Copy, Deserialize, Debug, PartialEq)]
pub(crate) struct DumpRange {
    pub(crate) begin: InstrId,
    pub(crate) end: InstrId,
}

impl DumpRange {
    pub(crate) fn contains(&self, id: InstrId) -> bool {
        id >= self.begin && id <= self.end
    }
}

fn default_register_count() -> u16 {
    64
}

#[derive(Clone, Deserialize, Debug)]
pub(crate) struct CPUConfig {
    // the number of result buses (common data buses)
    pub(crate) result_bus_count: u16,
    // the number of functional units per op class
    pub(crate) fu_count: [u16; OP_CLASS_COUNT],
    // the number of instructions the frontend can fetch/decode per clock cycle.
    pub(crate) fetch_width: u8,
    // the number of architectural registers
    #[serde(default = "default_register_count")]
    pub(crate) register_count: u16,
    // the instructions for which the stage timestamps are printed
    #[serde(default)]
    pub(crate) dump: Option<DumpRange>,
    // if processing of a single instruction should be traced (logged)
    #[serde(default)]
    pub(crate) trace: Trace,
}

impl CPUConfig {
    // Twice the number of functional units, to give enough look-ahead.
    pub(crate) fn window_capacity(&self) -> usize {
        2 * self.fu_count.iter().map(|count| *count as usize).sum::<usize>()
    }
}

impl Default for CPUConfig {
    fn default() -> Self {
        CPUConfig {
            result_bus_count: 2,
            fu_count: [3, 2, 1],
            fetch_width: 4,
            register_count: default_register_count(),
            dump: None,
            trace: Trace::default(),
        }
    }
}

pub fn load_cpu_config(file_path: &str) -> Result<CPUConfig, Box<dyn Error>> {
    let file = File::open(file_path)?;
    let config = serde_yaml::from_reader(file)?;
    Ok(config)
}

/// The statistics of a completed run.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Stats {
    pub(crate) cycle_count: u64,
    pub(crate) retired_instruction: u64,
    pub(crate) fired_instruction: u64,
    pub(crate) sum_disp_size: u64,
    pub(crate) max_disp_size: u64,
    pub(crate) bus_stalls: u64,
    pub(crate) fu_stalls: u64,
    pub(crate) avg_disp_size: f64,
    pub(crate) avg_inst_retired: f64,
}

impl Stats {
    fn new(perf_counters: &PerfCounters) -> Stats {
        let cycles = perf_counters.cycle_cnt as f64;
        Stats {
            cycle_count: perf_counters.cycle_cnt,
            retired_instruction: perf_counters.retired_cnt,
            fired_instruction: perf_counters.fire_cnt,
            sum_disp_size: perf_counters.sum_disp_size,
            max_disp_size: perf_counters.max_disp_size,
            bus_stalls: perf_counters.bus_stall_cnt,
            fu_stalls: perf_counters.fu_stall_cnt,
            avg_disp_size: perf_counters.sum_disp_size as f64 / cycles,
            avg_inst_retired: perf_counters.retired_cnt as f64 / cycles,
        }
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Processor stats:")?;
        writeln!(f, "Total instructions: {}", self.retired_instruction)?;
        writeln!(f, "Avg Dispatch queue size: {:.6}", self.avg_disp_size)?;
        writeln!(f, "Maximum Dispatch queue size: {}", self.max_disp_size)?;
        writeln!(f, "Avg inst retired per cycle: {:.6}", self.avg_inst_retired)?;
        writeln!(f, "Result bus stalls: {}", self.bus_stalls)?;
        writeln!(f, "Functional unit stalls: {}", self.fu_stalls)?;
        write!(f, "Total run time (cycles): {}", self.cycle_count)
    }
}

/// The stage timestamps of a single retired instruction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct DumpRow {
    pub(crate) id: InstrId,
    pub(crate) fetch: CycleType,
    pub(crate) dispatch: CycleType,
    pub(crate) schedule: CycleType,
    pub(crate) execute: CycleType,
    pub(crate) state_update: CycleType,
}

pub(crate) const DUMP_HEADER: &str = "INST\tFETCH\tDISP\tSCHED\tEXEC\tSTATE";

impl DumpRow {
    fn new(instr: &Instr) -> DumpRow {
        DumpRow {
            id: instr.id,
            fetch: instr.cycle_fetch_decode,
            dispatch: instr.cycle_dispatch,
            schedule: instr.cycle_schedule,
            execute: instr.cycle_execute,
            state_update: instr.cycle_state_update,
        }
    }
}

impl fmt::Display for DumpRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}\t{}\t{}\t{}\t{}",
               self.id, self.fetch, self.dispatch, self.schedule, self.execute, self.state_update)
    }
}

pub(crate) struct CPU {
    pub(crate) backend: Backend,
    frontend: Frontend,
    pub(crate) instr_table: Rc<RefCell<InstrTable>>,
    pub(crate) dispatch_queue: Rc<RefCell<DispatchQueue>>,
    trace: Trace,
    dump: Option<DumpRange>,
    pub(crate) perf_counters: Rc<RefCell<PerfCounters>>,
}

impl CPU {
    pub(crate) fn new(cpu_config: &CPUConfig) -> CPU {
        let instr_table = Rc::new(RefCell::new(InstrTable::new()));

        let dispatch_queue = Rc::new(RefCell::new(DispatchQueue::new()));

        let perf_counters = Rc::new(RefCell::new(PerfCounters::new()));

        let frontend_control = Rc::new(RefCell::new(
            FrontendControl { exhausted: false }));

        let backend = Backend::new(
            cpu_config,
            Rc::clone(&instr_table),
            Rc::clone(&dispatch_queue),
            Rc::clone(&frontend_control),
            Rc::clone(&perf_counters),
        );

        let frontend = Frontend::new(
            cpu_config,
            Rc::clone(&instr_table),
            Rc::clone(&dispatch_queue),
            Rc::clone(&frontend_control),
            Rc::clone(&perf_counters),
        );

        CPU {
            backend,
            frontend,
            instr_table,
            dispatch_queue,
            trace: cpu_config.trace.clone(),
            dump: cpu_config.dump,
            perf_counters,
        }
    }

    pub(crate) fn init(&mut self, source: Box<dyn InstrSource>) {
        self.frontend.init(source);
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.backend.finished
    }

    // Runs a single clock cycle. The cycle counter is not advanced by the
    // cycle in which the last instruction retires.
    pub(crate) fn do_cycle(&mut self) {
        if self.backend.finished {
            return;
        }

        self.backend.do_cycle_half(CycleHalf::First);
        self.backend.do_cycle_half(CycleHalf::Second);
        if self.backend.finished {
            return;
        }
        self.frontend.do_cycle();

        let mut perf_counters = self.perf_counters.borrow_mut();
        if self.trace.cycle {
            info!("[Cycles:{}][Fetched={}][Fired={}][Executed={}][Retired={}][IPC={:.2}]",
                  perf_counters.cycle_cnt,
                  perf_counters.fetched_cnt,
                  perf_counters.fire_cnt,
                  perf_counters.execute_cnt,
                  perf_counters.retired_cnt,
                  perf_counters.retired_cnt as f32 / perf_counters.cycle_cnt as f32
            );
        }
        perf_counters.cycle_cnt += 1;
    }

    // There is no cycle limit; if the source never runs dry or an op class
    // without functional units is needed, this doesn't return.
    pub(crate) fn run(&mut self, source: Box<dyn InstrSource>) -> Stats {
        self.init(source);

        while !self.backend.finished {
            self.do_cycle();
        }

        debug_assert!(self.backend.is_drained());
        debug_assert_eq!(self.instr_table.borrow().size() as u64, self.perf_counters.borrow().fetched_cnt);

        info!("Simulation complete after {} cycles", self.perf_counters.borrow().cycle_cnt);
        self.stats()
    }

    pub(crate) fn stats(&self) -> Stats {
        Stats::new(&self.perf_counters.borrow())
    }

    pub(crate) fn dump_rows(&self) -> Vec<DumpRow> {
        let dump = match self.dump {
            None => return Vec::new(),
            Some(dump) => dump,
        };

        self.instr_table.borrow()
            .iter()
            .filter(|instr| instr.is_retired() && dump.contains(instr.id))
            .map(DumpRow::new)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_cpu_config() {
        let yaml = r#"
result_bus_count: 4
fu_count: [1, 2, 3]
fetch_width: 8
dump:
  begin: 10
  end: 20
trace:
  retire: true
"#;
        let config: CPUConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.result_bus_count, 4);
        assert_eq!(config.fu_count, [1, 2, 3]);
        assert_eq!(config.fetch_width, 8);
        assert_eq!(config.register_count, 64);
        assert_eq!(config.dump, Some(DumpRange { begin: 10, end: 20 }));
        assert!(config.trace.retire);
        assert!(!config.trace.fetch);
        assert_eq!(config.window_capacity(), 12);
    }

    #[test]
    fn test_load_cpu_config_missing_field() {
        let yaml = "result_bus_count: 4\nfetch_width: 8\n";
        assert!(serde_yaml::from_str::<CPUConfig>(yaml).is_err());
    }

    #[test]
    fn test_load_cpu_config_missing_file() {
        assert!(load_cpu_config("/nonexistent/cpu.yaml").is_err());
    }

    #[test]
    fn test_stats_averages() {
        let mut perf_counters = PerfCounters::new();
        perf_counters.cycle_cnt = 8;
        perf_counters.retired_cnt = 4;
        perf_counters.sum_disp_size = 6;
        perf_counters.max_disp_size = 3;

        let stats = Stats::new(&perf_counters);
        assert_eq!(stats.avg_inst_retired, 0.5);
        assert_eq!(stats.avg_disp_size, 0.75);
        assert!(format!("{}", stats).contains("Total run time (cycles): 8"));
    }

    #[test]
    fn test_dump_range() {
        let dump = DumpRange { begin: 2, end: 4 };
        assert!(!dump.contains(1));
        assert!(dump.contains(2));
        assert!(dump.contains(4));
        assert!(!dump.contains(5));
    }
}

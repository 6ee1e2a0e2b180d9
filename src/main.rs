use std::path::PathBuf;
use std::process::exit;

use env_logger::Env;
use log::{error, info};
use structopt::StructOpt;

use crate::cpu::{CPU, CPUConfig, DUMP_HEADER, DumpRange, load_cpu_config};
use crate::loader::loader::load;

mod cpu;
mod loader;
mod frontend;
mod backend;
mod instructions;


#[derive(StructOpt, Debug)]
#[structopt(name = "Superscalar Pipeline Simulator")]
struct Opt {
    /// Path of the instruction trace to simulate
    #[structopt(long, parse(from_os_str))]
    file: PathBuf,

    /// Sets a custom config file
    #[structopt(short, long, parse(from_os_str), default_value = "cpu.yaml")]
    config: PathBuf,

    /// Number of result buses
    #[structopt(short = "r", long)]
    result_buses: Option<u16>,

    /// Number of k0 functional units
    #[structopt(short = "j", long)]
    k0: Option<u16>,

    /// Number of k1 functional units
    #[structopt(short = "k", long)]
    k1: Option<u16>,

    /// Number of k2 functional units
    #[structopt(short = "l", long)]
    k2: Option<u16>,

    /// Number of instructions fetched per cycle
    #[structopt(short = "f", long)]
    fetch_width: Option<u8>,

    /// First instruction id for which the stage timestamps are printed
    #[structopt(short = "b", long)]
    begin_dump: Option<u64>,

    /// Last instruction id for which the stage timestamps are printed
    #[structopt(short = "e", long)]
    end_dump: Option<u64>,
}

impl Opt {
    fn apply(&self, cpu_config: &mut CPUConfig) {
        if let Some(result_buses) = self.result_buses {
            cpu_config.result_bus_count = result_buses;
        }
        for (k, count) in [self.k0, self.k1, self.k2].iter().enumerate() {
            if let Some(count) = count {
                cpu_config.fu_count[k] = *count;
            }
        }
        if let Some(fetch_width) = self.fetch_width {
            cpu_config.fetch_width = fetch_width;
        }
        if let Some(begin) = self.begin_dump {
            cpu_config.dump = Some(DumpRange { begin, end: self.end_dump.unwrap_or(begin) });
        }
    }
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let opt = Opt::from_args();

    let cpu_config_path = opt.config.display().to_string();
    let mut cpu_config = match load_cpu_config(&cpu_config_path) {
        Ok(config) => config,
        Err(err) => {
            error!("Failed to load {}. Cause: {}", cpu_config_path, err);
            exit(1);
        }
    };
    opt.apply(&mut cpu_config);

    info!("Processor settings: R={} k0={} k1={} k2={} F={} window={}",
          cpu_config.result_bus_count,
          cpu_config.fu_count[0],
          cpu_config.fu_count[1],
          cpu_config.fu_count[2],
          cpu_config.fetch_width,
          cpu_config.window_capacity());

    let path = opt.file.display().to_string();
    info!("Loading {}", path);
    let program = match load(&cpu_config, &path) {
        Ok(program) => program,
        Err(err) => {
            error!("Loading trace '{}' failed: {}", path, err);
            exit(1);
        }
    };

    let mut cpu = CPU::new(&cpu_config);
    let stats = cpu.run(Box::new(program));

    if cpu_config.dump.is_some() {
        println!("{}", DUMP_HEADER);
        for row in cpu.dump_rows() {
            println!("{}", row);
        }
        println!();
    }

    println!("{}", stats);
}

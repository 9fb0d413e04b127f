use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::filter::LevelFilter;

use nocsim::config::SimConfig;
use nocsim::sim::Sim;

#[derive(Parser)]
#[command(version, about)]
struct NocsimArgs {
    /// Enable per-event tracing
    #[arg(short = 'd', long = "debug")]
    debug: bool,

    /// Simulation configuration file (YAML or JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Stop after this many cycles
    #[arg(long)]
    max_cycles: Option<u64>,
}

pub fn main() {
    let argv = NocsimArgs::parse();

    let mut config = match &argv.config {
        Some(path) => match SimConfig::from_file(path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("error: {}", err);
                std::process::exit(1);
            }
        },
        None => SimConfig::default(),
    };
    if argv.debug {
        config.debug = true;
    }
    if argv.max_cycles.is_some() {
        config.max_cycles = argv.max_cycles;
    }

    let level = if config.debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .without_time()
        .init();

    let mut sim = match Sim::new(config) {
        Ok(sim) => sim,
        Err(err) => {
            eprintln!("error: {}", err);
            std::process::exit(1);
        }
    };

    let max_cycles = sim.config().max_cycles;
    sim.run(max_cycles);

    print!("{}", sim.report().summary());
}

//! Trace-driven L2 cache simulator: feeds a trace file through the cache
//! core and records every bus event, L2→L1 message, and state transition in
//! the simulation log.

mod output;
mod trace;

use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use llc_core::Cache;
use output::SimulationWriter;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum Mode {
    /// Only the summary and cache dumps reach the console
    Silent,
    /// Echo every event to stdout as well as the log file
    Normal,
}

#[derive(Debug, Parser)]
struct Args {
    /// Console verbosity; the log file receives every event either way
    #[arg(value_enum, default_value_t = Mode::Silent)]
    mode: Mode,

    /// Trace file to simulate
    #[arg(default_value = "rwims.din")]
    trace_file: PathBuf,

    /// Simulation log file
    #[arg(long, default_value = "simulation_output.txt")]
    output: PathBuf,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let trace_file = File::open(&args.trace_file)
        .with_context(|| format!("failed to open trace file '{}'", args.trace_file.display()))?;
    let mut writer = SimulationWriter::create(&args.output, args.mode == Mode::Normal)
        .with_context(|| format!("failed to create output file '{}'", args.output.display()))?;

    log::info!("starting simulation with trace file '{}'", args.trace_file.display());

    let mut cache = Cache::new();
    for (line_number, line) in BufReader::new(trace_file).lines().enumerate() {
        let line = line
            .with_context(|| format!("failed to read '{}'", args.trace_file.display()))?;
        match trace::parse_trace_line(&line) {
            Ok(Some(op)) => {
                writer.log_operation(op);
                let result = cache.apply(op, &mut writer);
                writer.log_result(&cache, result);
            }
            Ok(None) => {}
            Err(error) => writer.log_parse_error(line_number + 1, &line, &error),
        }
    }

    writer.log_summary(cache.stats());
    writer
        .finish()
        .context("failed to write the simulation log")?;

    Ok(())
}

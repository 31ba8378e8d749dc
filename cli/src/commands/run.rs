//! Run command implementation
//!
//! Profiles the built-in toy interpreter with the real interval timer.

use anyhow::{Context, Result};
use clap::Args;
use std::time::Instant;
use tracing::{debug, info};

use super::ProfilerArgs;
use crate::output::{self, Report};
use crate::toyvm::{Interpreter, ToyVm};
use ticktally::Profiler;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// How long to run the workload (e.g., "2s", "500ms")
    #[arg(short, long, default_value = "2s")]
    pub duration: String,

    #[command(flatten)]
    pub profiler: ProfilerArgs,

    /// Write the result as JSON to this path ("-" for stdout)
    #[arg(long)]
    pub json: Option<String>,

    /// Number of functions to print
    #[arg(short = 'n', long, default_value = "20")]
    pub top: usize,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

pub fn run(args: RunArgs) -> Result<()> {
    let duration = ticktally_shared::utils::parse_duration(&args.duration)
        .context("Failed to parse duration")?;
    let config = args.profiler.resolve()?;

    info!(
        "Profiling toy workload for {:?} at {:.0} Hz",
        duration,
        config.sample_rate_hz()
    );

    let mut profiler = Profiler::with_interval_timer(ToyVm::new(), config.clone())
        .context("Failed to create profiler")?;
    profiler.start().context("Failed to start profiler")?;

    let started = Instant::now();
    let mut rounds = 0u64;
    let mut checksum = 0u64;
    {
        let mut interp = Interpreter::new(&mut profiler);
        while started.elapsed() < duration {
            checksum = checksum.wrapping_add(interp.workload().context("Workload failed")?);
            rounds += 1;
        }
    }
    debug!("Ran {} rounds (checksum {:#x})", rounds, checksum);

    let total = profiler.stop().context("Failed to stop profiler")?;
    let table = profiler
        .result()
        .context("Failed to collect profile")?
        .context("Profiler produced no result")?;
    let report = Report::new(table, &config, total);

    if !report.accurate {
        output::warning("Some samples were lost while spilling; percentages may be off");
    }

    match args.json.as_deref() {
        Some("-") => {
            let json = serde_json::to_string_pretty(&report).context("Failed to encode report")?;
            println!("{}", json);
        }
        Some(path) => {
            let json = serde_json::to_string_pretty(&report).context("Failed to encode report")?;
            std::fs::write(path, json).with_context(|| format!("Failed to write {}", path))?;
            report.print(args.top);
            output::success(&format!("JSON report written to {}", path));
        }
        None => report.print(args.top),
    }

    Ok(())
}

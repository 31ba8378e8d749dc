//! Config command implementation

use anyhow::{Context, Result};
use clap::Args;

use super::ProfilerArgs;

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(flatten)]
    pub profiler: ProfilerArgs,
}

/// Print the effective configuration as TOML
pub fn run(args: ConfigArgs) -> Result<()> {
    let config = args.profiler.resolve()?;
    let text = toml::to_string_pretty(&config).context("Failed to render configuration")?;
    print!("{}", text);
    Ok(())
}

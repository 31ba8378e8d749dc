//! CLI for ticktally
//!
//! Commands:
//! - run: profile the built-in toy interpreter with `SIGPROF` sampling
//! - config: print the effective profiler configuration

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod output;
mod toyvm;

#[derive(Parser)]
#[command(name = "ticktally")]
#[command(about = "ticktally - sampling and call-counting profiler", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Profile the built-in toy interpreter
    Run(commands::run::RunArgs),

    /// Print the effective configuration as TOML
    Config(commands::config::ConfigArgs),
}

fn main() -> Result<()> {
    color_eyre::install().map_err(|e| anyhow::anyhow!("{}", e))?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => {
            init_tracing(args.verbose);
            commands::run::run(args)
        }
        Commands::Config(args) => commands::config::run(args),
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

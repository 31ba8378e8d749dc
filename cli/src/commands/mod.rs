//! Subcommand implementations

pub mod config;
pub mod run;

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;
use ticktally::ProfilerConfig;

/// Profiler settings shared by every subcommand.
///
/// Layered lowest to highest: built-in defaults and `TICKTALLY_*`
/// environment variables, then the TOML file, then these flags.
#[derive(Args, Debug, Default, Clone)]
pub struct ProfilerArgs {
    /// Profiler configuration file (TOML)
    #[arg(short, long, env = "TICKTALLY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Sampling period in milliseconds
    #[arg(short = 'p', long)]
    pub period_ms: Option<u64>,

    /// Samples held in memory before spilling to disk
    #[arg(long)]
    pub sample_buffer: Option<usize>,

    /// Call-site entries buffered before a flush
    #[arg(long)]
    pub count_buffer: Option<usize>,

    /// Directory for the anonymous spill file
    #[arg(long)]
    pub spill_dir: Option<PathBuf>,
}

impl ProfilerArgs {
    /// Resolve the effective, validated configuration
    pub fn resolve(&self) -> Result<ProfilerConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                toml::from_str(&text)
                    .with_context(|| format!("Failed to parse config file {}", path.display()))?
            }
            None => ProfilerConfig::default(),
        };

        if let Some(ms) = self.period_ms {
            config.sample_period = Duration::from_millis(ms);
        }
        if let Some(n) = self.sample_buffer {
            config.sample_buffer_capacity = n;
        }
        if let Some(n) = self.count_buffer {
            config.count_buffer_capacity = n;
        }
        if let Some(dir) = &self.spill_dir {
            config.spill_dir = Some(dir.clone());
        }

        config.validate().context("Invalid profiler configuration")?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_flags_override_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "sample_period_ms = 5\nsample_buffer_capacity = 64").unwrap();

        let args = ProfilerArgs {
            config: Some(file.path().to_path_buf()),
            sample_buffer: Some(8),
            ..Default::default()
        };
        let config = args.resolve().unwrap();

        assert_eq!(config.sample_period, Duration::from_millis(5));
        assert_eq!(config.sample_buffer_capacity, 8);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let args = ProfilerArgs {
            period_ms: Some(0),
            ..Default::default()
        };
        let err = args.resolve().unwrap_err();
        assert!(format!("{:#}", err).contains("sample period"));
    }

    #[test]
    fn test_missing_file_is_reported() {
        let args = ProfilerArgs {
            config: Some(PathBuf::from("/nonexistent/ticktally.toml")),
            ..Default::default()
        };
        assert!(args.resolve().is_err());
    }
}

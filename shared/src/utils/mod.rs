//! Utility functions and helpers

use anyhow::{Context, Result};
use std::time::Duration;

/// Parse a duration string (e.g., "250ms", "30s", "5m", "1h").
///
/// A bare number is taken as seconds.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    let parse = |num: &str| -> Result<u64> {
        num.trim()
            .parse()
            .with_context(|| format!("invalid duration: {:?}", s))
    };
    let scaled = |num: &str, unit: u64| -> Result<u64> {
        parse(num)?
            .checked_mul(unit)
            .with_context(|| format!("duration out of range: {:?}", s))
    };

    if let Some(num_str) = s.strip_suffix("ms") {
        Ok(Duration::from_millis(parse(num_str)?))
    } else if let Some(num_str) = s.strip_suffix('s') {
        Ok(Duration::from_secs(parse(num_str)?))
    } else if let Some(num_str) = s.strip_suffix('m') {
        Ok(Duration::from_secs(scaled(num_str, 60)?))
    } else if let Some(num_str) = s.strip_suffix('h') {
        Ok(Duration::from_secs(scaled(num_str, 3600)?))
    } else {
        Ok(Duration::from_secs(parse(s)?))
    }
}

//! Configuration types for the profiler

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ProfilerError;

/// Default sampling period (10 ms)
pub const DEFAULT_SAMPLE_PERIOD: Duration = Duration::from_millis(10);

/// Default number of samples held in memory before spilling
pub const DEFAULT_SAMPLE_BUFFER: usize = 4096;

/// Default number of call-site entries buffered before a flush
pub const DEFAULT_COUNT_BUFFER: usize = 4096;

/// Largest accepted capacity for either buffer (16 MiB of spill scratch)
pub const MAX_BUFFER_CAPACITY: usize = 1 << 20;

const MIN_SAMPLE_PERIOD: Duration = Duration::from_millis(1);
const MAX_SAMPLE_PERIOD: Duration = Duration::from_secs(1);

/// Profiler configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilerConfig {
    /// Interval between profiling ticks
    #[serde(rename = "sample_period_ms", with = "millis")]
    pub sample_period: Duration,

    /// Capacity of the in-memory sample buffer, in samples
    pub sample_buffer_capacity: usize,

    /// Capacity of the call-count buffer, in entries
    pub count_buffer_capacity: usize,

    /// Directory for the anonymous spill file (None = system temp dir)
    pub spill_dir: Option<PathBuf>,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            sample_period: env_parse("TICKTALLY_SAMPLE_PERIOD_MS")
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_SAMPLE_PERIOD),
            sample_buffer_capacity: env_parse("TICKTALLY_SAMPLE_BUFFER")
                .unwrap_or(DEFAULT_SAMPLE_BUFFER),
            count_buffer_capacity: env_parse("TICKTALLY_COUNT_BUFFER")
                .unwrap_or(DEFAULT_COUNT_BUFFER),
            spill_dir: std::env::var_os("TICKTALLY_SPILL_DIR").map(PathBuf::from),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

impl ProfilerConfig {
    pub fn with_sample_period(mut self, period: Duration) -> Self {
        self.sample_period = period;
        self
    }

    pub fn with_sample_buffer(mut self, capacity: usize) -> Self {
        self.sample_buffer_capacity = capacity;
        self
    }

    pub fn with_count_buffer(mut self, capacity: usize) -> Self {
        self.count_buffer_capacity = capacity;
        self
    }

    pub fn with_spill_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.spill_dir = Some(dir.into());
        self
    }

    /// Sampling rate in Hz implied by the period
    pub fn sample_rate_hz(&self) -> f64 {
        if self.sample_period.is_zero() {
            0.0
        } else {
            1.0 / self.sample_period.as_secs_f64()
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ProfilerError> {
        if self.sample_period < MIN_SAMPLE_PERIOD {
            return Err(ProfilerError::InvalidConfig(format!(
                "sample period {:?} is below the 1ms minimum",
                self.sample_period
            )));
        }
        if self.sample_period > MAX_SAMPLE_PERIOD {
            return Err(ProfilerError::InvalidConfig(format!(
                "sample period {:?} is above the 1s maximum",
                self.sample_period
            )));
        }
        check_capacity("sample buffer", self.sample_buffer_capacity)?;
        check_capacity("count buffer", self.count_buffer_capacity)?;
        Ok(())
    }
}

fn check_capacity(what: &str, capacity: usize) -> Result<(), ProfilerError> {
    if capacity == 0 {
        return Err(ProfilerError::InvalidConfig(format!(
            "{} capacity must be greater than 0",
            what
        )));
    }
    if capacity > MAX_BUFFER_CAPACITY {
        return Err(ProfilerError::InvalidConfig(format!(
            "{} capacity {} exceeds the maximum of {}",
            what, capacity, MAX_BUFFER_CAPACITY
        )));
    }
    Ok(())
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

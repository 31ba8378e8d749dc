//! Profiler error type

use std::io;
use thiserror::Error;

/// Errors surfaced by the control API.
///
/// Spill write failures are not represented here: they are counted and
/// reported through [`ticktally_shared::StatTable::spill_errors`].
#[derive(Debug, Error)]
pub enum ProfilerError {
    #[error("profiler is not supported")]
    NotSupported,

    #[error("invalid profiler configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to install profiling signal handler: {0}")]
    SignalInstall(#[source] io::Error),

    #[error("failed to change profiling signal mask: {0}")]
    SignalMask(#[source] io::Error),

    #[error("failed to arm interval timer: {0}")]
    TimerArm(#[source] io::Error),

    #[error("another profiler already owns the profiling signal")]
    Busy,

    #[error("failed to create spill file: {0}")]
    SpillCreate(#[source] io::Error),

    #[error("profiler: seek failed in retrieving sample data: {0}")]
    SpillSeek(#[source] io::Error),

    #[error("profiler: failed to read sample data: {0}")]
    SpillRead(#[source] io::Error),

    #[error("profiler: failed to truncate temporary file: {0}")]
    SpillTruncate(#[source] io::Error),
}

impl ProfilerError {
    /// True when profiling cannot meaningfully continue; callers should
    /// `reset()` before starting again.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            ProfilerError::NotSupported | ProfilerError::InvalidConfig(_) | ProfilerError::Busy
        )
    }
}

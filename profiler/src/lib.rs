//! Sampling and call-counting profiler for interpreters
//!
//! The host implements [`ExecutionContext`], calls
//! [`Profiler::record_call`] from every instrumented call site, and drives
//! the lifecycle with `start`, `stop`, `reset` and `result`. Samples are
//! taken on `SIGPROF` ticks from `ITIMER_PROF` (see [`timer`]) and land in a
//! fixed buffer that overflows into an anonymous temporary file.

pub mod config;
pub mod context;
pub mod error;
pub mod timer;

#[cfg(feature = "profiling")]
pub mod aggregate;
#[cfg(feature = "profiling")]
mod counter;
#[cfg(feature = "profiling")]
mod profiler;
#[cfg(feature = "profiling")]
mod recorder;
#[cfg(feature = "profiling")]
mod spill;

#[cfg(not(feature = "profiling"))]
mod unsupported;

pub use config::ProfilerConfig;
pub use context::{sample_frame, ExecutionContext};
pub use error::ProfilerError;
#[cfg(feature = "profiling")]
pub use profiler::Profiler;
#[cfg(not(feature = "profiling"))]
pub use unsupported::Profiler;

#[cfg(unix)]
pub use timer::IntervalTimer;
pub use timer::{ManualTicker, TickHook, TickSource};

pub use ticktally_shared::{FuncId, FuncStats, Pc, ProfilerState, Sample, StatRow, StatTable};

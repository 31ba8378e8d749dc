//! Tick sources
//!
//! A tick source periodically interrupts the profiled thread and runs the
//! installed [`TickHook`]. [`IntervalTimer`] does this with `ITIMER_PROF`
//! and `SIGPROF`; [`ManualTicker`] delivers ticks only when asked, which is
//! what deterministic hosts and tests use.

use std::fmt;

use crate::error::ProfilerError;

#[cfg(unix)]
pub mod interval;
pub mod manual;

#[cfg(unix)]
pub use interval::IntervalTimer;
pub use manual::ManualTicker;

/// Type-erased callback run on every tick.
#[derive(Clone, Copy)]
pub struct TickHook {
    target: *const (),
    deliver: unsafe fn(*const ()),
}

// Safety: the hook is only fired on the thread that installed it; the raw
// pointer merely rides along through statics and locks.
unsafe impl Send for TickHook {}
unsafe impl Sync for TickHook {}

impl TickHook {
    /// # Safety
    ///
    /// `deliver(target)` must be sound for as long as the hook stays
    /// installed in a tick source.
    pub unsafe fn new(target: *const (), deliver: unsafe fn(*const ())) -> Self {
        Self { target, deliver }
    }

    /// # Safety
    ///
    /// The hook's target must still be alive, and the call must not race
    /// with another `fire` of the same hook.
    pub unsafe fn fire(&self) {
        (self.deliver)(self.target)
    }
}

impl fmt::Debug for TickHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TickHook").field("target", &self.target).finish()
    }
}

/// Periodic interrupt source driving the sample recorder.
///
/// Between `arm` and `disarm` the hook may run at any instruction boundary
/// of the installing thread, including inside the profiler's own bookkeeping.
/// `arm` and `disarm` are also called from inside the hook and must be
/// async-signal-safe.
pub trait TickSource {
    /// Register the hook. Called once, on the thread being profiled.
    fn install(&self, hook: TickHook) -> Result<(), ProfilerError>;

    /// Forget the hook; later ticks are ignored.
    fn uninstall(&self);

    /// Start periodic ticks
    fn arm(&self) -> Result<(), ProfilerError>;

    /// Stop periodic ticks
    fn disarm(&self);

    /// Hold back ticks on the current thread until `unblock`
    fn block(&self) -> Result<(), ProfilerError>;

    /// Release ticks held back by `block`
    fn unblock(&self) -> Result<(), ProfilerError>;
}

//! Tick source driven by explicit calls

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use super::{TickHook, TickSource};
use crate::error::ProfilerError;

/// Delivers a tick each time [`ManualTicker::fire`] is called.
///
/// Mirrors signal semantics closely enough for the engine: ticks are dropped
/// while disarmed, and ticks fired while blocked collapse into one pending
/// tick that is delivered on `unblock`.
#[derive(Debug, Default)]
pub struct ManualTicker {
    hook: Mutex<Option<TickHook>>,
    armed: AtomicBool,
    blocked: AtomicBool,
    pending: AtomicBool,
    arms: AtomicU64,
    blocks: AtomicU64,
    deferred: AtomicU64,
    delivered: AtomicU64,
}

impl ManualTicker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver one tick. Returns true if the hook ran.
    pub fn fire(&self) -> bool {
        if !self.armed.load(Ordering::Acquire) {
            return false;
        }
        if self.blocked.load(Ordering::Acquire) {
            self.pending.store(true, Ordering::Release);
            self.deferred.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        let hook = match self.hook.lock() {
            Ok(guard) => *guard,
            Err(_) => None,
        };
        match hook {
            Some(hook) => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
                // Safety: the profiler uninstalls before its recorder is freed.
                unsafe { hook.fire() };
                true
            }
            None => false,
        }
    }

    /// Fire `n` ticks, returning how many reached the hook
    pub fn fire_n(&self, n: usize) -> usize {
        (0..n).filter(|_| self.fire()).count()
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    pub fn is_installed(&self) -> bool {
        self.hook.lock().map(|h| h.is_some()).unwrap_or(false)
    }

    /// Number of successful `arm` calls
    pub fn arm_count(&self) -> u64 {
        self.arms.load(Ordering::Relaxed)
    }

    /// Number of `block` calls
    pub fn block_count(&self) -> u64 {
        self.blocks.load(Ordering::Relaxed)
    }

    /// Ticks that arrived while blocked
    pub fn deferred(&self) -> u64 {
        self.deferred.load(Ordering::Relaxed)
    }

    /// Ticks that reached the hook
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }
}

impl TickSource for ManualTicker {
    fn install(&self, hook: TickHook) -> Result<(), ProfilerError> {
        let mut slot = self.hook.lock().map_err(|_| ProfilerError::Busy)?;
        if slot.is_some() {
            return Err(ProfilerError::Busy);
        }
        *slot = Some(hook);
        Ok(())
    }

    fn uninstall(&self) {
        if let Ok(mut slot) = self.hook.lock() {
            *slot = None;
        }
    }

    fn arm(&self) -> Result<(), ProfilerError> {
        self.armed.store(true, Ordering::Release);
        self.arms.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn disarm(&self) {
        self.armed.store(false, Ordering::Release);
    }

    fn block(&self) -> Result<(), ProfilerError> {
        self.blocked.store(true, Ordering::Release);
        self.blocks.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn unblock(&self) -> Result<(), ProfilerError> {
        self.blocked.store(false, Ordering::Release);
        if self.pending.swap(false, Ordering::AcqRel) {
            self.fire();
        }
        Ok(())
    }
}

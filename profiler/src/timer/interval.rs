//! `ITIMER_PROF` / `SIGPROF` tick source
//!
//! `setitimer(ITIMER_PROF)` is process-wide and the kernel may hand the
//! signal to any thread that does not block it. The handler bounces such
//! deliveries to the owning thread with `pthread_kill`, so the hook itself
//! only ever runs on the thread that installed it.

use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::io;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info};

use super::{TickHook, TickSource};
use crate::error::ProfilerError;

const SIG: Signal = Signal::SIGPROF;

/// Hook of the timer currently owning SIGPROF (null when none)
static ACTIVE_HOOK: AtomicPtr<TickHook> = AtomicPtr::new(ptr::null_mut());

/// `pthread_t` of the owning thread. Never freed, so forwarding threads can
/// read it without racing an uninstall.
static OWNER_THREAD: AtomicUsize = AtomicUsize::new(0);

/// Interval timer delivering SIGPROF every `period` of consumed CPU time.
///
/// Only one `IntervalTimer` can be installed per process at a time.
#[derive(Debug)]
pub struct IntervalTimer {
    period: Duration,
    hook: AtomicPtr<TickHook>,
}

impl IntervalTimer {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            hook: AtomicPtr::new(ptr::null_mut()),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    fn set_timer(period: Duration) -> io::Result<()> {
        let tv = libc::timeval {
            tv_sec: period.as_secs() as libc::time_t,
            tv_usec: period.subsec_micros() as libc::suseconds_t,
        };
        let value = libc::itimerval {
            it_interval: tv,
            it_value: tv,
        };
        // Safety: plain syscall on stack-owned values.
        let rc = unsafe { libc::setitimer(libc::ITIMER_PROF, &value, ptr::null_mut()) };
        if rc < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    fn mask() -> SigSet {
        let mut set = SigSet::empty();
        set.add(SIG);
        set
    }
}

impl TickSource for IntervalTimer {
    fn install(&self, hook: TickHook) -> Result<(), ProfilerError> {
        let boxed = Box::into_raw(Box::new(hook));
        if ACTIVE_HOOK
            .compare_exchange(ptr::null_mut(), boxed, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // Safety: `boxed` was never published.
            drop(unsafe { Box::from_raw(boxed) });
            return Err(ProfilerError::Busy);
        }
        // Safety: pthread_self has no preconditions.
        let owner = unsafe { libc::pthread_self() };
        OWNER_THREAD.store(owner as usize, Ordering::Release);

        let action = SigAction::new(
            SigHandler::Handler(on_profiling_signal),
            SaFlags::SA_RESTART,
            SigSet::all(),
        );
        // Safety: the handler only touches atomics and the installed hook.
        if let Err(errno) = unsafe { sigaction(SIG, &action) } {
            ACTIVE_HOOK.store(ptr::null_mut(), Ordering::Release);
            // Safety: unpublished again above; the handler was never installed.
            drop(unsafe { Box::from_raw(boxed) });
            return Err(ProfilerError::SignalInstall(errno.into()));
        }
        self.hook.store(boxed, Ordering::Release);

        info!("Installed SIGPROF handler ({:?} period)", self.period);
        Ok(())
    }

    fn uninstall(&self) {
        let hook = self.hook.swap(ptr::null_mut(), Ordering::AcqRel);
        if hook.is_null() {
            return;
        }
        let _ = ACTIVE_HOOK.compare_exchange(hook, ptr::null_mut(), Ordering::AcqRel, Ordering::Acquire);
        // Safety: we run on the owning thread, so the handler cannot be
        // inside `fire` right now, and ACTIVE_HOOK no longer points here.
        drop(unsafe { Box::from_raw(hook) });
        // The handler stays installed as a no-op: a late SIGPROF with the
        // default disposition would terminate the process.
        debug!("Uninstalled SIGPROF hook");
    }

    fn arm(&self) -> Result<(), ProfilerError> {
        Self::set_timer(self.period).map_err(ProfilerError::TimerArm)
    }

    fn disarm(&self) {
        let _ = Self::set_timer(Duration::ZERO);
    }

    fn block(&self) -> Result<(), ProfilerError> {
        Self::mask()
            .thread_block()
            .map_err(|e| ProfilerError::SignalMask(e.into()))
    }

    fn unblock(&self) -> Result<(), ProfilerError> {
        Self::mask()
            .thread_unblock()
            .map_err(|e| ProfilerError::SignalMask(e.into()))
    }
}

impl Drop for IntervalTimer {
    fn drop(&mut self) {
        // The itimer is process-wide; leave it alone unless we own it.
        if !self.hook.load(Ordering::Acquire).is_null() {
            self.disarm();
            self.uninstall();
        }
    }
}

extern "C" fn on_profiling_signal(sig: libc::c_int) {
    let saved = errno::save();

    let hook = ACTIVE_HOOK.load(Ordering::Acquire);
    if !hook.is_null() {
        let owner = OWNER_THREAD.load(Ordering::Acquire) as libc::pthread_t;
        // Safety: pthread_self/pthread_equal/pthread_kill are async-signal-safe.
        unsafe {
            if libc::pthread_equal(libc::pthread_self(), owner) != 0 {
                (*hook).fire();
            } else {
                libc::pthread_kill(owner, sig);
            }
        }
    }

    errno::restore(saved);
}

/// errno must survive the handler untouched.
mod errno {
    #[cfg(any(target_os = "linux", target_os = "android"))]
    fn location() -> Option<*mut libc::c_int> {
        // Safety: always returns the calling thread's errno slot.
        Some(unsafe { libc::__errno_location() })
    }

    #[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
    fn location() -> Option<*mut libc::c_int> {
        // Safety: always returns the calling thread's errno slot.
        Some(unsafe { libc::__error() })
    }

    #[cfg(not(any(
        target_os = "linux",
        target_os = "android",
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd"
    )))]
    fn location() -> Option<*mut libc::c_int> {
        None
    }

    pub(super) fn save() -> libc::c_int {
        // Safety: thread-local slot, valid for the thread's lifetime.
        location().map_or(0, |p| unsafe { *p })
    }

    pub(super) fn restore(value: libc::c_int) {
        if let Some(p) = location() {
            // Safety: as above.
            unsafe { *p = value };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_is_kept() {
        let timer = IntervalTimer::new(Duration::from_millis(10));
        assert_eq!(timer.period(), Duration::from_millis(10));
    }

    #[test]
    fn test_uninstall_without_install_is_noop() {
        let timer = IntervalTimer::new(Duration::from_millis(10));
        timer.uninstall();
        timer.disarm();
    }

    #[test]
    fn test_block_and_unblock_current_thread() {
        let timer = IntervalTimer::new(Duration::from_millis(10));
        timer.block().unwrap();
        let current = SigSet::thread_get_mask().unwrap();
        assert!(current.contains(SIG));
        timer.unblock().unwrap();
        let current = SigSet::thread_get_mask().unwrap();
        assert!(!current.contains(SIG));
    }
}

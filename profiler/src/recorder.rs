//! Sample recorder
//!
//! The tick hook lands here. Everything reachable from [`Recorder::on_tick`]
//! runs inside the signal handler, so it touches only atomics, the
//! preallocated sample buffer and the spill file descriptor.

use std::cell::UnsafeCell;
use std::marker::PhantomPinned;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use ticktally_shared::Sample;

use crate::config::ProfilerConfig;
use crate::context::{sample_frame, ExecutionContext};
use crate::spill::SpillStore;
use crate::timer::{TickHook, TickSource};

/// Fixed-capacity, preallocated run of samples in arrival order
pub(crate) struct SampleBuffer {
    slots: Box<[Sample]>,
    len: usize,
}

impl SampleBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![Sample::unknown(); capacity].into_boxed_slice(),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_full(&self) -> bool {
        self.len >= self.slots.len()
    }

    /// Returns false, dropping the sample, when full
    pub fn push(&mut self, sample: Sample) -> bool {
        match self.slots.get_mut(self.len) {
            Some(slot) => {
                *slot = sample;
                self.len += 1;
                true
            }
            None => false,
        }
    }

    pub fn as_slice(&self) -> &[Sample] {
        &self.slots[..self.len]
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }
}

/// State written by the tick hook
pub(crate) struct Buffers {
    pub samples: SampleBuffer,
    pub spill: SpillStore,
}

pub(crate) struct Recorder<C: ExecutionContext, T: TickSource> {
    context: Arc<C>,
    ticker: Arc<T>,
    running: AtomicBool,
    total_samples: AtomicU64,
    spill_errors: AtomicU32,
    rearm_errors: AtomicU32,
    /// Owned by the hook while `running`, by the control side otherwise.
    buffers: UnsafeCell<Buffers>,
    // The tick hook holds a raw pointer to us.
    _pinned: PhantomPinned,
}

impl<C: ExecutionContext, T: TickSource> Recorder<C, T> {
    pub fn new(context: Arc<C>, ticker: Arc<T>, config: &ProfilerConfig) -> Pin<Box<Self>> {
        let capacity = config.sample_buffer_capacity;
        Box::pin(Self {
            context,
            ticker,
            running: AtomicBool::new(false),
            total_samples: AtomicU64::new(0),
            spill_errors: AtomicU32::new(0),
            rearm_errors: AtomicU32::new(0),
            buffers: UnsafeCell::new(Buffers {
                samples: SampleBuffer::new(capacity),
                spill: SpillStore::new(capacity, config.spill_dir.clone()),
            }),
            _pinned: PhantomPinned,
        })
    }

    /// Hook that feeds ticks into this recorder.
    pub fn hook(self: Pin<&Self>) -> TickHook {
        let target = self.get_ref() as *const Self as *const ();
        // Safety: the recorder is pinned, and the profiler uninstalls the
        // hook before dropping it.
        unsafe { TickHook::new(target, deliver_tick::<C, T>) }
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn total_samples(&self) -> u64 {
        self.total_samples.load(Ordering::Relaxed)
    }

    pub fn spill_errors(&self) -> u32 {
        self.spill_errors.load(Ordering::Relaxed)
    }

    pub fn rearm_errors(&self) -> u32 {
        self.rearm_errors.load(Ordering::Relaxed)
    }

    pub fn reset_counters(&self) {
        self.total_samples.store(0, Ordering::Relaxed);
        self.spill_errors.store(0, Ordering::Relaxed);
        self.rearm_errors.store(0, Ordering::Relaxed);
    }

    /// Run `f` with exclusive access to the buffers.
    ///
    /// Recording is paused for the duration, so a tick that lands inside
    /// `f` returns without touching them.
    pub fn with_quiescent<R>(&self, f: impl FnOnce(&mut Buffers) -> R) -> R {
        let was_running = self.running.swap(false, Ordering::SeqCst);
        // Safety: with `running` false the hook never dereferences
        // `buffers`, and the hook only runs on this thread, so it cannot be
        // partway through an access either.
        let result = f(unsafe { &mut *self.buffers.get() });
        if was_running {
            self.running.store(true, Ordering::SeqCst);
        }
        result
    }

    /// One profiling tick. Runs in signal context while profiling.
    fn on_tick(&self) {
        if !self.running.load(Ordering::SeqCst) {
            return;
        }
        // Safety: `running` is only true outside `with_quiescent`, and the
        // control side leaves the buffers alone while running.
        let buffers = unsafe { &mut *self.buffers.get() };

        if buffers.samples.is_full() {
            // Keep the write itself free of nested ticks.
            self.ticker.disarm();
            if buffers.spill.append(buffers.samples.as_slice()).is_err() {
                self.spill_errors.fetch_add(1, Ordering::Relaxed);
            }
            buffers.samples.clear();
            if self.ticker.arm().is_err() {
                self.rearm_errors.fetch_add(1, Ordering::Relaxed);
            }
        }

        buffers.samples.push(sample_frame(&*self.context));
        self.total_samples.fetch_add(1, Ordering::Relaxed);
    }
}

/// # Safety
///
/// `target` must point to a live, pinned `Recorder<C, T>`.
unsafe fn deliver_tick<C: ExecutionContext, T: TickSource>(target: *const ()) {
    let recorder = &*(target as *const Recorder<C, T>);
    recorder.on_tick();
}

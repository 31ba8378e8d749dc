//! Profiler lifecycle and control API
//!
//! ```text
//!   Inactive --start--> Running --stop--> Paused --start--> Running
//!       ^                  |                 |
//!       +------reset-------+-------reset-----+
//! ```

use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use ticktally_shared::{FuncId, ProfilerState, StatTable};
use tracing::{debug, info, warn};

use crate::aggregate::{collect_samples, CollectStats};
use crate::config::ProfilerConfig;
use crate::context::ExecutionContext;
use crate::counter::{flush_counts, CountBuffer};
use crate::error::ProfilerError;
use crate::recorder::Recorder;
use crate::timer::TickSource;

/// Everything created on the first `start`
struct Session<C: ExecutionContext, T: TickSource> {
    recorder: Pin<Box<Recorder<C, T>>>,
    counts: CountBuffer,
    stats: StatTable,
}

/// Sampling and call-counting profiler for one execution context.
///
/// The profiler must be driven from the thread it profiles; it is neither
/// `Send` nor `Sync`. Dropping it stops profiling.
pub struct Profiler<C: ExecutionContext, T: TickSource> {
    config: ProfilerConfig,
    context: Arc<C>,
    ticker: Arc<T>,
    state: ProfilerState,
    session: Option<Session<C, T>>,
    // The tick source delivers to the thread that called `start`.
    _not_send: PhantomData<*const ()>,
}

#[cfg(unix)]
impl<C: ExecutionContext> Profiler<C, crate::timer::IntervalTimer> {
    /// Profiler driven by `ITIMER_PROF` at the configured period
    pub fn with_interval_timer(
        context: Arc<C>,
        config: ProfilerConfig,
    ) -> Result<Self, ProfilerError> {
        let timer = crate::timer::IntervalTimer::new(config.sample_period);
        Self::new(context, timer, config)
    }
}

impl<C: ExecutionContext, T: TickSource> Profiler<C, T> {
    /// Create an inactive profiler. Nothing is allocated until `start`.
    pub fn new(context: Arc<C>, ticker: T, config: ProfilerConfig) -> Result<Self, ProfilerError> {
        config.validate()?;
        Ok(Self {
            config,
            context,
            ticker: Arc::new(ticker),
            state: ProfilerState::Inactive,
            session: None,
            _not_send: PhantomData,
        })
    }

    pub fn state(&self) -> ProfilerState {
        self.state
    }

    pub fn config(&self) -> &ProfilerConfig {
        &self.config
    }

    pub fn context(&self) -> &Arc<C> {
        &self.context
    }

    pub fn ticker(&self) -> &T {
        &self.ticker
    }

    /// Samples taken since the last reset
    pub fn total_samples(&self) -> u64 {
        self.session
            .as_ref()
            .map_or(0, |s| s.recorder.total_samples())
    }

    /// Calls recorded but not yet flushed into the table
    pub fn pending_calls(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.counts.len())
    }

    /// Start or resume profiling.
    ///
    /// The first call installs the tick hook; later calls after `stop`
    /// resume with the accumulated table intact.
    pub fn start(&mut self) -> Result<(), ProfilerError> {
        if self.state == ProfilerState::Running {
            return Ok(());
        }

        if self.session.is_none() {
            let recorder = Recorder::new(self.context.clone(), self.ticker.clone(), &self.config);
            self.ticker.install(recorder.as_ref().hook())?;
            info!(
                "Profiler created: {:.0} Hz, {} sample slots, {} call slots",
                self.config.sample_rate_hz(),
                self.config.sample_buffer_capacity,
                self.config.count_buffer_capacity
            );
            self.session = Some(Session {
                recorder,
                counts: CountBuffer::new(self.config.count_buffer_capacity),
                stats: StatTable::new(),
            });
        }
        let Some(session) = self.session.as_ref() else {
            return Ok(());
        };

        session.recorder.with_quiescent(|b| b.spill.open())?;
        session.recorder.set_running(true);
        if let Err(e) = self.ticker.arm() {
            session.recorder.set_running(false);
            return Err(e);
        }

        let resumed = self.state == ProfilerState::Paused;
        self.state = ProfilerState::Running;
        info!("Profiler {}", if resumed { "resumed" } else { "started" });
        Ok(())
    }

    /// Pause profiling, returning the samples taken since the last reset.
    ///
    /// Returns 0 without touching anything unless running.
    pub fn stop(&mut self) -> Result<u64, ProfilerError> {
        if self.state != ProfilerState::Running {
            return Ok(0);
        }
        let Some(session) = self.session.as_ref() else {
            return Ok(0);
        };

        self.ticker.disarm();
        session.recorder.set_running(false);
        self.state = ProfilerState::Paused;

        let total = session.recorder.total_samples();
        info!("Profiler paused after {} samples", total);
        Ok(total)
    }

    /// Discard everything collected and return to `Inactive`.
    ///
    /// Closes the spill file; the next `start` opens a fresh one.
    pub fn reset(&mut self) -> Result<(), ProfilerError> {
        if self.state == ProfilerState::Inactive {
            return Ok(());
        }
        if self.state == ProfilerState::Running {
            self.stop()?;
        }

        if let Some(session) = self.session.as_mut() {
            session.recorder.with_quiescent(|b| {
                b.spill.close();
                b.samples.clear();
            });
            session.recorder.reset_counters();
            session.counts.clear();
            session.stats = StatTable::new();
        }
        self.state = ProfilerState::Inactive;
        info!("Profiler reset");
        Ok(())
    }

    /// Record one invocation of `func`. Call from every instrumented call
    /// site; a no-op unless running.
    #[inline]
    pub fn record_call(&mut self, func: FuncId) -> Result<(), ProfilerError> {
        if self.state != ProfilerState::Running {
            return Ok(());
        }
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        if session.counts.is_full() {
            flush_counts(
                &mut session.counts,
                &mut session.stats,
                &*self.context,
                &*self.ticker,
            )?;
        }
        session.counts.push(func);
        Ok(())
    }

    /// Fold buffered calls into the table now
    pub fn flush_counts(&mut self) -> Result<usize, ProfilerError> {
        match self.session.as_mut() {
            Some(session) => flush_counts(
                &mut session.counts,
                &mut session.stats,
                &*self.context,
                &*self.ticker,
            ),
            None => Ok(0),
        }
    }

    /// Stop if running, aggregate everything buffered, and expose the table.
    ///
    /// Returns `Ok(None)` when the profiler is inactive. Buffered samples
    /// are consumed, so a second call only adds what was recorded since.
    /// A spill seek, read or truncate failure resets the profiler before
    /// the error is returned.
    pub fn result(&mut self) -> Result<Option<&StatTable>, ProfilerError> {
        if self.state == ProfilerState::Inactive {
            return Ok(None);
        }
        if self.state == ProfilerState::Running {
            self.stop()?;
        }

        match self.collect() {
            Ok(()) => {}
            // Part of the spill may already be in the table; a retry would
            // count it twice.
            Err(
                e @ (ProfilerError::SpillSeek(_)
                | ProfilerError::SpillRead(_)
                | ProfilerError::SpillTruncate(_)),
            ) => {
                self.reset()?;
                return Err(e);
            }
            Err(e) => return Err(e),
        }

        Ok(self.session.as_ref().map(|s| &s.stats))
    }

    fn collect(&mut self) -> Result<(), ProfilerError> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };

        let spill_errors = session.recorder.spill_errors();
        if spill_errors > 0 {
            warn!(
                "profiler: an error occurred while saving profiling samples; \
                 the result may not be accurate"
            );
        }
        let rearm_errors = session.recorder.rearm_errors();
        if rearm_errors > 0 {
            warn!("profiler: failed to re-arm the interval timer {} time(s)", rearm_errors);
        }

        flush_counts(
            &mut session.counts,
            &mut session.stats,
            &*self.context,
            &*self.ticker,
        )?;

        let table = &mut session.stats;
        table.spill_errors = spill_errors;
        let collected = session.recorder.with_quiescent(|b| {
            debug!(
                "Collecting {} buffered and {} spilled samples",
                b.samples.len(),
                b.spill.records_written()
            );
            let mut collected = collect_samples(table, b.samples.as_slice());
            b.samples.clear();

            let replay = b.spill.replay(|chunk| collected += collect_samples(table, chunk))?;
            debug!(
                "Replayed {} spilled samples in {} chunks",
                replay.records, replay.chunks
            );
            b.spill.truncate()?;
            Ok::<CollectStats, ProfilerError>(collected)
        })?;

        if collected.uncounted > 0 {
            warn!(
                "profiler: {} uncounted object(s) appeared in samples",
                collected.uncounted
            );
        }
        info!(
            "Collected {} samples ({} counted) across {} functions",
            collected.total(),
            collected.counted,
            table.len()
        );
        Ok(())
    }
}

impl<C: ExecutionContext, T: TickSource> Drop for Profiler<C, T> {
    fn drop(&mut self) {
        if let Some(session) = self.session.as_ref() {
            self.ticker.disarm();
            session.recorder.set_running(false);
            self.ticker.uninstall();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::ManualTicker;
    use std::sync::atomic::{AtomicU64, Ordering};
    use ticktally_shared::Pc;

    #[derive(Default)]
    struct Vm {
        func: AtomicU64,
    }

    impl ExecutionContext for Vm {
        fn current_function(&self) -> Option<FuncId> {
            FuncId::from_raw(self.func.load(Ordering::Relaxed))
        }

        fn current_instruction(&self) -> Option<Pc> {
            Pc::from_raw(0x10)
        }
    }

    fn fid(raw: u64) -> FuncId {
        FuncId::from_raw(raw).unwrap()
    }

    fn profiler(samples: usize, counts: usize) -> Profiler<Vm, ManualTicker> {
        let config = ProfilerConfig::default()
            .with_sample_buffer(samples)
            .with_count_buffer(counts);
        Profiler::new(Arc::new(Vm::default()), ManualTicker::new(), config).unwrap()
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = ProfilerConfig::default().with_sample_buffer(0);
        let result = Profiler::new(Arc::new(Vm::default()), ManualTicker::new(), config);
        assert!(matches!(result, Err(ProfilerError::InvalidConfig(_))));
    }

    #[test]
    fn test_start_installs_once_and_arms() {
        let mut p = profiler(4, 4);
        assert!(!p.ticker().is_installed());

        p.start().unwrap();
        assert!(p.ticker().is_installed());
        assert!(p.ticker().is_armed());
        p.start().unwrap();
        assert_eq!(p.ticker().arm_count(), 1);

        p.stop().unwrap();
        assert!(!p.ticker().is_armed());
        p.start().unwrap();
        assert_eq!(p.ticker().arm_count(), 2);
    }

    #[test]
    fn test_calls_ignored_unless_running() {
        let mut p = profiler(4, 4);
        p.record_call(fid(1)).unwrap();
        p.start().unwrap();
        p.record_call(fid(1)).unwrap();
        p.stop().unwrap();
        p.record_call(fid(1)).unwrap();

        let table = p.result().unwrap().unwrap();
        assert_eq!(table.get(fid(1)).unwrap().calls, 1);
    }

    #[test]
    fn test_result_consumes_samples() {
        let mut p = profiler(2, 4);
        p.context().func.store(1, Ordering::Relaxed);
        p.start().unwrap();
        p.record_call(fid(1)).unwrap();
        p.ticker().fire_n(5);

        assert_eq!(p.result().unwrap().unwrap().get(fid(1)).unwrap().samples, 5);
        assert_eq!(p.state(), ProfilerState::Paused);
        assert_eq!(p.result().unwrap().unwrap().get(fid(1)).unwrap().samples, 5);
    }

    #[test]
    fn test_failed_replay_resets_instead_of_double_counting() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spill");
        std::fs::write(&path, [0u8; 32]).unwrap();

        let mut p = profiler(2, 4);
        p.context().func.store(1, Ordering::Relaxed);
        p.start().unwrap();
        p.record_call(fid(1)).unwrap();
        p.ticker().fire_n(5);

        let write_only = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        p.session
            .as_ref()
            .unwrap()
            .recorder
            .with_quiescent(|b| b.spill.replace_file(write_only));

        assert!(matches!(p.result(), Err(ProfilerError::SpillRead(_))));
        assert_eq!(p.state(), ProfilerState::Inactive);
        assert_eq!(p.total_samples(), 0);
        assert!(p.result().unwrap().is_none());
    }

    #[test]
    fn test_drop_uninstalls_hook() {
        let ticker = Arc::new(ManualTicker::new());
        {
            struct Shared(Arc<ManualTicker>);
            impl TickSource for Shared {
                fn install(&self, hook: crate::timer::TickHook) -> Result<(), ProfilerError> {
                    self.0.install(hook)
                }
                fn uninstall(&self) {
                    self.0.uninstall()
                }
                fn arm(&self) -> Result<(), ProfilerError> {
                    self.0.arm()
                }
                fn disarm(&self) {
                    self.0.disarm()
                }
                fn block(&self) -> Result<(), ProfilerError> {
                    self.0.block()
                }
                fn unblock(&self) -> Result<(), ProfilerError> {
                    self.0.unblock()
                }
            }

            let mut p = Profiler::new(
                Arc::new(Vm::default()),
                Shared(ticker.clone()),
                ProfilerConfig::default(),
            )
            .unwrap();
            p.start().unwrap();
            assert!(ticker.is_installed());
        }
        assert!(!ticker.is_installed());
        assert!(!ticker.is_armed());
        assert!(!ticker.fire());
    }
}

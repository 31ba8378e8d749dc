//! Profiler built without the `profiling` feature
//!
//! Keeps the control surface so hosts compile unchanged; every control
//! operation reports [`ProfilerError::NotSupported`].

use std::marker::PhantomData;
use std::sync::Arc;
use ticktally_shared::{FuncId, ProfilerState, StatTable};

use crate::config::ProfilerConfig;
use crate::context::ExecutionContext;
use crate::error::ProfilerError;
use crate::timer::TickSource;

pub struct Profiler<C: ExecutionContext, T: TickSource> {
    config: ProfilerConfig,
    context: Arc<C>,
    ticker: T,
    _not_send: PhantomData<*const ()>,
}

#[cfg(unix)]
impl<C: ExecutionContext> Profiler<C, crate::timer::IntervalTimer> {
    pub fn with_interval_timer(
        context: Arc<C>,
        config: ProfilerConfig,
    ) -> Result<Self, ProfilerError> {
        let timer = crate::timer::IntervalTimer::new(config.sample_period);
        Self::new(context, timer, config)
    }
}

impl<C: ExecutionContext, T: TickSource> Profiler<C, T> {
    pub fn new(context: Arc<C>, ticker: T, config: ProfilerConfig) -> Result<Self, ProfilerError> {
        config.validate()?;
        Ok(Self {
            config,
            context,
            ticker,
            _not_send: PhantomData,
        })
    }

    pub fn state(&self) -> ProfilerState {
        ProfilerState::Inactive
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

    pub fn total_samples(&self) -> u64 {
        0
    }

    pub fn pending_calls(&self) -> usize {
        0
    }

    pub fn start(&mut self) -> Result<(), ProfilerError> {
        Err(ProfilerError::NotSupported)
    }

    pub fn stop(&mut self) -> Result<u64, ProfilerError> {
        Err(ProfilerError::NotSupported)
    }

    pub fn reset(&mut self) -> Result<(), ProfilerError> {
        Err(ProfilerError::NotSupported)
    }

    pub fn result(&mut self) -> Result<Option<&StatTable>, ProfilerError> {
        Err(ProfilerError::NotSupported)
    }

    #[inline]
    pub fn record_call(&mut self, _func: FuncId) -> Result<(), ProfilerError> {
        Ok(())
    }

    pub fn flush_counts(&mut self) -> Result<usize, ProfilerError> {
        Ok(0)
    }
}

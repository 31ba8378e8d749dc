//! Call counter
//!
//! Instrumented call sites append to a fixed-capacity buffer; the buffer is
//! folded into the statistics table with profiling ticks blocked.

use ticktally_shared::{FuncId, StatTable};
use tracing::{debug, warn};

use crate::context::ExecutionContext;
use crate::error::ProfilerError;
use crate::timer::TickSource;

/// Fixed-capacity run of callee identities
#[derive(Debug)]
pub(crate) struct CountBuffer {
    entries: Vec<FuncId>,
    capacity: usize,
}

impl CountBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    /// Returns false, dropping the entry, when full
    pub fn push(&mut self, func: FuncId) -> bool {
        if self.is_full() {
            return false;
        }
        self.entries.push(func);
        true
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Ticks are held back for as long as this guard lives.
struct CriticalSection<'a, T: TickSource + ?Sized> {
    ticker: &'a T,
}

impl<'a, T: TickSource + ?Sized> CriticalSection<'a, T> {
    fn enter(ticker: &'a T) -> Result<Self, ProfilerError> {
        ticker.block()?;
        Ok(Self { ticker })
    }
}

impl<T: TickSource + ?Sized> Drop for CriticalSection<'_, T> {
    fn drop(&mut self) {
        if let Err(e) = self.ticker.unblock() {
            warn!("Failed to unblock profiling ticks: {}", e);
        }
    }
}

/// Fold buffered calls into `table`, returning how many were flushed.
///
/// Each callee is keyed by `context.canonical_identity`, so a method
/// wrapper and the body it runs share one entry with the sampler.
pub(crate) fn flush_counts<C, T>(
    buffer: &mut CountBuffer,
    table: &mut StatTable,
    context: &C,
    ticker: &T,
) -> Result<usize, ProfilerError>
where
    C: ExecutionContext + ?Sized,
    T: TickSource + ?Sized,
{
    if buffer.is_empty() {
        return Ok(0);
    }

    let flushed = {
        let _guard = CriticalSection::enter(ticker)?;
        let flushed = buffer.len();
        for func in buffer.entries.drain(..) {
            table.record_call(context.canonical_identity(func));
        }
        flushed
    };

    debug!("Flushed {} call-count entries", flushed);
    Ok(flushed)
}

//! Execution-context inspection
//!
//! The host interpreter implements [`ExecutionContext`] so the sampler can
//! ask "what is running right now" without knowing anything about frames,
//! bytecode or the object heap.

use ticktally_shared::{FuncId, Pc, Sample};

/// View of one interpreter's current call frame.
///
/// # Signal safety
///
/// `current_function`, `current_instruction` and `pending_return` are
/// called from the profiling signal handler, at an arbitrary point in the
/// host's execution. They must not allocate, lock, or block; reading a few
/// atomics is the expected implementation.
///
/// `canonical_identity` is only called from the call-count flush, outside
/// the signal handler.
pub trait ExecutionContext: Send + Sync + 'static {
    /// Function owning the active frame, or `None` when no frame is active
    fn current_function(&self) -> Option<FuncId>;

    /// Instruction address inside the active frame
    fn current_instruction(&self) -> Option<Pc>;

    /// When control sits on a return instruction and the pending result is
    /// itself a primitive function, that function.
    fn pending_return(&self) -> Option<FuncId> {
        None
    }

    /// Map a callee reference to the key shared with sampling.
    ///
    /// A method wrapper around an interpreted body should map to the body's
    /// identity, because that is what `current_function` reports while the
    /// body runs.
    fn canonical_identity(&self, func: FuncId) -> FuncId {
        func
    }
}

/// Decide what one tick should record.
///
/// A pending primitive at a return point wins over the returning frame: a
/// tail call into a primitive usually means the primitive is what is
/// actually running. This is a heuristic and can misattribute.
pub fn sample_frame<C: ExecutionContext + ?Sized>(ctx: &C) -> Sample {
    match ctx.current_function() {
        None => Sample::unknown(),
        Some(func) => match ctx.pending_return() {
            Some(primitive) => Sample::native(primitive),
            None => Sample::at(func, ctx.current_instruction()),
        },
    }
}

//! Toy interpreter used to drive the profiler end to end
//!
//! Functions are plain Rust closures wrapped in frame bookkeeping: every
//! call records itself with the profiler and publishes the active function
//! and instruction through atomics, which is all the sampler reads.

use std::hint::black_box;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use ticktally::{ExecutionContext, Profiler, ProfilerError, TickSource};
use ticktally_shared::{FuncId, Pc};

const fn func(raw: u64) -> FuncId {
    match FuncId::from_raw(raw) {
        Some(f) => f,
        None => panic!("function ids are non-zero"),
    }
}

pub const FIB: FuncId = func(1);
pub const SUM: FuncId = func(2);
pub const NORM: FuncId = func(3);
/// `Point#norm`, a method wrapper whose body is `NORM`
pub const POINT_NORM: FuncId = func(0x103);
/// Primitive reached as the tail call of `NORM`
pub const SQRT: FuncId = func(0x200);

const NAMES: [(FuncId, &str); 5] = [
    (FIB, "fib"),
    (SUM, "sum"),
    (NORM, "norm"),
    (POINT_NORM, "Point#norm"),
    (SQRT, "sqrt"),
];

pub fn name_of(func: FuncId) -> &'static str {
    NAMES
        .iter()
        .find(|(f, _)| *f == func)
        .map_or("<unknown>", |&(_, name)| name)
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    func: u64,
    pc: u64,
}

/// Frame registers read by the sampler
#[derive(Debug, Default)]
pub struct ToyVm {
    func: AtomicU64,
    pc: AtomicU64,
    pending: AtomicU64,
}

impl ToyVm {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn enter(&self, func: FuncId) -> Frame {
        let caller = Frame {
            func: self.func.swap(func.get(), Ordering::Relaxed),
            pc: self.pc.swap(0, Ordering::Relaxed),
        };
        self.pending.store(0, Ordering::Relaxed);
        caller
    }

    fn leave(&self, caller: Frame) {
        self.pending.store(0, Ordering::Relaxed);
        self.func.store(caller.func, Ordering::Relaxed);
        self.pc.store(caller.pc, Ordering::Relaxed);
    }

    fn step(&self, pc: u64) {
        self.pc.store(pc, Ordering::Relaxed);
    }
}

impl ExecutionContext for ToyVm {
    fn current_function(&self) -> Option<FuncId> {
        FuncId::from_raw(self.func.load(Ordering::Relaxed))
    }

    fn current_instruction(&self) -> Option<Pc> {
        Pc::from_raw(self.pc.load(Ordering::Relaxed))
    }

    fn pending_return(&self) -> Option<FuncId> {
        FuncId::from_raw(self.pending.load(Ordering::Relaxed))
    }

    fn canonical_identity(&self, func: FuncId) -> FuncId {
        if func == POINT_NORM {
            NORM
        } else {
            func
        }
    }
}

pub struct Interpreter<'a, T: TickSource> {
    vm: Arc<ToyVm>,
    profiler: &'a mut Profiler<ToyVm, T>,
}

impl<'a, T: TickSource> Interpreter<'a, T> {
    pub fn new(profiler: &'a mut Profiler<ToyVm, T>) -> Self {
        Self {
            vm: profiler.context().clone(),
            profiler,
        }
    }

    fn call<R>(
        &mut self,
        callee: FuncId,
        body: impl FnOnce(&mut Self) -> Result<R, ProfilerError>,
    ) -> Result<R, ProfilerError> {
        self.profiler.record_call(callee)?;
        let caller = self.vm.enter(self.vm.canonical_identity(callee));
        let out = body(self);
        self.vm.leave(caller);
        out
    }

    pub fn fib(&mut self, n: u64) -> Result<u64, ProfilerError> {
        self.call(FIB, |it| {
            it.vm.step(1);
            if n < 2 {
                return Ok(n);
            }
            it.vm.step(2);
            let a = it.fib(n - 1)?;
            it.vm.step(3);
            let b = it.fib(n - 2)?;
            it.vm.step(4);
            Ok(a + b)
        })
    }

    pub fn sum(&mut self, n: u64) -> Result<u64, ProfilerError> {
        self.call(SUM, |it| {
            let mut acc = 0u64;
            for i in 0..n {
                it.vm.step(1 + i % 4);
                acc = black_box(acc.wrapping_add(i.wrapping_mul(i)));
            }
            Ok(acc)
        })
    }

    /// Method call whose body ends in `return sqrt(x*x + y*y)`
    pub fn point_norm(&mut self, x: f64, y: f64) -> Result<f64, ProfilerError> {
        self.call(POINT_NORM, |it| {
            it.vm.step(1);
            let squared = x * x + y * y;
            it.vm.step(2);
            it.profiler.record_call(SQRT)?;
            it.vm.pending.store(SQRT.get(), Ordering::Relaxed);
            let root = slow_sqrt(squared);
            it.vm.pending.store(0, Ordering::Relaxed);
            Ok(root)
        })
    }

    /// One round of the demo program; returns a checksum.
    pub fn workload(&mut self) -> Result<u64, ProfilerError> {
        let mut checksum = self.fib(16)?;
        checksum = checksum.wrapping_add(self.sum(50_000)?);
        for i in 0..200u32 {
            let norm = self.point_norm(f64::from(i), f64::from(i) + 1.0)?;
            checksum = checksum.wrapping_add(norm as u64);
        }
        Ok(checksum)
    }
}

/// Newton iteration, deliberately slower than `f64::sqrt`
fn slow_sqrt(value: f64) -> f64 {
    if value <= 0.0 {
        return 0.0;
    }
    let mut guess = value;
    for _ in 0..200 {
        guess = black_box(0.5 * (guess + value / guess));
    }
    guess
}

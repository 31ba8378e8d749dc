//! Scripted execution context shared by the integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use ticktally::{ExecutionContext, FuncId, ManualTicker, Pc, Profiler, ProfilerConfig};

pub fn fid(raw: u64) -> FuncId {
    FuncId::from_raw(raw).unwrap()
}

/// A context whose "current frame" is whatever the test last set.
#[derive(Default)]
pub struct ScriptedVm {
    func: AtomicU64,
    pc: AtomicU64,
    pending: AtomicU64,
    wrappers: HashMap<u64, u64>,
}

impl ScriptedVm {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Context where calling `wrapper` runs the body `body`
    pub fn with_wrapper(wrapper: u64, body: u64) -> Arc<Self> {
        Arc::new(Self {
            wrappers: HashMap::from([(wrapper, body)]),
            ..Self::default()
        })
    }

    pub fn enter(&self, func: u64) {
        self.func.store(func, Ordering::Relaxed);
        self.pc.store(func * 0x100, Ordering::Relaxed);
        self.pending.store(0, Ordering::Relaxed);
    }

    /// Sit on a return instruction whose result is the primitive `prim`
    pub fn returning(&self, prim: u64) {
        self.pending.store(prim, Ordering::Relaxed);
    }

    pub fn idle(&self) {
        self.enter(0);
    }
}

impl ExecutionContext for ScriptedVm {
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
        self.wrappers
            .get(&func.get())
            .and_then(|&body| FuncId::from_raw(body))
            .unwrap_or(func)
    }
}

pub type TestProfiler = Profiler<ScriptedVm, ManualTicker>;

pub fn profiler(vm: &Arc<ScriptedVm>, samples: usize, counts: usize) -> TestProfiler {
    let config = ProfilerConfig::default()
        .with_sample_buffer(samples)
        .with_count_buffer(counts);
    Profiler::new(vm.clone(), ManualTicker::new(), config).unwrap()
}

/// Enter `func` and take `ticks` samples there
pub fn run_in(p: &TestProfiler, func: u64, ticks: usize) {
    p.context().enter(func);
    assert_eq!(p.ticker().fire_n(ticks), ticks);
}

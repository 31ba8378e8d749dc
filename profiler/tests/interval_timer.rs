//! Integration test: real `ITIMER_PROF` ticks on the current thread
//!
//! Kept to a single test so that only one timer owns SIGPROF in this
//! process at a time.

#![cfg(all(unix, feature = "profiling"))]

mod common;

use common::{fid, ScriptedVm};
use std::hint::black_box;
use std::time::{Duration, Instant};
use ticktally::{Profiler, ProfilerConfig, ProfilerError, ProfilerState};

/// Burn CPU until `done` says stop or the deadline passes.
fn spin_until(deadline: Duration, mut done: impl FnMut() -> bool) {
    let start = Instant::now();
    let mut acc = 0u64;
    while !done() && start.elapsed() < deadline {
        for i in 0..10_000u64 {
            acc = black_box(acc.wrapping_mul(31).wrapping_add(i));
        }
    }
    black_box(acc);
}

#[test]
fn test_interval_timer_samples_busy_loop() {
    let vm = ScriptedVm::new();
    let config = ProfilerConfig::default()
        .with_sample_period(Duration::from_millis(1))
        .with_sample_buffer(4);
    let mut p = Profiler::with_interval_timer(vm.clone(), config.clone()).unwrap();

    vm.enter(1);
    p.start().unwrap();
    p.record_call(fid(1)).unwrap();
    spin_until(Duration::from_secs(10), || p.total_samples() >= 20);
    let taken = p.stop().unwrap();
    assert!(taken >= 20, "only {} samples in 10s of CPU", taken);

    // Disarmed: more CPU time adds nothing.
    spin_until(Duration::from_millis(50), || false);
    assert_eq!(p.total_samples(), taken);

    // A second timer cannot take over SIGPROF while the first holds it.
    let mut rival = Profiler::with_interval_timer(vm.clone(), config).unwrap();
    assert!(matches!(rival.start(), Err(ProfilerError::Busy)));
    assert_eq!(rival.state(), ProfilerState::Inactive);
    drop(rival);

    let table = p.result().unwrap().unwrap();
    assert_eq!(table.get(fid(1)).unwrap().samples, taken);
    assert_eq!(table.get(fid(1)).unwrap().calls, 1);
    assert!(table.is_accurate());
}

//! Sample aggregation into the statistics table

use std::ops::AddAssign;
use ticktally_shared::{Sample, StatTable};
use tracing::debug;

/// Tally of one collection pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CollectStats {
    /// Samples credited to an existing entry
    pub counted: u64,

    /// Samples dropped because their function has no entry
    pub uncounted: u64,
}

impl CollectStats {
    pub fn total(&self) -> u64 {
        self.counted + self.uncounted
    }
}

impl AddAssign for CollectStats {
    fn add_assign(&mut self, rhs: Self) {
        self.counted += rhs.counted;
        self.uncounted += rhs.uncounted;
    }
}

/// Credit each sample to its function's entry.
///
/// Only `samples` counters change; a sample whose function was never seen at
/// a call site (or that has no function at all) is skipped and tallied in
/// `table.uncounted_samples`.
pub fn collect_samples(table: &mut StatTable, samples: &[Sample]) -> CollectStats {
    let mut stats = CollectStats::default();
    for sample in samples {
        match sample.func {
            Some(func) if table.record_sample(func) => stats.counted += 1,
            _ if sample.is_unknown() => {
                debug!("profiler: sample with no identifiable frame");
                stats.uncounted += 1;
            }
            _ => {
                debug!(
                    "profiler: uncounted object appeared in a sample: {:?}",
                    sample.func
                );
                stats.uncounted += 1;
            }
        }
    }
    table.uncounted_samples += stats.uncounted;
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use ticktally_shared::{FuncId, Pc};

    fn fid(raw: u64) -> FuncId {
        FuncId::from_raw(raw).unwrap()
    }

    #[test]
    fn test_counts_known_functions_only() {
        let mut table = StatTable::new();
        table.record_call(fid(1));
        table.record_call(fid(2));

        let samples = [
            Sample::at(fid(1), Pc::from_raw(0x10)),
            Sample::at(fid(1), Pc::from_raw(0x14)),
            Sample::native(fid(2)),
            Sample::native(fid(3)),
            Sample::unknown(),
        ];
        let stats = collect_samples(&mut table, &samples);

        assert_eq!(stats, CollectStats { counted: 3, uncounted: 2 });
        assert_eq!(stats.total(), samples.len() as u64);
        assert_eq!(table.get(fid(1)).unwrap().samples, 2);
        assert_eq!(table.get(fid(2)).unwrap().samples, 1);
        assert!(table.get(fid(3)).is_none());
        assert_eq!(table.uncounted_samples, 2);
    }

    #[test]
    fn test_call_counts_untouched() {
        let mut table = StatTable::new();
        table.record_call(fid(1));
        collect_samples(&mut table, &[Sample::native(fid(1)); 4]);
        assert_eq!(table.get(fid(1)).unwrap().calls, 1);
        assert_eq!(table.get(fid(1)).unwrap().samples, 4);
    }

    #[test]
    fn test_stats_accumulate() {
        let mut total = CollectStats::default();
        total += CollectStats { counted: 2, uncounted: 1 };
        total += CollectStats { counted: 3, uncounted: 0 };
        assert_eq!(total, CollectStats { counted: 5, uncounted: 1 });
    }
}

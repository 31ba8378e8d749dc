//! Aggregated per-function statistics
//!
//! The table is keyed by function identity. Call counts arrive from the
//! call-count flush, sample counts from result collection.

use serde::{Deserialize, Serialize};
use std::collections::hash_map::{self, HashMap};

use super::sample::FuncId;

/// Counters for one function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FuncStats {
    /// Number of recorded invocations
    pub calls: u64,

    /// Number of timer ticks that landed in this function
    pub samples: u64,
}

/// One row of a flattened table, as handed to reporting code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatRow {
    pub func: FuncId,
    pub calls: u64,
    pub samples: u64,
}

/// Mapping from function identity to its counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatTable {
    entries: HashMap<FuncId, FuncStats>,

    /// Samples dropped because their function never showed up at a call site
    pub uncounted_samples: u64,

    /// Spill writes that failed while this table's samples were taken
    pub spill_errors: u32,
}

impl StatTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, func: FuncId) -> Option<&FuncStats> {
        self.entries.get(&func)
    }

    /// Look up `func`, inserting zeroed counters if absent.
    pub fn entry_mut(&mut self, func: FuncId) -> &mut FuncStats {
        self.entries.entry(func).or_default()
    }

    pub fn record_call(&mut self, func: FuncId) {
        self.entry_mut(func).calls += 1;
    }

    /// Count one sample against an existing entry.
    ///
    /// Returns false, leaving the table untouched, when `func` has no entry.
    pub fn record_sample(&mut self, func: FuncId) -> bool {
        match self.entries.get_mut(&func) {
            Some(stats) => {
                stats.samples += 1;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> hash_map::Iter<'_, FuncId, FuncStats> {
        self.entries.iter()
    }

    pub fn total_calls(&self) -> u64 {
        self.entries.values().map(|s| s.calls).sum()
    }

    pub fn total_samples(&self) -> u64 {
        self.entries.values().map(|s| s.samples).sum()
    }

    /// False when some samples may have been lost to a failed spill write
    pub fn is_accurate(&self) -> bool {
        self.spill_errors == 0
    }

    /// Flatten into rows, hottest first (samples, then calls, then identity).
    pub fn rows(&self) -> Vec<StatRow> {
        let mut rows: Vec<StatRow> = self
            .iter()
            .map(|(&func, s)| StatRow {
                func,
                calls: s.calls,
                samples: s.samples,
            })
            .collect();
        rows.sort_by(|a, b| {
            b.samples
                .cmp(&a.samples)
                .then(b.calls.cmp(&a.calls))
                .then(a.func.cmp(&b.func))
        });
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fid(raw: u64) -> FuncId {
        FuncId::from_raw(raw).unwrap()
    }

    #[test]
    fn test_record_call_creates_entry() {
        let mut table = StatTable::new();
        table.record_call(fid(1));
        table.record_call(fid(1));
        table.record_call(fid(2));

        assert_eq!(table.len(), 2);
        assert_eq!(table.get(fid(1)).unwrap().calls, 2);
        assert_eq!(table.get(fid(1)).unwrap().samples, 0);
        assert_eq!(table.total_calls(), 3);
    }

    #[test]
    fn test_record_sample_requires_entry() {
        let mut table = StatTable::new();
        assert!(!table.record_sample(fid(9)));
        assert!(table.is_empty());

        table.record_call(fid(9));
        assert!(table.record_sample(fid(9)));
        assert_eq!(*table.get(fid(9)).unwrap(), FuncStats { calls: 1, samples: 1 });
    }

    #[test]
    fn test_rows_ordering() {
        let mut table = StatTable::new();
        for f in [3, 1, 2] {
            table.record_call(fid(f));
        }
        table.entry_mut(fid(2)).samples = 10;
        table.entry_mut(fid(3)).calls = 5;

        let order: Vec<u64> = table.rows().iter().map(|r| r.func.get()).collect();
        assert_eq!(order, vec![2, 3, 1]);
    }

    #[test]
    fn test_accuracy_flag() {
        let mut table = StatTable::new();
        assert!(table.is_accurate());
        table.spill_errors = 1;
        assert!(!table.is_accurate());
    }
}

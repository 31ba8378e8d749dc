//! Output formatting utilities for CLI commands

use colored::Colorize;
use serde::Serialize;
use ticktally::{FuncId, ProfilerConfig, StatTable};

use crate::toyvm::name_of;

/// Print success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print warning message
pub fn warning(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// One function's line in the report
#[derive(Debug, Clone, Serialize)]
pub struct ReportRow {
    pub name: &'static str,
    pub func: FuncId,
    pub calls: u64,
    pub samples: u64,
    /// Share of all samples taken, in percent
    pub percent: f64,
}

/// Flattened profiling result, hottest function first
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub sample_period_ms: u64,
    pub total_samples: u64,
    pub uncounted_samples: u64,
    pub spill_errors: u32,
    pub accurate: bool,
    pub functions: Vec<ReportRow>,
}

impl Report {
    pub fn new(table: &StatTable, config: &ProfilerConfig, total_samples: u64) -> Self {
        let functions = table
            .rows()
            .into_iter()
            .map(|row| ReportRow {
                name: name_of(row.func),
                func: row.func,
                calls: row.calls,
                samples: row.samples,
                percent: percent(row.samples, total_samples),
            })
            .collect();

        Self {
            sample_period_ms: config.sample_period.as_millis() as u64,
            total_samples,
            uncounted_samples: table.uncounted_samples,
            spill_errors: table.spill_errors,
            accurate: table.is_accurate(),
            functions,
        }
    }

    /// Print the top `limit` rows as a table
    pub fn print(&self, limit: usize) {
        println!(
            "\n=== CPU Profile ({} samples, {} ms period) ===",
            self.total_samples, self.sample_period_ms
        );
        println!(
            "  {:>7} {:>8} {:>10}  {}",
            "SAMPLES", "PERCENT", "CALLS", "FUNCTION"
        );
        for row in self.functions.iter().take(limit) {
            let line = format!(
                "  {:>7} {:>7.2}% {:>10}  {} ({})",
                row.samples, row.percent, row.calls, row.name, row.func
            );
            if row.percent >= 20.0 {
                println!("{}", line.bold());
            } else {
                println!("{}", line);
            }
        }
        if self.uncounted_samples > 0 {
            println!(
                "  {:>7} {:>7.2}% {:>10}  {}",
                self.uncounted_samples,
                percent(self.uncounted_samples, self.total_samples),
                "-",
                "<uncounted>".dimmed()
            );
        }
    }
}

fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 * 100.0 / total as f64
    }
}

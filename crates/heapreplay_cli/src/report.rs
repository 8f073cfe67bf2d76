//! Rendering of validation results.

use crate::driver::AllocatorReport;
use heapreplay_log::LogStats;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Everything known about a run before timing starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Statistics of the parsed log
    pub log: LogStats,
    /// One entry per allocator, in the order they were replayed
    pub allocators: Vec<AllocatorReport>,
}

/// Human-readable view of a [`RunReport`]
struct TextReport<'a> {
    report: &'a RunReport,
    with_stats: bool,
}

impl fmt::Display for TextReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let log = &self.report.log;
        writeln!(f, "log: {}", log.source)?;
        writeln!(
            f,
            "  records: {} ({} allocations, {} frees)",
            log.records, log.allocations, log.frees
        )?;
        writeln!(
            f,
            "  bytes requested: {}, peak outstanding: {}",
            log.total_bytes_requested, log.peak_outstanding_bytes
        )?;

        for entry in &self.report.allocators {
            let summary = &entry.summary;
            writeln!(f, "allocator: {}", entry.allocator)?;
            writeln!(
                f,
                "  replayed: {}, allocations: {}, frees: {}",
                summary.records_replayed, summary.allocations, summary.frees
            )?;
            writeln!(
                f,
                "  skipped frees: {}, dangling: {}, failed allocations: {}",
                summary.skipped_frees, summary.dangling_allocations, summary.failed_allocations
            )?;

            if self.with_stats {
                let stats = &entry.stats;
                writeln!(
                    f,
                    "  calls: {} allocate ({} failed), {} deallocate ({} reclaimed)",
                    stats.allocate_calls,
                    stats.failed_allocate_calls,
                    stats.deallocate_calls,
                    entry.reclaimed
                )?;
                writeln!(f, "  peak bytes in use: {}", stats.peak_bytes_in_use)?;
            }
        }
        Ok(())
    }
}

/// Render as plain text; `with_stats` adds allocator call counters
#[must_use]
pub fn render_text(report: &RunReport, with_stats: bool) -> String {
    TextReport { report, with_stats }.to_string()
}

/// Render as pretty-printed JSON
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn render_json(report: &RunReport) -> serde_json::Result<String> {
    serde_json::to_string_pretty(report)
}

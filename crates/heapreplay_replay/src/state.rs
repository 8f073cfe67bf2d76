//! Progress and counters of a replay pass.

use serde::{Deserialize, Serialize};

/// Running state of one replay pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayState {
    position: usize,
    allocations: u64,
    frees: u64,
    skipped_frees: u64,
    failed_allocations: u64,
    bytes_allocated: u64,
}

/// Outcome of a completed replay pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaySummary {
    /// Records processed
    pub records_replayed: usize,
    /// Successful allocate calls
    pub allocations: u64,
    /// Frees that reached the allocator
    pub frees: u64,
    /// Frees whose original address had no outstanding allocation
    pub skipped_frees: u64,
    /// Allocations that failed and were skipped (permissive mode only)
    pub failed_allocations: u64,
    /// Allocations still outstanding when the log ended
    pub dangling_allocations: usize,
    /// Bytes requested by successful allocations
    pub bytes_allocated: u64,
}

impl ReplayState {
    /// Create a fresh state at position zero
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the next record to replay
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Successful allocations so far
    #[must_use]
    pub fn allocations(&self) -> u64 {
        self.allocations
    }

    /// Frees forwarded to the allocator so far
    #[must_use]
    pub fn frees(&self) -> u64 {
        self.frees
    }

    /// Unresolvable frees so far
    #[must_use]
    pub fn skipped_frees(&self) -> u64 {
        self.skipped_frees
    }

    /// Skipped allocation failures so far
    #[must_use]
    pub fn failed_allocations(&self) -> u64 {
        self.failed_allocations
    }

    /// Bytes allocated so far
    #[must_use]
    pub fn bytes_allocated(&self) -> u64 {
        self.bytes_allocated
    }

    pub(crate) fn advance(&mut self) {
        self.position += 1;
    }

    pub(crate) fn record_allocation(&mut self, size: u64) {
        self.allocations += 1;
        self.bytes_allocated = self.bytes_allocated.saturating_add(size);
    }

    pub(crate) fn record_free(&mut self) {
        self.frees += 1;
    }

    pub(crate) fn record_skipped_free(&mut self) {
        self.skipped_frees += 1;
    }

    pub(crate) fn record_failed_allocation(&mut self) {
        self.failed_allocations += 1;
    }

    /// Freeze into a summary, given how many allocations are still outstanding
    #[must_use]
    pub fn summarize(&self, dangling_allocations: usize) -> ReplaySummary {
        ReplaySummary {
            records_replayed: self.position,
            allocations: self.allocations,
            frees: self.frees,
            skipped_frees: self.skipped_frees,
            failed_allocations: self.failed_allocations,
            dangling_allocations,
            bytes_allocated: self.bytes_allocated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_new() {
        let state = ReplayState::new();
        assert_eq!(state.position(), 0);
        assert_eq!(state.allocations(), 0);
        assert_eq!(state.skipped_frees(), 0);
    }

    #[test]
    fn test_state_counters() {
        let mut state = ReplayState::new();
        state.record_allocation(100);
        state.advance();
        state.record_allocation(28);
        state.advance();
        state.record_free();
        state.advance();
        state.record_skipped_free();
        state.advance();
        state.record_failed_allocation();
        state.advance();

        assert_eq!(state.position(), 5);
        assert_eq!(state.allocations(), 2);
        assert_eq!(state.bytes_allocated(), 128);
        assert_eq!(state.frees(), 1);
        assert_eq!(state.skipped_frees(), 1);
        assert_eq!(state.failed_allocations(), 1);
    }

    #[test]
    fn test_summarize() {
        let mut state = ReplayState::new();
        state.record_allocation(64);
        state.advance();

        let summary = state.summarize(1);
        assert_eq!(summary.records_replayed, 1);
        assert_eq!(summary.allocations, 1);
        assert_eq!(summary.dangling_allocations, 1);
        assert_eq!(summary.bytes_allocated, 64);
    }

    #[test]
    fn test_summary_serialization() {
        let summary = ReplaySummary {
            skipped_frees: 3,
            ..Default::default()
        };
        let json = serde_json::to_string(&summary).unwrap();
        let back: ReplaySummary = serde_json::from_str(&json).unwrap();
        assert_eq!(summary, back);
    }
}

//! Log records.

use ahash::AHashMap;
use heapreplay_core::OriginalAddress;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What a log row did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Memory was requested
    Allocate,
    /// Memory was released
    Free,
}

impl Action {
    /// Text used for this action in a log
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Allocate => "allocate",
            Self::Free => "free",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action text that is neither `allocate` nor `free`
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown action '{0}'")]
pub struct UnknownAction(pub String);

impl FromStr for Action {
    type Err = UnknownAction;

    /// Case-sensitive: `Allocate` is not an action.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allocate" => Ok(Self::Allocate),
            "free" => Ok(Self::Free),
            other => Err(UnknownAction(other.to_string())),
        }
    }
}

/// One historical action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Allocate or free
    pub action: Action,
    /// Bytes requested (allocate) or released (free, informative only)
    pub size: u64,
    /// Address the historical allocator returned or released
    pub address: OriginalAddress,
}

impl LogRecord {
    /// Create an allocate record
    #[must_use]
    pub const fn allocate(size: u64, address: OriginalAddress) -> Self {
        Self {
            action: Action::Allocate,
            size,
            address,
        }
    }

    /// Create a free record
    #[must_use]
    pub const fn free(size: u64, address: OriginalAddress) -> Self {
        Self {
            action: Action::Free,
            size,
            address,
        }
    }

    /// Whether this record allocates
    #[must_use]
    pub const fn is_allocate(&self) -> bool {
        matches!(self.action, Action::Allocate)
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}, {})", self.action, self.size, self.address)
    }
}

/// Statistics about a log, computed without replaying it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogStats {
    /// Where the log came from
    pub source: String,
    /// Number of records
    pub records: usize,
    /// Number of allocate records
    pub allocations: usize,
    /// Number of free records
    pub frees: usize,
    /// Sum of all allocate sizes
    pub total_bytes_requested: u64,
    /// Largest number of bytes live at once in the historical run
    pub peak_outstanding_bytes: u64,
}

/// An ordered, immutable allocation log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedLog {
    source: String,
    records: Vec<LogRecord>,
}

impl ParsedLog {
    /// Create from records already in log order
    #[must_use]
    pub fn from_records(source: impl Into<String>, records: Vec<LogRecord>) -> Self {
        Self {
            source: source.into(),
            records,
        }
    }

    /// Where the log came from (file path or caller-supplied name)
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Records in log order
    #[must_use]
    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }

    /// Iterate over records in log order
    pub fn iter(&self) -> std::slice::Iter<'_, LogRecord> {
        self.records.iter()
    }

    /// Number of records
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the log has no records
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of allocate records
    #[must_use]
    pub fn allocation_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_allocate()).count()
    }

    /// Number of free records
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.records.len() - self.allocation_count()
    }

    /// Sum of all allocate sizes, saturating at `u64::MAX`
    #[must_use]
    pub fn total_bytes_requested(&self) -> u64 {
        let total: u128 = self
            .records
            .iter()
            .filter(|r| r.is_allocate())
            .map(|r| u128::from(r.size))
            .sum();
        saturate(total)
    }

    /// Largest number of bytes outstanding at any point of the historical run.
    ///
    /// Frees are matched by original address against the size that was
    /// allocated there; a free with no matching allocate does not lower the
    /// running total. Saturates at `u64::MAX`.
    #[must_use]
    pub fn peak_outstanding_bytes(&self) -> u64 {
        // u128 holds the exact running total of any log
        let mut live: AHashMap<OriginalAddress, u64> = AHashMap::new();
        let mut current = 0u128;
        let mut peak = 0u128;

        for record in &self.records {
            match record.action {
                Action::Allocate => {
                    if let Some(stale) = live.insert(record.address, record.size) {
                        current -= u128::from(stale);
                    }
                    current += u128::from(record.size);
                    peak = peak.max(current);
                }
                Action::Free => {
                    if let Some(size) = live.remove(&record.address) {
                        current -= u128::from(size);
                    }
                }
            }
        }

        saturate(peak)
    }

    /// Summary statistics
    #[must_use]
    pub fn stats(&self) -> LogStats {
        let allocations = self.allocation_count();
        LogStats {
            source: self.source.clone(),
            records: self.records.len(),
            allocations,
            frees: self.records.len() - allocations,
            total_bytes_requested: self.total_bytes_requested(),
            peak_outstanding_bytes: self.peak_outstanding_bytes(),
        }
    }
}

fn saturate(bytes: u128) -> u64 {
    u64::try_from(bytes).unwrap_or(u64::MAX)
}

impl<'a> IntoIterator for &'a ParsedLog {
    type Item = &'a LogRecord;
    type IntoIter = std::slice::Iter<'a, LogRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(raw: u64) -> OriginalAddress {
        OriginalAddress::from_raw(raw)
    }

    #[test]
    fn test_action_from_str() {
        assert_eq!("allocate".parse::<Action>().unwrap(), Action::Allocate);
        assert_eq!("free".parse::<Action>().unwrap(), Action::Free);
    }

    #[test]
    fn test_action_is_case_sensitive() {
        let err = "Allocate".parse::<Action>().unwrap_err();
        assert_eq!(err, UnknownAction("Allocate".to_string()));
        assert!("FREE".parse::<Action>().is_err());
        assert!("".parse::<Action>().is_err());
    }

    #[test]
    fn test_action_display_matches_log_text() {
        for action in [Action::Allocate, Action::Free] {
            assert_eq!(action.to_string().parse::<Action>().unwrap(), action);
        }
    }

    #[test]
    fn test_record_display() {
        let record = LogRecord::allocate(100, addr(0xAAA));
        assert_eq!(record.to_string(), "allocate(100, 0xaaa)");
    }

    #[test]
    fn test_parsed_log_counts() {
        let log = ParsedLog::from_records(
            "test",
            vec![
                LogRecord::allocate(100, addr(0xAAA)),
                LogRecord::allocate(28, addr(0xBBB)),
                LogRecord::free(100, addr(0xAAA)),
            ],
        );
        assert_eq!(log.len(), 3);
        assert!(!log.is_empty());
        assert_eq!(log.allocation_count(), 2);
        assert_eq!(log.free_count(), 1);
        assert_eq!(log.total_bytes_requested(), 128);
        assert_eq!(log.source(), "test");
    }

    #[test]
    fn test_peak_outstanding_bytes_with_reuse() {
        let log = ParsedLog::from_records(
            "reuse",
            vec![
                LogRecord::allocate(100, addr(0xAAA)),
                LogRecord::allocate(50, addr(0xBBB)),
                LogRecord::free(100, addr(0xAAA)),
                LogRecord::allocate(30, addr(0xAAA)),
                LogRecord::free(0, addr(0xCCC)),
            ],
        );
        assert_eq!(log.peak_outstanding_bytes(), 150);
    }

    #[test]
    fn test_byte_totals_saturate_on_huge_sizes() {
        let half = 1u64 << 63;
        let log = ParsedLog::from_records(
            "huge",
            vec![
                LogRecord::allocate(half, addr(1)),
                LogRecord::allocate(half, addr(2)),
                LogRecord::free(half, addr(1)),
                LogRecord::allocate(10, addr(3)),
            ],
        );
        let stats = log.stats();
        assert_eq!(stats.total_bytes_requested, u64::MAX);
        assert_eq!(stats.peak_outstanding_bytes, u64::MAX);

        // the exact running total survives the saturated peak
        let log = ParsedLog::from_records(
            "huge-then-free",
            vec![
                LogRecord::allocate(half, addr(1)),
                LogRecord::allocate(half, addr(2)),
                LogRecord::free(half, addr(1)),
                LogRecord::free(half, addr(2)),
                LogRecord::allocate(half, addr(3)),
            ],
        );
        assert_eq!(log.peak_outstanding_bytes(), u64::MAX);
        assert_eq!(log.allocation_count(), 3);
    }

    #[test]
    fn test_stats() {
        let log = ParsedLog::from_records("empty", Vec::new());
        let stats = log.stats();
        assert_eq!(stats.records, 0);
        assert_eq!(stats.peak_outstanding_bytes, 0);
        assert_eq!(stats.source, "empty");
    }

    #[test]
    fn test_iteration_preserves_order() {
        let records = vec![
            LogRecord::free(8, addr(1)),
            LogRecord::allocate(8, addr(1)),
        ];
        let log = ParsedLog::from_records("order", records.clone());
        let seen: Vec<LogRecord> = log.iter().copied().collect();
        assert_eq!(seen, records);
        assert_eq!((&log).into_iter().count(), 2);
    }

    #[test]
    fn test_action_serialization() {
        let json = serde_json::to_string(&Action::Allocate).unwrap();
        assert_eq!(json, "\"allocate\"");
    }
}

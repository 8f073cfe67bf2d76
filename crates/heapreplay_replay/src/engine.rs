//! Replay engine: drives an allocator through a recorded log.
//!
//! Records are applied strictly in log order. Every original address is
//! translated through an [`AddressTable`] owned by the current pass, so a
//! free always reaches the allocation its matching allocate produced, even
//! when the historical allocator recycled the address.

use crate::allocator::{AllocError, ReplayAllocator};
use crate::counting::{AllocCall, CountingAllocator};
use crate::state::{ReplayState, ReplaySummary};
use crate::table::AddressTable;
use heapreplay_core::{LiveAddress, OriginalAddress};
use heapreplay_log::{Action, LogRecord};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, trace, warn};

/// What to do when the allocator refuses an allocation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocationFailurePolicy {
    /// Stop the pass and report the failing record
    #[default]
    Halt,
    /// Count the failure and keep going; a later free of that address is
    /// skipped like any other unresolvable free
    Skip,
}

/// Replay engine configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// Reaction to allocation failures
    pub allocation_failure: AllocationFailurePolicy,
    /// Maximum records to replay (0 = unlimited)
    pub max_records: usize,
    /// Emit a trace event per record
    pub trace_steps: bool,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            allocation_failure: AllocationFailurePolicy::Halt,
            max_records: 0,
            trace_steps: false,
        }
    }
}

impl ReplayConfig {
    /// The part of `records` a pass will replay
    #[must_use]
    pub fn window<'a>(&self, records: &'a [LogRecord]) -> &'a [LogRecord] {
        if self.max_records > 0 && self.max_records < records.len() {
            &records[..self.max_records]
        } else {
            records
        }
    }
}

/// Replay result type
pub type ReplayResult<T> = Result<T, ReplayError>;

/// Fatal replay errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReplayError {
    /// The allocator refused an allocation the original run made
    #[error("Allocation of {size} bytes for {address} failed at record {position}: {source}")]
    AllocationFailed {
        /// Index of the failing record
        position: usize,
        /// Requested size
        size: u64,
        /// Original address of the allocation
        address: OriginalAddress,
        /// Allocator error
        source: AllocError,
    },

    /// The allocator refused to release one of its own allocations
    #[error("Deallocation for {address} failed at record {position}: {source}")]
    DeallocationFailed {
        /// Index of the failing record
        position: usize,
        /// Original address being freed
        address: OriginalAddress,
        /// Allocator error
        source: AllocError,
    },
}

impl ReplayError {
    /// Index of the record that stopped the pass
    #[must_use]
    pub fn position(&self) -> usize {
        match self {
            Self::AllocationFailed { position, .. } | Self::DeallocationFailed { position, .. } => {
                *position
            }
        }
    }
}

/// One pass over one log against one allocator.
///
/// Owns its translation table, its counters and the allocator it replays
/// against, so every live address it holds goes back to the allocator that
/// produced it. A new pass starts empty; nothing carries over between
/// iterations or allocators. Dropping a pass releases whatever it still
/// holds.
pub struct ReplayPass<A: ReplayAllocator> {
    config: ReplayConfig,
    allocator: A,
    table: AddressTable,
    /// Live allocations whose original address was allocated again
    /// before being freed; no free can reach them any more
    orphaned: Vec<LiveAddress>,
    state: ReplayState,
}

impl<A: ReplayAllocator> ReplayPass<A> {
    fn new(config: ReplayConfig, allocator: A, capacity_hint: usize) -> Self {
        Self {
            config,
            allocator,
            table: AddressTable::with_capacity(capacity_hint),
            orphaned: Vec::new(),
            state: ReplayState::new(),
        }
    }

    /// Counters so far
    #[must_use]
    pub fn state(&self) -> &ReplayState {
        &self.state
    }

    /// Allocator under test
    #[must_use]
    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    /// Allocations made by this pass and not yet freed
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.table.len() + self.orphaned.len()
    }

    /// Apply a single record
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::AllocationFailed`] under the halt policy and
    /// [`ReplayError::DeallocationFailed`] whenever the allocator rejects a
    /// release. The position is not advanced past a failing record.
    pub fn step(&mut self, record: &LogRecord) -> ReplayResult<()> {
        let position = self.state.position();
        if self.config.trace_steps {
            trace!(
                position,
                action = %record.action,
                size = record.size,
                address = %record.address,
                "replaying record"
            );
        }

        match record.action {
            Action::Allocate => match self.allocator.allocate(record.size) {
                Ok(live) => {
                    if let Some(stale) = self.table.record_allocation(record.address, live) {
                        warn!(
                            position,
                            address = %record.address,
                            %stale,
                            "original address allocated again without an intervening free"
                        );
                        self.orphaned.push(stale);
                    }
                    self.state.record_allocation(record.size);
                }
                Err(source) => match self.config.allocation_failure {
                    AllocationFailurePolicy::Halt => {
                        return Err(ReplayError::AllocationFailed {
                            position,
                            size: record.size,
                            address: record.address,
                            source,
                        });
                    }
                    AllocationFailurePolicy::Skip => {
                        debug!(position, size = record.size, %source, "allocation failed, skipping");
                        self.state.record_failed_allocation();
                    }
                },
            },
            Action::Free => match self.table.resolve_and_clear(record.address) {
                Some(live) => {
                    // SAFETY: the table only holds addresses `self.allocator`
                    // returned, and resolving removes them, so each is
                    // released at most once
                    let released = unsafe { self.allocator.deallocate(live) };
                    released.map_err(|source| ReplayError::DeallocationFailed {
                        position,
                        address: record.address,
                        source,
                    })?;
                    self.state.record_free();
                }
                None => {
                    debug!(position, address = %record.address, "free without outstanding allocation skipped");
                    self.state.record_skipped_free();
                }
            },
        }

        self.state.advance();
        Ok(())
    }

    /// Apply every record in the configured window, in order
    ///
    /// # Errors
    ///
    /// Stops at the first error from [`step`](Self::step).
    pub fn run(&mut self, records: &[LogRecord]) -> ReplayResult<()> {
        for record in self.config.window(records) {
            self.step(record)?;
        }
        Ok(())
    }

    /// Summary of the pass so far; outstanding allocations count as dangling
    #[must_use]
    pub fn finish(&self) -> ReplaySummary {
        self.state.summarize(self.outstanding())
    }

    /// Release every allocation the pass left outstanding.
    ///
    /// Not part of the replayed workload: call it after timing stops so the
    /// release is not measured. Returns how many allocations were released.
    ///
    /// # Errors
    ///
    /// Returns the first release the allocator refused; the remaining
    /// allocations are still offered to it.
    pub fn reclaim(mut self) -> Result<usize, AllocError> {
        self.release_outstanding()
    }

    fn release_outstanding(&mut self) -> Result<usize, AllocError> {
        let outstanding: Vec<LiveAddress> =
            self.orphaned.drain(..).chain(self.table.drain()).collect();

        let mut released = 0;
        let mut first_error = None;
        for live in outstanding {
            // SAFETY: every address held by the pass came from
            // `self.allocator` and was taken out of the pass above
            match unsafe { self.allocator.deallocate(live) } {
                Ok(()) => released += 1,
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(released),
        }
    }
}

impl<A: ReplayAllocator> Drop for ReplayPass<A> {
    fn drop(&mut self) {
        if self.outstanding() == 0 {
            return;
        }
        if let Err(err) = self.release_outstanding() {
            warn!(allocator = self.allocator.name(), %err, "failed to release dangling allocations");
        }
    }
}

impl<A: ReplayAllocator> fmt::Debug for ReplayPass<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplayPass")
            .field("config", &self.config)
            .field("allocator", &self.allocator.name())
            .field("outstanding", &self.outstanding())
            .field("state", &self.state)
            .finish()
    }
}

/// Replay engine for driving allocators through logs
#[derive(Debug, Clone, Default)]
pub struct ReplayEngine {
    config: ReplayConfig,
}

impl ReplayEngine {
    /// Create a new replay engine
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with custom config
    #[must_use]
    pub fn with_config(mut self, config: ReplayConfig) -> Self {
        self.config = config;
        self
    }

    /// Current configuration
    #[must_use]
    pub fn config(&self) -> &ReplayConfig {
        &self.config
    }

    /// Start a fresh pass against `allocator`, sized for `capacity_hint`
    /// outstanding allocations.
    ///
    /// Pass `&mut allocator` to keep the allocator once the pass is done.
    #[must_use]
    pub fn begin<A: ReplayAllocator>(&self, allocator: A, capacity_hint: usize) -> ReplayPass<A> {
        ReplayPass::new(self.config, allocator, capacity_hint)
    }

    fn capacity_hint(&self, records: &[LogRecord]) -> usize {
        self.config
            .window(records)
            .iter()
            .filter(|r| r.is_allocate())
            .count()
    }

    /// Replay `records` fully against `allocator`.
    ///
    /// Allocations the log never frees are reported as dangling in the
    /// summary and released before returning, on success and on error.
    ///
    /// # Errors
    ///
    /// Returns the first fatal [`ReplayError`].
    pub fn replay<A>(&self, records: &[LogRecord], allocator: &mut A) -> ReplayResult<ReplaySummary>
    where
        A: ReplayAllocator + ?Sized,
    {
        self.replay_with_callback(records, allocator, |_, _| {})
    }

    /// Replay with a callback after every applied record
    ///
    /// # Errors
    ///
    /// Returns the first fatal [`ReplayError`].
    pub fn replay_with_callback<A, F>(
        &self,
        records: &[LogRecord],
        allocator: &mut A,
        mut callback: F,
    ) -> ReplayResult<ReplaySummary>
    where
        A: ReplayAllocator + ?Sized,
        F: FnMut(&LogRecord, &ReplayState),
    {
        let mut pass = self.begin(allocator, self.capacity_hint(records));

        for record in self.config.window(records) {
            pass.step(record)?;
            callback(record, pass.state());
        }

        let summary = pass.finish();
        debug!(
            allocator = pass.allocator().name(),
            records = summary.records_replayed,
            skipped_frees = summary.skipped_frees,
            dangling = summary.dangling_allocations,
            "replay pass complete"
        );
        Ok(summary)
    }

    /// Replay the same records against two allocators and check that both
    /// passes agree.
    ///
    /// Compares every summary counter and the ordered sizes of the
    /// allocate and deallocate calls the records produced. Releasing the
    /// dangling allocations afterwards is not part of the comparison.
    ///
    /// # Errors
    ///
    /// Returns the first fatal [`ReplayError`] from either pass.
    pub fn verify_determinism<A, B>(
        &self,
        records: &[LogRecord],
        first: &mut A,
        second: &mut B,
    ) -> ReplayResult<bool>
    where
        A: ReplayAllocator + ?Sized,
        B: ReplayAllocator + ?Sized,
    {
        let (left, left_calls) = self.recorded_replay(records, first)?;
        let (right, right_calls) = self.recorded_replay(records, second)?;
        Ok(left == right && left_calls == right_calls)
    }

    fn recorded_replay<A>(
        &self,
        records: &[LogRecord],
        allocator: &mut A,
    ) -> ReplayResult<(ReplaySummary, Vec<AllocCall>)>
    where
        A: ReplayAllocator + ?Sized,
    {
        let counting = CountingAllocator::recording(allocator);
        let mut pass = self.begin(counting, self.capacity_hint(records));
        pass.run(records)?;
        Ok((pass.finish(), pass.allocator().calls().to_vec()))
    }
}

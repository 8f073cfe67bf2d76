//! Benchmark driver.
//!
//! Each selected allocator first gets one untimed validation pass whose
//! summary feeds the report. The timing loop then runs one fresh pass
//! against one fresh allocator per criterion iteration; only the pass
//! itself is measured, and whatever the log leaves allocated is reclaimed
//! after the clock stops.

use clap::ValueEnum;
use criterion::Criterion;
use heapreplay_log::LogRecord;
use heapreplay_replay::{
    AllocError, AllocStats, CountingAllocator, PoolAllocator, PoolConfig, ReplayAllocator,
    ReplayConfig, ReplayEngine, ReplayError, ReplaySummary, SystemAllocator,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Allocators the driver knows how to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AllocatorKind {
    /// Process heap through `std::alloc`
    System,
    /// Fixed-capacity size-class pool
    Pool,
}

impl AllocatorKind {
    /// Lowercase name, as accepted on the command line
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Pool => "pool",
        }
    }

    /// Build a fresh instance
    ///
    /// # Errors
    ///
    /// Returns an error if the pool arena cannot be reserved.
    pub fn build(&self, pool: &PoolConfig) -> Result<Box<dyn ReplayAllocator>, AllocError> {
        Ok(match self {
            Self::System => Box::new(SystemAllocator::new()),
            Self::Pool => Box::new(PoolAllocator::new(pool)?),
        })
    }
}

impl fmt::Display for AllocatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Driver configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Allocators to replay against, in order
    pub allocators: Vec<AllocatorKind>,
    /// Engine settings shared by every pass
    pub replay: ReplayConfig,
    /// Sizing for pool allocators
    pub pool: PoolConfig,
    /// Criterion samples per benchmark
    pub sample_size: usize,
    /// Criterion measurement time per benchmark
    pub measurement_time: Duration,
    /// Criterion warm-up time per benchmark
    pub warm_up_time: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            allocators: vec![AllocatorKind::System],
            replay: ReplayConfig::default(),
            pool: PoolConfig::default(),
            sample_size: 100,
            measurement_time: Duration::from_secs(5),
            warm_up_time: Duration::from_secs(3),
        }
    }
}

impl DriverConfig {
    /// Smallest sample size criterion accepts
    pub const MIN_SAMPLE_SIZE: usize = 10;

    fn validate(&self) -> Result<(), DriverError> {
        let invalid = |reason: &str| DriverError::InvalidConfig {
            reason: reason.to_string(),
        };

        if self.allocators.is_empty() {
            return Err(invalid("at least one allocator must be selected"));
        }
        if self.sample_size < Self::MIN_SAMPLE_SIZE {
            return Err(invalid("sample size must be at least 10"));
        }
        if self.measurement_time.is_zero() || self.warm_up_time.is_zero() {
            return Err(invalid("measurement and warm-up times must be non-zero"));
        }
        Ok(())
    }
}

/// Driver errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DriverError {
    /// Rejected configuration
    #[error("Invalid driver configuration: {reason}")]
    InvalidConfig {
        /// Why it was rejected
        reason: String,
    },

    /// The allocator could not be constructed
    #[error("Failed to build {allocator} allocator: {source}")]
    Build {
        /// Allocator being built
        allocator: AllocatorKind,
        /// Underlying error
        source: AllocError,
    },

    /// A replay pass failed
    #[error("Replay against {allocator} allocator failed: {source}")]
    Replay {
        /// Allocator under test
        allocator: AllocatorKind,
        /// Underlying error
        source: ReplayError,
    },

    /// Releasing dangling allocations after a pass failed
    #[error("Reclaiming dangling allocations from {allocator} allocator failed: {source}")]
    Reclaim {
        /// Allocator under test
        allocator: AllocatorKind,
        /// Underlying error
        source: AllocError,
    },
}

/// Outcome of the validation pass against one allocator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocatorReport {
    /// Allocator under test
    pub allocator: AllocatorKind,
    /// Replay counters
    pub summary: ReplaySummary,
    /// Calls observed by the allocator, reclaim included
    pub stats: AllocStats,
    /// Dangling allocations released after the pass
    pub reclaimed: usize,
}

/// Replays one log against the configured allocators
#[derive(Debug, Clone)]
pub struct BenchmarkDriver {
    config: DriverConfig,
    engine: ReplayEngine,
}

impl BenchmarkDriver {
    /// Create a driver
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::InvalidConfig`] if the configuration is unusable.
    pub fn new(config: DriverConfig) -> Result<Self, DriverError> {
        config.validate()?;
        let engine = ReplayEngine::new().with_config(config.replay);
        Ok(Self { config, engine })
    }

    /// Current configuration
    #[must_use]
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Criterion instance configured from the driver settings
    #[must_use]
    pub fn criterion(&self) -> Criterion {
        Criterion::default()
            .sample_size(self.config.sample_size)
            .measurement_time(self.config.measurement_time)
            .warm_up_time(self.config.warm_up_time)
    }

    fn capacity_hint(&self, records: &[LogRecord]) -> usize {
        self.config
            .replay
            .window(records)
            .iter()
            .filter(|r| r.is_allocate())
            .count()
    }

    /// Run one untimed pass against a fresh `kind` allocator
    ///
    /// # Errors
    ///
    /// Returns the first fatal replay error, or an error building the
    /// allocator or releasing what the pass left allocated.
    pub fn validate(
        &self,
        kind: AllocatorKind,
        records: &[LogRecord],
    ) -> Result<AllocatorReport, DriverError> {
        let allocator = kind
            .build(&self.config.pool)
            .map_err(|source| DriverError::Build {
                allocator: kind,
                source,
            })?;
        let mut counting = CountingAllocator::new(allocator);

        let mut pass = self.engine.begin(&mut counting, self.capacity_hint(records));
        let outcome = pass.run(records);
        let summary = pass.finish();
        let reclaimed = pass
            .reclaim()
            .map_err(|source| DriverError::Reclaim {
                allocator: kind,
                source,
            })?;
        outcome.map_err(|source| DriverError::Replay {
            allocator: kind,
            source,
        })?;

        info!(
            allocator = %kind,
            records = summary.records_replayed,
            allocations = summary.allocations,
            frees = summary.frees,
            skipped_frees = summary.skipped_frees,
            dangling = summary.dangling_allocations,
            "validation pass complete"
        );

        Ok(AllocatorReport {
            allocator: kind,
            summary,
            stats: counting.stats().clone(),
            reclaimed,
        })
    }

    /// Validation pass for every configured allocator, in order
    ///
    /// # Errors
    ///
    /// Stops at the first allocator whose pass fails.
    pub fn validate_all(&self, records: &[LogRecord]) -> Result<Vec<AllocatorReport>, DriverError> {
        self.config
            .allocators
            .iter()
            .map(|&kind| self.validate(kind, records))
            .collect()
    }

    /// Time repeated passes for every configured allocator.
    ///
    /// Benchmarks are named `replay/<allocator>`.
    ///
    /// # Errors
    ///
    /// Returns the first failure seen inside the timing loop; the remaining
    /// iterations of that benchmark are not run.
    pub fn benchmark(
        &self,
        records: &[LogRecord],
        criterion: &mut Criterion,
    ) -> Result<(), DriverError> {
        let hint = self.capacity_hint(records);

        for &kind in &self.config.allocators {
            let mut failure: Option<DriverError> = None;

            criterion.bench_function(&format!("replay/{kind}"), |b| {
                b.iter_custom(|iters| {
                    let mut elapsed = Duration::ZERO;
                    for _ in 0..iters {
                        if failure.is_some() {
                            break;
                        }
                        match self.timed_pass(kind, records, hint) {
                            Ok(pass_time) => elapsed += pass_time,
                            Err(err) => failure = Some(err),
                        }
                    }
                    elapsed
                });
            });

            if let Some(err) = failure {
                return Err(err);
            }
            debug!(allocator = %kind, "benchmark complete");
        }

        Ok(())
    }

    fn timed_pass(
        &self,
        kind: AllocatorKind,
        records: &[LogRecord],
        hint: usize,
    ) -> Result<Duration, DriverError> {
        let mut allocator = kind
            .build(&self.config.pool)
            .map_err(|source| DriverError::Build {
                allocator: kind,
                source,
            })?;
        let mut pass = self.engine.begin(&mut allocator, hint);

        let start = Instant::now();
        let outcome = pass.run(records);
        let elapsed = start.elapsed();

        pass.reclaim()
            .map_err(|source| DriverError::Reclaim {
                allocator: kind,
                source,
            })?;
        outcome.map_err(|source| DriverError::Replay {
            allocator: kind,
            source,
        })?;
        Ok(elapsed)
    }
}

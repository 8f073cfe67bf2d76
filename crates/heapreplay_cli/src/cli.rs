//! Command-line arguments.

use crate::driver::{AllocatorKind, DriverConfig};
use clap::Parser;
use heapreplay_replay::{AllocationFailurePolicy, PoolConfig, ReplayConfig};
use std::path::PathBuf;
use std::time::Duration;

/// Arguments of the `heapreplay` binary
#[derive(Debug, Parser)]
#[command(name = "heapreplay")]
#[command(about = "heapreplay - Benchmark allocators by replaying recorded allocation logs", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to the allocation log (CSV with Action, Size and Pointer columns)
    #[arg(short, long)]
    pub file: PathBuf,

    /// Allocator to benchmark; repeat to compare several
    #[arg(short = 'a', long = "allocator", value_enum, default_values_t = [AllocatorKind::System])]
    pub allocators: Vec<AllocatorKind>,

    /// Count and skip failed allocations instead of stopping
    #[arg(long)]
    pub permissive: bool,

    /// Replay only the first N records (0 = all)
    #[arg(long, default_value_t = 0)]
    pub max_records: usize,

    /// Arena size of the pool allocator in bytes
    #[arg(long, default_value_t = 1 << 30)]
    pub pool_capacity: u64,

    /// Samples per benchmark
    #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u64).range(10..))]
    pub sample_size: u64,

    /// Measurement time per benchmark, in seconds
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u64).range(1..))]
    pub measurement_time: u64,

    /// Warm-up time per benchmark, in seconds
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u64).range(1..))]
    pub warm_up_time: u64,

    /// Run the validation pass only, without timing
    #[arg(long)]
    pub dry_run: bool,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,

    /// Include allocator call counters in the report
    #[arg(long)]
    pub stats: bool,

    /// Log every replayed record at trace level
    #[arg(long)]
    pub trace_steps: bool,
}

impl Cli {
    /// Driver settings selected by these arguments
    #[must_use]
    pub fn driver_config(&self) -> DriverConfig {
        let allocation_failure = if self.permissive {
            AllocationFailurePolicy::Skip
        } else {
            AllocationFailurePolicy::Halt
        };

        DriverConfig {
            allocators: self.allocators.clone(),
            replay: ReplayConfig {
                allocation_failure,
                max_records: self.max_records,
                trace_steps: self.trace_steps,
            },
            pool: PoolConfig::with_capacity(self.pool_capacity),
            sample_size: self.sample_size as usize,
            measurement_time: Duration::from_secs(self.measurement_time),
            warm_up_time: Duration::from_secs(self.warm_up_time),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn test_file_is_required() {
        let err = Cli::try_parse_from(["heapreplay"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["heapreplay", "-f", "trace.csv"]).unwrap();
        assert_eq!(cli.file, PathBuf::from("trace.csv"));
        assert_eq!(cli.allocators, vec![AllocatorKind::System]);
        assert!(!cli.dry_run);

        let config = cli.driver_config();
        assert_eq!(config.replay, ReplayConfig::default());
        assert_eq!(config.pool, PoolConfig::default());
        assert_eq!(config.sample_size, 100);
        assert_eq!(config.measurement_time, Duration::from_secs(5));
    }

    #[test]
    fn test_full_arguments() {
        let cli = Cli::try_parse_from([
            "heapreplay",
            "--file",
            "trace.csv",
            "-a",
            "system",
            "--allocator",
            "pool",
            "--permissive",
            "--max-records",
            "500",
            "--pool-capacity",
            "4096",
            "--sample-size",
            "20",
            "--dry-run",
            "--json",
            "--stats",
        ])
        .unwrap();

        let config = cli.driver_config();
        assert_eq!(
            config.allocators,
            vec![AllocatorKind::System, AllocatorKind::Pool]
        );
        assert_eq!(config.replay.allocation_failure, AllocationFailurePolicy::Skip);
        assert_eq!(config.replay.max_records, 500);
        assert_eq!(config.pool.capacity, 4096);
        assert_eq!(config.sample_size, 20);
        assert!(cli.dry_run && cli.json && cli.stats);
    }

    #[test]
    fn test_rejects_small_sample_size() {
        assert!(Cli::try_parse_from(["heapreplay", "-f", "x.csv", "--sample-size", "5"]).is_err());
    }

    #[test]
    fn test_rejects_unknown_allocator() {
        let err = Cli::try_parse_from(["heapreplay", "-f", "x.csv", "-a", "jemalloc"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidValue);
    }
}

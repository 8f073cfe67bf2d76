//! heapreplay CLI
//!
//! Parses an allocation log once, validates it against every selected
//! allocator, prints the report and then benchmarks replay with criterion.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cli;
pub mod driver;
pub mod report;

pub use cli::Cli;
pub use driver::{AllocatorKind, AllocatorReport, BenchmarkDriver, DriverConfig, DriverError};
pub use report::{RunReport, render_json, render_text};

use color_eyre::Result;
use color_eyre::eyre::WrapErr;
use std::io::Write;
use tracing::debug;

/// Execute one invocation, writing the report to `out`
///
/// # Errors
///
/// Fails if the log cannot be parsed, the configuration is rejected, or any
/// replay pass fails.
pub fn run<W: Write>(cli: &Cli, out: &mut W) -> Result<()> {
    let log = heapreplay_log::parse_file(&cli.file)
        .wrap_err_with(|| format!("Failed to load allocation log {}", cli.file.display()))?;
    debug!(
        source = log.source(),
        records = log.len(),
        allocations = log.allocation_count(),
        "log loaded"
    );

    let driver = BenchmarkDriver::new(cli.driver_config())?;
    let allocators = driver
        .validate_all(log.records())
        .wrap_err("Validation pass failed")?;

    let report = RunReport {
        log: log.stats(),
        allocators,
    };
    if cli.json {
        writeln!(out, "{}", render_json(&report)?)?;
    } else {
        write!(out, "{}", render_text(&report, cli.stats))?;
    }
    out.flush()?;

    if cli.dry_run {
        return Ok(());
    }

    let mut criterion = driver.criterion();
    driver
        .benchmark(log.records(), &mut criterion)
        .wrap_err("Benchmark failed")?;
    criterion.final_summary();
    Ok(())
}

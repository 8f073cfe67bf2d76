//! heapreplay binary

#![warn(clippy::all)]

use clap::Parser;
use color_eyre::Result;
use heapreplay_cli::Cli;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    // stdout carries the report; logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("heapreplay=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let stdout = std::io::stdout();
    heapreplay_cli::run(&cli, &mut stdout.lock())
}

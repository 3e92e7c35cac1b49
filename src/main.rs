mod cli;
mod clock;
mod console;
mod engine;
mod error;
mod gaps;
mod model;
mod orchestrator;
mod roster;
mod schedule;
mod storage;
mod text_summary;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn startup_banner() -> String {
    format!("Starting onoffon {}", env!("CARGO_PKG_VERSION"))
}

fn main() -> Result<()> {
    // Logs go to stderr; stdout carries status output.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("onoffon=info")),
        )
        .init();
    info!("{}", startup_banner());

    let args = cli::Cli::parse();

    // The local UTC offset can only be looked up reliably while this is the
    // only thread, so the clock is created before the runtime.
    let wall = clock::SystemClock::new();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;
    let res = runtime.block_on(cli::run(args, wall));
    // Don't wait on a stdin read that will never finish.
    runtime.shutdown_background();
    res
}

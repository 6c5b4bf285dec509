//! # badgesync
//!
//! Daily entry point. Each invocation is one short batch run:
//!
//! 1. **Configuration** - defaults, `badgesync.toml`, `BADGESYNC_*`, flags
//! 2. **Fetch** - one GET of the analytics feed, stored as today's snapshot
//! 3. **Badges** - reconcile badge files against the newest snapshot
//! 4. **History** - fold every snapshot and reconcile history files
//!
//! Any failure, including a single artifact that could not be written, makes
//! the process exit non-zero after the summary has been printed.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![forbid(clippy::panic)]
#![deny(clippy::expect_used)]

use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use badgesync::cli::Cli;
use badgesync::commands::execute_command;

#[tokio::main]
async fn main() -> Result<()> {
    let start_time = Instant::now();

    init_tracing();

    let cli = Cli::parse();
    let result = execute_command(cli).await;

    info!(elapsed_ms = start_time.elapsed().as_millis(), "Run finished");
    result
}

/// Initialize tracing subscriber.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

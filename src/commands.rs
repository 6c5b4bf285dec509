//! CLI command handlers.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use anyhow::{Context, Result};
use badgesync_core::{SnapshotDate, SyncConfig};
use tracing::info;

use crate::cli::{Cli, Commands};
use crate::fetch::HttpFetcher;
use crate::pipeline::{Pipeline, RunSummary};
use crate::report;

/// Resolve configuration from defaults, file, environment and flags.
///
/// # Errors
///
/// Returns an error if the file or environment holds invalid values, or the
/// result fails validation.
pub fn resolve_config(cli: &Cli) -> Result<SyncConfig> {
    let mut config = SyncConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    cli.apply_overrides(&mut config);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Execute a CLI command.
///
/// The summary is printed and written to `--report` before failures are
/// turned into an error, so a partially failed run is still reported.
///
/// # Errors
///
/// Returns an error if the run failed, including storage write failures.
pub async fn execute_command(cli: Cli) -> Result<()> {
    let config = resolve_config(&cli)?;
    let pipeline = Pipeline::from_config(&config, cli.dry_run);

    let summary = match cli.command {
        Commands::Fetch => cmd_fetch(&config, &pipeline).await?,
        Commands::Badges { date } => cmd_badges(&pipeline, date).await?,
        Commands::History => cmd_history(&pipeline).await?,
        Commands::Sync => cmd_sync(&config, &pipeline).await?,
    };

    print!("{}", report::render_summary(&summary));
    if let Some(path) = &cli.report {
        report::write_summary(path, &summary)?;
        info!(path = %path.display(), "Wrote run report");
    }

    summary
        .ensure_success()
        .context("Some artifacts could not be written")
}

async fn cmd_fetch(config: &SyncConfig, pipeline: &Pipeline) -> Result<RunSummary> {
    let fetcher = HttpFetcher::from_config(config)?;
    let fetched = pipeline
        .fetch(&fetcher, SnapshotDate::today())
        .await
        .context("Fetch failed")?;
    Ok(RunSummary {
        fetch: Some(fetched),
        ..RunSummary::default()
    })
}

async fn cmd_badges(pipeline: &Pipeline, date: Option<SnapshotDate>) -> Result<RunSummary> {
    let badges = pipeline
        .badges(date)
        .await
        .context("Badge reconciliation failed")?;
    Ok(RunSummary {
        badges: Some(badges),
        ..RunSummary::default()
    })
}

async fn cmd_history(pipeline: &Pipeline) -> Result<RunSummary> {
    let history = pipeline
        .history()
        .await
        .context("History rebuild failed")?;
    Ok(RunSummary {
        history: Some(history),
        ..RunSummary::default()
    })
}

async fn cmd_sync(config: &SyncConfig, pipeline: &Pipeline) -> Result<RunSummary> {
    let fetcher = HttpFetcher::from_config(config)?;
    pipeline
        .sync(&fetcher, SnapshotDate::today())
        .await
        .context("Daily sync failed")
}

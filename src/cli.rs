//! CLI command definitions using clap.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::path::PathBuf;

use badgesync_core::{SnapshotDate, SyncConfig};
use clap::{Parser, Subcommand};

/// badgesync - installation badges for custom integrations
#[derive(Parser, Debug)]
#[command(name = "badgesync")]
#[command(version)]
#[command(about = "Keep installation badges and history in sync with daily analytics snapshots")]
#[command(
    long_about = "badgesync fetches the custom integration analytics feed once a day, stores the raw snapshot, and reconciles per-integration badge and history files so that only real changes touch the tree."
)]
pub struct Cli {
    /// Configuration file (defaults to ./badgesync.toml if present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Report what would change without writing anything
    #[arg(long, global = true, default_value_t = false)]
    pub dry_run: bool,

    /// Write a JSON summary of the run to this path
    #[arg(long, global = true)]
    pub report: Option<PathBuf>,

    /// Directory of raw dated snapshots
    #[arg(long, global = true)]
    pub snapshot_root: Option<PathBuf>,

    /// Directory of badge files
    #[arg(long, global = true)]
    pub badge_root: Option<PathBuf>,

    /// Directory of history files
    #[arg(long, global = true)]
    pub history_root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Apply the path flags on top of a loaded configuration.
    pub fn apply_overrides(&self, config: &mut SyncConfig) {
        if let Some(path) = &self.snapshot_root {
            config.snapshot_root.clone_from(path);
        }
        if let Some(path) = &self.badge_root {
            config.badge_root.clone_from(path);
        }
        if let Some(path) = &self.history_root {
            config.history_root.clone_from(path);
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch today's snapshot and store it
    Fetch,

    /// Reconcile badge files from a stored snapshot
    Badges {
        /// Snapshot date (YYYY-MM-DD); defaults to the newest stored snapshot
        #[arg(long, value_parser = parse_date)]
        date: Option<SnapshotDate>,
    },

    /// Rebuild history files from every stored snapshot
    History,

    /// Fetch, then reconcile badges and history
    Sync,
}

fn parse_date(input: &str) -> Result<SnapshotDate, String> {
    SnapshotDate::parse(input).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "badgesync",
            "badges",
            "--date",
            "2024-01-02",
            "--dry-run",
            "--badge-root",
            "/tmp/badges",
        ]);
        let cli = cli.ok();

        assert_eq!(cli.as_ref().map(|c| c.dry_run), Some(true));
        assert!(matches!(
            cli.as_ref().map(|c| &c.command),
            Some(Commands::Badges { date: Some(_) })
        ));

        let mut config = SyncConfig::default();
        if let Some(cli) = &cli {
            cli.apply_overrides(&mut config);
        }
        assert_eq!(config.badge_root, PathBuf::from("/tmp/badges"));
        assert_eq!(config.history_root, SyncConfig::default().history_root);
    }

    #[test]
    fn test_rejects_bad_date() {
        assert!(Cli::try_parse_from(["badgesync", "badges", "--date", "2024-13-01"]).is_err());
    }

    #[test]
    fn test_plain_subcommands() {
        for name in ["fetch", "history", "sync"] {
            assert!(Cli::try_parse_from(["badgesync", name]).is_ok(), "{name}");
        }
    }
}

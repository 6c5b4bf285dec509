//! Console and JSON rendering of run results.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use badgesync_reconciler::RunReport;
use itertools::Itertools;

use crate::pipeline::{FetchOutcome, RunSummary};

/// Human summary of one fetch.
pub fn render_fetch(outcome: &FetchOutcome) -> String {
    let mut out = format!(
        "Fetched {} integrations for {}",
        outcome.entities, outcome.date
    );
    if !outcome.stored {
        out.push_str(" (not stored, dry run)");
    }
    if let Some(reason) = &outcome.malformed {
        let _ = write!(out, " (does not decode: {reason})");
    }
    out
}

/// Human summary of one reconciliation, one line per changed artifact.
pub fn render_run(mode: &str, report: &RunReport) -> String {
    let verb = |done: &'static str, planned: &'static str| {
        if report.dry_run { planned } else { done }
    };
    let mut out = String::new();

    // Writing to a String cannot fail.
    let _ = writeln!(
        out,
        "{mode}: {} integrations checked, {} change(s){}",
        report.entities_checked,
        report.total_changes(),
        if report.dry_run { " (dry run)" } else { "" }
    );
    for (entity, changes) in &report.changes {
        for id in changes.added() {
            let _ = writeln!(out, "  {} {entity}/{id}", verb("added", "would add"));
        }
        for id in changes.modified() {
            let _ = writeln!(out, "  {} {entity}/{id}", verb("updated", "would update"));
        }
        for id in changes.removed() {
            let _ = writeln!(out, "  {} {entity}/{id}", verb("removed", "would remove"));
        }
    }
    if !report.evicted.is_empty() {
        let _ = writeln!(
            out,
            "  {} integrations: {}",
            verb("evicted", "would evict"),
            report.evicted.iter().join(", ")
        );
    }
    for failure in &report.failures {
        let _ = writeln!(out, "  failed {failure}");
    }
    out
}

/// Human summary of a whole run.
pub fn render_summary(summary: &RunSummary) -> String {
    let mut out = String::new();
    if let Some(fetch) = &summary.fetch {
        out.push_str(&render_fetch(fetch));
        out.push('\n');
    }
    if let Some(badges) = &summary.badges {
        out.push_str(&render_run("badges", badges));
    }
    if let Some(history) = &summary.history {
        out.push_str(&render_run("history", history));
    }
    out
}

/// Write the machine-readable summary to `path`.
///
/// # Errors
///
/// Returns an error if the summary cannot be serialized or written.
pub fn write_summary(path: &Path, summary: &RunSummary) -> Result<()> {
    let json = serde_json::to_string_pretty(summary).context("Failed to serialize run summary")?;
    std::fs::write(path, format!("{json}\n"))
        .with_context(|| format!("Failed to write report to {}", path.display()))
}

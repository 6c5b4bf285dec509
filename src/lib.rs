#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! # badgesync
//!
//! Installation-count badges and history for custom integrations, kept in
//! sync with daily analytics snapshots.
//!
//! This library re-exports the workspace crates for convenience.

pub use badgesync_core;
pub use badgesync_reconciler;
pub use badgesync_snapshots;

pub mod cli;
pub mod commands;
pub mod fetch;
pub mod pipeline;
pub mod report;

pub use fetch::{Fetcher, HttpFetcher, StaticFetcher};
pub use pipeline::{badge_desired, history_desired, FetchOutcome, Pipeline, RunSummary};

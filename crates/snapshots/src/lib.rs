//! Raw snapshot storage and history folding.
//!
//! - [`SnapshotStore`]: date-keyed storage of raw snapshots, at most one per day
//! - [`SeriesBuilder`]: folds a corpus of snapshots into per-integration series
//! - [`load_corpus`]: reads a whole store, skipping unreadable days

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod series;
pub mod store;

pub use series::{load_corpus, Corpus, HistorySeries, SeriesBuilder};
pub use store::{DateIndex, FsSnapshotStore, InMemorySnapshotStore, SnapshotStore};

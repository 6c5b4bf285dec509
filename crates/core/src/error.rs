//! Core error taxonomy for badgesync operations.
//!
//! All errors are explicit, typed, and recoverable - no panics allowed.

use std::fmt;
use std::path::PathBuf;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::artifact::ArtifactId;
use crate::types::{EntityId, SnapshotDate};

/// One artifact (or whole entity container) that could not be written or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactFailure {
    pub entity: EntityId,
    /// `None` when the failure concerns the entity container itself.
    pub artifact: Option<ArtifactId>,
    pub reason: String,
}

impl ArtifactFailure {
    /// Failure of a single artifact write or delete.
    pub fn artifact(entity: EntityId, artifact: ArtifactId, reason: impl Into<String>) -> Self {
        Self {
            entity,
            artifact: Some(artifact),
            reason: reason.into(),
        }
    }

    /// Failure to tear down an entity container.
    pub fn container(entity: EntityId, reason: impl Into<String>) -> Self {
        Self {
            entity,
            artifact: None,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ArtifactFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.artifact {
            Some(id) => write!(f, "{}/{}: {}", self.entity, id, self.reason),
            None => write!(f, "{}: {}", self.entity, self.reason),
        }
    }
}

fn join_failures(failures: &[ArtifactFailure]) -> String {
    failures.iter().join("; ")
}

/// Core error type for badgesync operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Snapshot acquisition failed; nothing was stored.
    #[error("failed to fetch snapshot: {reason}")]
    Fetch { reason: String },

    #[error("no snapshot stored for {date}")]
    NotFound { date: SnapshotDate },

    #[error("snapshot for {date} is malformed: {reason}")]
    MalformedSnapshot { date: SnapshotDate, reason: String },

    /// One or more artifact writes/deletes failed. Every failed id is listed.
    #[error("{} storage write(s) failed: {}", .failures.len(), join_failures(.failures))]
    StorageWrite { failures: Vec<ArtifactFailure> },

    /// The raw snapshot for `date` could not be written.
    ///
    /// This is the snapshot-store counterpart of `StorageWrite`, which lists
    /// per-artifact failures. Use [`Error::is_storage_write`] to match either.
    #[error("failed to store snapshot for {date}: {reason}")]
    SnapshotWrite { date: SnapshotDate, reason: String },

    /// There is nothing to derive artifacts from.
    #[error("no valid snapshots found under '{root}'")]
    NoSnapshots { root: PathBuf },

    #[error("failed to read '{path}': {reason}")]
    StorageRead { path: PathBuf, reason: String },

    #[error("invalid snapshot date '{input}': {reason}")]
    InvalidDate { input: String, reason: String },

    #[error("invalid artifact id '{input}'")]
    InvalidArtifactId { input: String },

    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl Error {
    /// Create a fetch error.
    pub fn fetch(reason: impl Into<String>) -> Self {
        Self::Fetch {
            reason: reason.into(),
        }
    }

    /// Create a not-found error.
    pub const fn not_found(date: SnapshotDate) -> Self {
        Self::NotFound { date }
    }

    /// Create a malformed snapshot error.
    pub fn malformed_snapshot(date: SnapshotDate, reason: impl Into<String>) -> Self {
        Self::MalformedSnapshot {
            date,
            reason: reason.into(),
        }
    }

    /// Create a storage write error listing every failure.
    pub const fn storage_write(failures: Vec<ArtifactFailure>) -> Self {
        Self::StorageWrite { failures }
    }

    /// Create a snapshot write error.
    pub fn snapshot_write(date: SnapshotDate, reason: impl Into<String>) -> Self {
        Self::SnapshotWrite {
            date,
            reason: reason.into(),
        }
    }

    /// Create a no-snapshots error.
    pub fn no_snapshots(root: impl Into<PathBuf>) -> Self {
        Self::NoSnapshots { root: root.into() }
    }

    /// Create a storage read error.
    pub fn storage_read(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::StorageRead {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid date error.
    pub fn invalid_date(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDate {
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid artifact id error.
    pub fn invalid_artifact_id(input: impl Into<String>) -> Self {
        Self::InvalidArtifactId {
            input: input.into(),
        }
    }

    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Whether a caller may skip the affected date and carry on.
    pub const fn is_skippable(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::MalformedSnapshot { .. })
    }

    /// Whether a write to snapshot or artifact storage failed.
    pub const fn is_storage_write(&self) -> bool {
        matches!(self, Self::StorageWrite { .. } | Self::SnapshotWrite { .. })
    }

    /// Failures carried by a storage write error, empty otherwise.
    pub fn failures(&self) -> &[ArtifactFailure] {
        match self {
            Self::StorageWrite { failures } => failures,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_write_lists_every_failure() {
        let entity = EntityId::new("foo");
        let err = Error::storage_write(vec![
            ArtifactFailure::artifact(entity.clone(), ArtifactId::total(), "disk full"),
            ArtifactFailure::artifact(entity, ArtifactId::version("1.0"), "permission denied"),
        ]);

        let msg = err.to_string();
        assert!(msg.starts_with("2 storage write(s) failed"));
        assert!(msg.contains("foo/total: disk full"));
        assert!(msg.contains("foo/version-1.0: permission denied"));
        assert_eq!(err.failures().len(), 2);
    }

    #[test]
    fn test_skippable_errors() {
        let date = SnapshotDate::from_ymd(2024, 1, 1).ok();
        assert!(date.is_some());
        if let Some(date) = date {
            assert!(Error::not_found(date).is_skippable());
            assert!(Error::malformed_snapshot(date, "eof").is_skippable());
        }
        assert!(!Error::fetch("timeout").is_skippable());
    }

    #[test]
    fn test_both_write_variants_are_storage_writes() {
        let date = SnapshotDate::from_ymd(2024, 1, 1).ok();
        assert!(date.is_some_and(|date| Error::snapshot_write(date, "disk full").is_storage_write()));
        assert!(Error::storage_write(Vec::new()).is_storage_write());
        assert!(!Error::fetch("timeout").is_storage_write());
        assert!(!Error::no_snapshots("raw").is_storage_write());
    }

    #[test]
    fn test_container_failure_display() {
        let failure = ArtifactFailure::container(EntityId::new("bar"), "busy");
        assert_eq!(failure.to_string(), "bar: busy");
    }
}

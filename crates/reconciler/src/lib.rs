//! Diff-based reconciliation of derived artifact trees.
//!
//! Derived storage is treated the way a controller treats cluster state:
//!
//! - **Desired state**: every artifact an entity should have, with its value
//! - **Observed state**: what is currently materialized in the store
//! - **Plan**: the minimal add / update / remove diff between the two
//! - **Apply**: execute the plan and report exactly what changed
//!
//! Running twice against the same desired state is a no-op the second time.
//!
//! # Example
//!
//! ```ignore
//! use badgesync_reconciler::{FsArtifactStore, Reconciler, ReconcilerConfig};
//! use std::sync::Arc;
//!
//! let store = Arc::new(FsArtifactStore::badges("docs/badges"));
//! let reconciler = Reconciler::new(store, ReconcilerConfig::default());
//! let report = reconciler.reconcile_all(&desired).await?;
//! report.ensure_success()?;
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod error;
pub mod format;
pub mod reconciler;
pub mod store;
pub mod types;

// Re-export main types
pub use error::FormatError;
pub use format::ArtifactFormat;
pub use reconciler::{Reconciler, ReconcilerConfig};
pub use store::{ArtifactStore, FsArtifactStore, InMemoryArtifactStore};
pub use types::{
    observed_from, ChangeReport, DesiredArtifacts, ObservedArtifacts, ReconcilePlan, RunReport,
};

//! Core types, errors, and configuration shared by the badgesync crates.
//!
//! - [`Snapshot`]: one dated capture of installation counts per integration
//! - [`ArtifactId`] / [`ArtifactValue`]: the derived facts written per integration
//! - [`SyncConfig`]: explicit paths and limits handed to every component
//! - [`Error`]: the shared error taxonomy

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod artifact;
pub mod config;
pub mod error;
pub mod result;
pub mod types;

pub use artifact::{ArtifactId, ArtifactKind, ArtifactValue, Series};
pub use config::SyncConfig;
pub use error::{ArtifactFailure, Error};
pub use result::{Result, ResultExt};
pub use types::{EntityId, EntityMetrics, Snapshot, SnapshotDate};

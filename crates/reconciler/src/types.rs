//! Core types for the reconciler.

use std::collections::{BTreeMap, BTreeSet};

use badgesync_core::{ArtifactFailure, ArtifactId, ArtifactValue, EntityId, Error};
use serde::Serialize;

/// Complete desired state of one entity. Absent ids must not exist.
pub type DesiredArtifacts = BTreeMap<ArtifactId, ArtifactValue>;

/// Artifacts currently materialized for one entity.
///
/// `None` marks a stored artifact whose content could not be decoded.
pub type ObservedArtifacts = BTreeMap<ArtifactId, Option<ArtifactValue>>;

/// Treat a set of known values as an observed state.
pub fn observed_from(values: DesiredArtifacts) -> ObservedArtifacts {
    values.into_iter().map(|(id, value)| (id, Some(value))).collect()
}

/// Diff between a desired and an observed state, ids ascending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    /// Desired but not observed.
    pub add: BTreeMap<ArtifactId, ArtifactValue>,
    /// Observed with a value different from the desired one.
    pub update: BTreeMap<ArtifactId, ArtifactValue>,
    /// Observed but not desired.
    pub remove: BTreeSet<ArtifactId>,
}

impl ReconcilePlan {
    /// Compute the minimal diff. Unchanged ids appear nowhere in the plan.
    pub fn compute(desired: &DesiredArtifacts, observed: &ObservedArtifacts) -> Self {
        let mut plan = Self::default();

        for (id, value) in desired {
            match observed.get(id) {
                None => {
                    plan.add.insert(id.clone(), value.clone());
                }
                Some(Some(current)) if current == value => {}
                Some(_) => {
                    plan.update.insert(id.clone(), value.clone());
                }
            }
        }

        plan.remove = observed
            .keys()
            .filter(|id| !desired.contains_key(*id))
            .cloned()
            .collect();

        plan
    }

    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.update.is_empty() && self.remove.is_empty()
    }

    pub fn len(&self) -> usize {
        self.add
            .len()
            .saturating_add(self.update.len())
            .saturating_add(self.remove.len())
    }

    /// The report this plan yields when every operation succeeds.
    pub fn to_report(&self) -> ChangeReport {
        ChangeReport::new(
            self.add.keys().cloned().collect(),
            self.update.keys().cloned().collect(),
            self.remove.iter().cloned().collect(),
        )
    }
}

/// What one reconciliation changed.
///
/// Sequences are disjoint and sorted by id. The value is fixed at construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeReport {
    added: Vec<ArtifactId>,
    modified: Vec<ArtifactId>,
    removed: Vec<ArtifactId>,
    total_changes: usize,
}

impl ChangeReport {
    pub fn new(
        mut added: Vec<ArtifactId>,
        mut modified: Vec<ArtifactId>,
        mut removed: Vec<ArtifactId>,
    ) -> Self {
        added.sort();
        modified.sort();
        removed.sort();
        let total_changes = added
            .len()
            .saturating_add(modified.len())
            .saturating_add(removed.len());
        Self {
            added,
            modified,
            removed,
            total_changes,
        }
    }

    pub fn added(&self) -> &[ArtifactId] {
        &self.added
    }

    pub fn modified(&self) -> &[ArtifactId] {
        &self.modified
    }

    pub fn removed(&self) -> &[ArtifactId] {
        &self.removed
    }

    pub const fn total_changes(&self) -> usize {
        self.total_changes
    }

    pub const fn is_empty(&self) -> bool {
        self.total_changes == 0
    }
}

/// Outcome of reconciling a whole entity universe.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Whether changes were only planned, not applied.
    pub dry_run: bool,
    /// Entities in the desired universe.
    pub entities_checked: usize,
    /// Per-entity changes; entities without changes are omitted.
    pub changes: BTreeMap<EntityId, ChangeReport>,
    /// Entities torn down because they left the desired universe.
    pub evicted: BTreeSet<EntityId>,
    /// Every write, delete, or teardown that failed.
    pub failures: Vec<ArtifactFailure>,
}

impl RunReport {
    /// Artifact changes across all entities plus evicted entities.
    pub fn total_changes(&self) -> usize {
        self.changes
            .values()
            .map(ChangeReport::total_changes)
            .fold(self.evicted.len(), usize::saturating_add)
    }

    pub fn is_converged(&self) -> bool {
        self.total_changes() == 0 && self.failures.is_empty()
    }

    /// Surface collected failures as a single error.
    ///
    /// # Errors
    ///
    /// Returns `Error::StorageWrite` listing every failure, if there were any.
    pub fn ensure_success(&self) -> Result<(), Error> {
        if self.failures.is_empty() {
            Ok(())
        } else {
            Err(Error::storage_write(self.failures.clone()))
        }
    }
}

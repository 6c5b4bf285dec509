//! Reconciler implementation.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use badgesync_core::{ArtifactFailure, ArtifactId, EntityId, Error, Result, SyncConfig};
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use itertools::{Either, Itertools};
use tracing::{debug, info, warn};

use crate::store::ArtifactStore;
use crate::types::{ChangeReport, DesiredArtifacts, ObservedArtifacts, ReconcilePlan, RunReport};

/// Configuration for the reconciler.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Plan and report changes without touching storage.
    pub dry_run: bool,
    /// Maximum entities reconciled at the same time.
    pub max_parallel_entities: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            max_parallel_entities: 8,
        }
    }
}

impl ReconcilerConfig {
    pub fn from_sync_config(config: &SyncConfig, dry_run: bool) -> Self {
        Self {
            dry_run,
            max_parallel_entities: config.max_parallel_entities,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    Added,
    Modified,
    Removed,
}

/// Result of applying one entity's plan.
struct EntityOutcome {
    entity: EntityId,
    report: ChangeReport,
    failures: Vec<ArtifactFailure>,
}

/// Failures carried by `err`, or a single failure for `id` if it has none.
fn failures_of(err: &Error, entity: &EntityId, id: Option<&ArtifactId>) -> Vec<ArtifactFailure> {
    if err.failures().is_empty() {
        let failure = match id {
            Some(id) => ArtifactFailure::artifact(entity.clone(), id.clone(), err.to_string()),
            None => ArtifactFailure::container(entity.clone(), err.to_string()),
        };
        vec![failure]
    } else {
        err.failures().to_vec()
    }
}

/// Diff-based reconciler for derived artifacts.
pub struct Reconciler {
    store: Arc<dyn ArtifactStore>,
    config: ReconcilerConfig,
}

impl Reconciler {
    /// Create a new reconciler.
    pub fn new(store: Arc<dyn ArtifactStore>, config: ReconcilerConfig) -> Self {
        Self { store, config }
    }

    /// Compute what reconciling `desired` against `observed` would do.
    pub fn plan(desired: &DesiredArtifacts, observed: &ObservedArtifacts) -> ReconcilePlan {
        ReconcilePlan::compute(desired, observed)
    }

    /// Make the stored artifacts of `entity` equal to `desired`.
    ///
    /// Every operation is attempted even when some fail.
    ///
    /// # Errors
    ///
    /// Returns `Error::StorageWrite` listing every artifact whose write or
    /// delete failed.
    pub async fn reconcile(
        &self,
        entity: &EntityId,
        desired: &DesiredArtifacts,
        observed: &ObservedArtifacts,
    ) -> Result<ChangeReport> {
        let plan = Self::plan(desired, observed);
        let (report, failures) = self.apply(entity, &plan).await;
        if failures.is_empty() {
            Ok(report)
        } else {
            Err(Error::storage_write(failures))
        }
    }

    /// Observe `entity` from the store, then reconcile it.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity cannot be observed, or
    /// `Error::StorageWrite` if any operation failed.
    pub async fn reconcile_entity(
        &self,
        entity: &EntityId,
        desired: &DesiredArtifacts,
    ) -> Result<ChangeReport> {
        let observed = self.store.observe(entity).await?;
        self.reconcile(entity, desired, &observed).await
    }

    /// Tear down every entity in `previously_tracked` that is not in `known`.
    ///
    /// # Errors
    ///
    /// Returns `Error::StorageWrite` listing every entity whose container
    /// could not be removed.
    pub async fn reconcile_missing_entities(
        &self,
        known: &BTreeSet<EntityId>,
        previously_tracked: &BTreeSet<EntityId>,
    ) -> Result<BTreeSet<EntityId>> {
        let (evicted, failures) = self.evict(known, previously_tracked).await;
        if failures.is_empty() {
            Ok(evicted)
        } else {
            Err(Error::storage_write(failures))
        }
    }

    /// Reconcile a whole entity universe.
    ///
    /// Entities in the store but not in `desired` are evicted afterwards.
    /// Write failures do not stop other entities; they are collected in
    /// [`RunReport::failures`] for [`RunReport::ensure_success`].
    ///
    /// # Errors
    ///
    /// Returns an error only if the store's entities cannot be listed.
    pub async fn reconcile_all(
        &self,
        desired: &BTreeMap<EntityId, DesiredArtifacts>,
    ) -> Result<RunReport> {
        let tracked = self.store.list_entities().await?;

        info!(
            desired = desired.len(),
            tracked = tracked.len(),
            dry_run = self.config.dry_run,
            "Starting reconciliation"
        );

        let outcomes: Vec<EntityOutcome> = stream::iter(desired)
            .map(|(entity, artifacts)| self.run_entity(entity, artifacts))
            .buffer_unordered(self.config.max_parallel_entities.max(1))
            .collect()
            .await;

        let mut report = RunReport {
            dry_run: self.config.dry_run,
            entities_checked: desired.len(),
            ..RunReport::default()
        };
        for outcome in outcomes {
            report.failures.extend(outcome.failures);
            if !outcome.report.is_empty() {
                report.changes.insert(outcome.entity, outcome.report);
            }
        }

        let known: BTreeSet<EntityId> = desired.keys().cloned().collect();
        let (evicted, failures) = self.evict(&known, &tracked).await;
        report.evicted = evicted;
        report.failures.extend(failures);

        if report.is_converged() {
            info!("Artifacts converged");
        } else {
            info!(
                changed_entities = report.changes.len(),
                evicted = report.evicted.len(),
                total_changes = report.total_changes(),
                failures = report.failures.len(),
                "Reconciliation complete"
            );
        }

        Ok(report)
    }

    async fn run_entity(&self, entity: &EntityId, desired: &DesiredArtifacts) -> EntityOutcome {
        let (report, failures) = match self.store.observe(entity).await {
            Ok(observed) => {
                let plan = Self::plan(desired, &observed);
                self.apply(entity, &plan).await
            }
            Err(e) => {
                warn!(entity = %entity, error = %e, "Failed to observe entity");
                (ChangeReport::default(), failures_of(&e, entity, None))
            }
        };
        EntityOutcome {
            entity: entity.clone(),
            report,
            failures,
        }
    }

    /// Apply a plan, recording an id only once its operation succeeded.
    async fn apply(
        &self,
        entity: &EntityId,
        plan: &ReconcilePlan,
    ) -> (ChangeReport, Vec<ArtifactFailure>) {
        if plan.is_empty() {
            return (ChangeReport::default(), Vec::new());
        }

        debug!(
            entity = %entity,
            add = plan.add.len(),
            update = plan.update.len(),
            remove = plan.remove.len(),
            "Planned changes"
        );

        if self.config.dry_run {
            return (plan.to_report(), Vec::new());
        }

        let operations = plan
            .add
            .iter()
            .map(|(id, value)| (Change::Added, id, Some(value)))
            .chain(
                plan.update
                    .iter()
                    .map(|(id, value)| (Change::Modified, id, Some(value))),
            )
            .chain(plan.remove.iter().map(|id| (Change::Removed, id, None)));

        let outcomes = join_all(operations.map(|(change, id, value)| async move {
            let result = match value {
                Some(value) => self.store.write(entity, id, value).await,
                None => self.store.delete(entity, id).await,
            };
            (change, id, result)
        }))
        .await;

        let (applied, failed): (Vec<_>, Vec<_>) =
            outcomes
                .into_iter()
                .partition_map(|(change, id, result)| match result {
                    Ok(()) => Either::Left((change, id.clone())),
                    Err(e) => Either::Right((id, e)),
                });

        let failures = failed
            .into_iter()
            .flat_map(|(id, e)| {
                warn!(entity = %entity, artifact = %id, error = %e, "Artifact operation failed");
                failures_of(&e, entity, Some(id))
            })
            .collect();

        let ids_for = |wanted: Change| {
            applied
                .iter()
                .filter(|(change, _)| *change == wanted)
                .map(|(_, id)| id.clone())
                .collect::<Vec<_>>()
        };
        let (added, modified, removed) = (
            ids_for(Change::Added),
            ids_for(Change::Modified),
            ids_for(Change::Removed),
        );
        debug!(entity = %entity, applied = applied.len(), "Applied changes");

        (ChangeReport::new(added, modified, removed), failures)
    }

    async fn evict(
        &self,
        known: &BTreeSet<EntityId>,
        previously_tracked: &BTreeSet<EntityId>,
    ) -> (BTreeSet<EntityId>, Vec<ArtifactFailure>) {
        let missing: Vec<&EntityId> = previously_tracked.difference(known).collect();
        if missing.is_empty() {
            return (BTreeSet::new(), Vec::new());
        }
        if self.config.dry_run {
            return (missing.into_iter().cloned().collect(), Vec::new());
        }

        let outcomes = join_all(missing.into_iter().map(|entity| async move {
            (entity, self.store.remove_entity(entity).await)
        }))
        .await;

        let mut evicted = BTreeSet::new();
        let mut failures = Vec::new();
        for (entity, result) in outcomes {
            match result {
                Ok(()) => {
                    info!(entity = %entity, "Evicted entity");
                    evicted.insert(entity.clone());
                }
                Err(e) => {
                    warn!(entity = %entity, error = %e, "Failed to evict entity");
                    failures.extend(failures_of(&e, entity, None));
                }
            }
        }
        (evicted, failures)
    }

    /// Get the configuration.
    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }
}

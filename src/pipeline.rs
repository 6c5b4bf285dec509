//! Daily badge and history runs.
//!
//! Both modes reduce to the same shape: derive a complete desired state per
//! entity, then hand the whole universe to a [`Reconciler`].

use std::collections::BTreeMap;
use std::sync::Arc;

use badgesync_core::{
    ArtifactId, ArtifactValue, EntityId, Error, Result, Snapshot, SnapshotDate, SyncConfig,
};
use badgesync_reconciler::{
    ArtifactStore, DesiredArtifacts, FsArtifactStore, Reconciler, ReconcilerConfig, RunReport,
};
use badgesync_snapshots::{load_corpus, FsSnapshotStore, SeriesBuilder, SnapshotStore};
use serde::Serialize;
use tracing::{info, warn};

use crate::fetch::Fetcher;

/// Desired state for every entity of a universe.
pub type DesiredUniverse = BTreeMap<EntityId, DesiredArtifacts>;

/// Badge artifacts for every entity in `snapshot`.
pub fn badge_desired(snapshot: &Snapshot) -> DesiredUniverse {
    snapshot
        .iter()
        .map(|(entity, metrics)| {
            let total = metrics
                .total
                .map(|total| (ArtifactId::total(), ArtifactValue::Count(total)));
            let versions = metrics
                .versions
                .iter()
                .map(|(label, count)| (ArtifactId::version(label), ArtifactValue::Count(*count)));
            (entity.clone(), total.into_iter().chain(versions).collect())
        })
        .collect()
}

/// History artifacts for every entity in the newest folded snapshot.
///
/// Each such entity keeps every series ever seen for it, including versions
/// that have since disappeared. Entities missing from the newest snapshot are
/// left out and so get evicted.
pub fn history_desired(builder: &SeriesBuilder) -> DesiredUniverse {
    let Some((_, current)) = builder.current() else {
        return DesiredUniverse::new();
    };
    current
        .iter()
        .map(|entity| {
            let artifacts = builder
                .series()
                .get(entity)
                .map(|per_entity| {
                    per_entity
                        .iter()
                        .map(|(id, series)| (id.clone(), ArtifactValue::Series(series.clone())))
                        .collect()
                })
                .unwrap_or_default();
            (entity.clone(), artifacts)
        })
        .collect()
}

/// A snapshot obtained by a fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchOutcome {
    pub date: SnapshotDate,
    pub entities: usize,
    /// Whether the body was written to the snapshot store.
    pub stored: bool,
    /// Why the body does not decode as a snapshot, if it does not.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub malformed: Option<String>,
    #[serde(skip)]
    pub snapshot: Option<Snapshot>,
}

/// Everything one run did, in the shape written to `--report`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch: Option<FetchOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badges: Option<RunReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<RunReport>,
}

impl RunSummary {
    pub fn total_changes(&self) -> usize {
        self.reports()
            .map(RunReport::total_changes)
            .fold(0, usize::saturating_add)
    }

    /// Fail if any reconciliation recorded storage failures.
    ///
    /// # Errors
    ///
    /// Returns `Error::StorageWrite` listing the failures of every mode.
    pub fn ensure_success(&self) -> Result<()> {
        let failures: Vec<_> = self
            .reports()
            .flat_map(|report| report.failures.iter().cloned())
            .collect();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::storage_write(failures))
        }
    }

    fn reports(&self) -> impl Iterator<Item = &RunReport> {
        self.badges.iter().chain(self.history.iter())
    }
}

/// Snapshot store plus the two derived artifact trees.
pub struct Pipeline {
    snapshots: Arc<dyn SnapshotStore>,
    badges: Reconciler,
    history: Reconciler,
    snapshot_source: String,
    dry_run: bool,
}

impl Pipeline {
    pub fn new(
        snapshots: Arc<dyn SnapshotStore>,
        badges: Arc<dyn ArtifactStore>,
        history: Arc<dyn ArtifactStore>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            snapshots,
            dry_run: config.dry_run,
            badges: Reconciler::new(badges, config.clone()),
            history: Reconciler::new(history, config),
            snapshot_source: "snapshot store".to_string(),
        }
    }

    /// Filesystem-backed pipeline for the configured roots.
    pub fn from_config(config: &SyncConfig, dry_run: bool) -> Self {
        let mut pipeline = Self::new(
            Arc::new(FsSnapshotStore::from_config(config)),
            Arc::new(FsArtifactStore::badges(&config.badge_root)),
            Arc::new(FsArtifactStore::history(&config.history_root)),
            ReconcilerConfig::from_sync_config(config, dry_run),
        );
        pipeline.snapshot_source = config.snapshot_root.display().to_string();
        pipeline
    }

    /// Fetch a snapshot and store its body verbatim under `date`.
    ///
    /// Any JSON object is stored, even one whose metrics do not decode; such
    /// a day is skipped later when reading. Nothing is stored when the fetch
    /// fails or the body is not a JSON object, or in dry-run mode.
    ///
    /// # Errors
    ///
    /// Returns `Error::Fetch` if the fetch failed or returned something other
    /// than a JSON object, or `Error::SnapshotWrite` if the body could not be
    /// stored.
    pub async fn fetch(&self, fetcher: &dyn Fetcher, date: SnapshotDate) -> Result<FetchOutcome> {
        let body = fetcher.fetch().await?;
        let entities = serde_json::from_slice::<serde_json::Map<String, serde_json::Value>>(&body)
            .map_err(|e| Error::fetch(format!("response is not a JSON object: {e}")))?
            .len();

        let stored = !self.dry_run;
        if stored {
            self.snapshots.put_raw(date, &body).await?;
        }

        let (snapshot, malformed) = match Snapshot::from_json(date, &body) {
            Ok(snapshot) => (Some(snapshot), None),
            Err(Error::MalformedSnapshot { reason, .. }) => {
                warn!(%date, %reason, "Fetched snapshot does not decode");
                (None, Some(reason))
            }
            Err(e) => return Err(e),
        };
        info!(%date, entities, stored, "Fetched snapshot");
        Ok(FetchOutcome {
            date,
            entities,
            stored,
            malformed,
            snapshot,
        })
    }

    /// Reconcile badges from the snapshot of `date`, or the newest one.
    ///
    /// # Errors
    ///
    /// Returns `Error::NoSnapshots` if nothing is stored, the snapshot's read
    /// error, or the error of listing derived storage.
    pub async fn badges(&self, date: Option<SnapshotDate>) -> Result<RunReport> {
        let date = match date {
            Some(date) => date,
            None => self
                .snapshots
                .latest()
                .await?
                .ok_or_else(|| Error::no_snapshots(&self.snapshot_source))?,
        };
        let snapshot = self.snapshots.get(date).await?;
        info!(%date, entities = snapshot.len(), "Reconciling badges");
        self.badges_from(&snapshot).await
    }

    /// Reconcile badges from an in-memory snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if derived storage cannot be listed.
    pub async fn badges_from(&self, snapshot: &Snapshot) -> Result<RunReport> {
        self.badges.reconcile_all(&badge_desired(snapshot)).await
    }

    /// Rebuild history from every stored snapshot.
    ///
    /// # Errors
    ///
    /// Returns `Error::NoSnapshots` if no stored snapshot is readable.
    pub async fn history(&self) -> Result<RunReport> {
        self.history_with(None).await
    }

    /// Rebuild history, folding in `extra` on top of the stored corpus.
    async fn history_with(&self, extra: Option<(SnapshotDate, &Snapshot)>) -> Result<RunReport> {
        let corpus = load_corpus(self.snapshots.as_ref()).await?;
        for date in &corpus.skipped {
            warn!(%date, "Skipping unreadable snapshot");
        }

        let mut builder = SeriesBuilder::from_corpus(corpus.iter());
        if let Some((date, snapshot)) = extra {
            builder.fold(date, snapshot);
        }
        let Some((latest, entities)) = builder.current() else {
            return Err(Error::no_snapshots(&self.snapshot_source));
        };
        info!(
            files = corpus.snapshots.len(),
            %latest,
            integrations = entities.len(),
            "Rebuilding history"
        );

        self.history.reconcile_all(&history_desired(&builder)).await
    }

    /// The daily job: fetch, then badges, then history.
    ///
    /// In dry-run mode the fetched snapshot is used in memory only.
    ///
    /// # Errors
    ///
    /// Stops at the first mode that fails outright, including
    /// `Error::MalformedSnapshot` when the fetched body was stored but does
    /// not decode. Storage write failures do not stop the run; they are left
    /// in the summary.
    pub async fn sync(&self, fetcher: &dyn Fetcher, date: SnapshotDate) -> Result<RunSummary> {
        let fetched = self.fetch(fetcher, date).await?;
        let Some(snapshot) = &fetched.snapshot else {
            let reason = fetched.malformed.clone().unwrap_or_default();
            return Err(Error::malformed_snapshot(date, reason));
        };
        let badges = self.badges_from(snapshot).await?;
        let extra = (!fetched.stored).then_some((fetched.date, snapshot));
        let history = self.history_with(extra).await?;
        Ok(RunSummary {
            fetch: Some(fetched),
            badges: Some(badges),
            history: Some(history),
        })
    }
}

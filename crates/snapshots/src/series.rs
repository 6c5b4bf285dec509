//! Folding dated snapshots into per-integration time series.

use std::collections::{BTreeMap, BTreeSet};

use badgesync_core::{
    ArtifactId, EntityId, Result, ResultExt, Series, Snapshot, SnapshotDate,
};
use tracing::{debug, info};

use crate::store::SnapshotStore;

/// Series per entity, one per artifact (total or version label).
pub type HistorySeries = BTreeMap<EntityId, BTreeMap<ArtifactId, Series>>;

/// Accumulates snapshots into sparse, date-ordered series.
///
/// Output ordering never depends on the order snapshots are folded in.
#[derive(Debug, Clone, Default)]
pub struct SeriesBuilder {
    series: HistorySeries,
    latest: Option<(SnapshotDate, BTreeSet<EntityId>)>,
}

impl SeriesBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a whole corpus of dated snapshots.
    pub fn build<'a, I>(snapshots: I) -> HistorySeries
    where
        I: IntoIterator<Item = (SnapshotDate, &'a Snapshot)>,
    {
        Self::from_corpus(snapshots).finish()
    }

    /// Fold a whole corpus, keeping the builder for further inspection.
    pub fn from_corpus<'a, I>(snapshots: I) -> Self
    where
        I: IntoIterator<Item = (SnapshotDate, &'a Snapshot)>,
    {
        snapshots
            .into_iter()
            .fold(Self::new(), |mut builder, (date, snapshot)| {
                builder.fold(date, snapshot);
                builder
            })
    }

    /// Record every value present in `snapshot` at `date`.
    ///
    /// Entities missing from the snapshot get no entry for that date.
    pub fn fold(&mut self, date: SnapshotDate, snapshot: &Snapshot) {
        for (entity, metrics) in snapshot.iter() {
            let per_entity = self.series.entry(entity.clone()).or_default();
            if let Some(total) = metrics.total {
                per_entity
                    .entry(ArtifactId::total())
                    .or_default()
                    .insert(date, total);
            }
            for (label, count) in &metrics.versions {
                per_entity
                    .entry(ArtifactId::version(label))
                    .or_default()
                    .insert(date, *count);
            }
        }

        if self.latest.as_ref().is_none_or(|(latest, _)| date >= *latest) {
            self.latest = Some((date, snapshot.entity_ids().cloned().collect()));
        }
    }

    /// Newest folded date and the entities present on it.
    pub fn current(&self) -> Option<(SnapshotDate, &BTreeSet<EntityId>)> {
        self.latest.as_ref().map(|(date, entities)| (*date, entities))
    }

    pub fn series(&self) -> &HistorySeries {
        &self.series
    }

    pub fn finish(self) -> HistorySeries {
        self.series
    }
}

/// Snapshots loaded for a history rebuild.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    /// Readable snapshots, ascending by date.
    pub snapshots: Vec<(SnapshotDate, Snapshot)>,
    /// Listed dates that could not be read.
    pub skipped: Vec<SnapshotDate>,
}

impl Corpus {
    pub fn iter(&self) -> impl Iterator<Item = (SnapshotDate, &Snapshot)> {
        self.snapshots.iter().map(|(date, snapshot)| (*date, snapshot))
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn first_date(&self) -> Option<SnapshotDate> {
        self.snapshots.first().map(|(date, _)| *date)
    }

    pub fn last_date(&self) -> Option<SnapshotDate> {
        self.snapshots.last().map(|(date, _)| *date)
    }
}

/// Read every stored snapshot, skipping dates that are missing or malformed.
///
/// # Errors
///
/// Returns an error only when the store cannot be listed or a read fails for
/// a reason other than a missing or malformed snapshot.
pub async fn load_corpus(store: &dyn SnapshotStore) -> Result<Corpus> {
    let index = store.list_dates().await?;
    let mut corpus = Corpus::default();

    for date in &index {
        match store.get(date).await.skip_recoverable()? {
            Some(snapshot) => corpus.snapshots.push((date, snapshot)),
            None => corpus.skipped.push(date),
        }
    }

    debug!(
        loaded = corpus.snapshots.len(),
        skipped = corpus.skipped.len(),
        ignored_names = index.skipped().len(),
        "Loaded snapshot corpus"
    );
    if let (Some(first), Some(last)) = (corpus.first_date(), corpus.last_date()) {
        info!(files = corpus.snapshots.len(), %first, %last, "Loaded raw snapshots");
    }
    Ok(corpus)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::store::InMemorySnapshotStore;
    use badgesync_core::EntityMetrics;

    fn day(s: &str) -> SnapshotDate {
        SnapshotDate::parse(s).unwrap()
    }

    fn totals(series: &HistorySeries, entity: &str) -> Vec<(String, u64)> {
        series
            .get(&EntityId::new(entity))
            .and_then(|per| per.get(&ArtifactId::total()))
            .map(|s| s.iter().map(|(d, v)| (d.to_string(), *v)).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_totals_over_two_days() {
        let first = Snapshot::new().with_entity("foo", EntityMetrics::new().with_total(10));
        let second = Snapshot::new().with_entity("foo", EntityMetrics::new().with_total(15));

        let series = SeriesBuilder::build([
            (day("2024-01-01"), &first),
            (day("2024-01-02"), &second),
        ]);

        assert_eq!(
            totals(&series, "foo"),
            vec![("2024-01-01".to_string(), 10), ("2024-01-02".to_string(), 15)]
        );
    }

    #[test]
    fn test_order_independent() {
        let a = Snapshot::new().with_entity("foo", EntityMetrics::new().with_total(1));
        let b = Snapshot::new().with_entity("foo", EntityMetrics::new().with_total(2));

        let forward = SeriesBuilder::build([(day("2024-01-01"), &a), (day("2024-01-02"), &b)]);
        let reverse = SeriesBuilder::build([(day("2024-01-02"), &b), (day("2024-01-01"), &a)]);

        assert_eq!(forward, reverse);
    }

    #[test]
    fn test_sparse_series_and_versions() {
        let first = Snapshot::new()
            .with_entity("bar", EntityMetrics::new().with_total(3))
            .with_entity(
                "foo",
                EntityMetrics::new().with_version("1.0", 4).with_version("a/b", 1),
            );
        let second = Snapshot::new().with_entity("foo", EntityMetrics::new().with_version("1.0", 5));

        let builder =
            SeriesBuilder::from_corpus([(day("2024-01-01"), &first), (day("2024-01-02"), &second)]);

        assert_eq!(totals(builder.series(), "bar").len(), 1);
        let foo = builder.series().get(&EntityId::new("foo")).unwrap();
        assert_eq!(foo.get(&ArtifactId::version("1.0")).unwrap().len(), 2);
        assert_eq!(foo.get(&ArtifactId::version("a/b")).unwrap().len(), 1);
        assert!(foo.get(&ArtifactId::total()).is_none());

        let (date, current) = builder.current().unwrap();
        assert_eq!(date, day("2024-01-02"));
        assert!(current.contains(&EntityId::new("foo")));
        assert!(!current.contains(&EntityId::new("bar")));
    }

    #[test]
    fn test_current_tracks_newest_date_regardless_of_fold_order() {
        let newer = Snapshot::new().with_entity("foo", EntityMetrics::new());
        let older = Snapshot::new().with_entity("bar", EntityMetrics::new());
        let mut builder = SeriesBuilder::new();
        builder.fold(day("2024-02-01"), &newer);
        builder.fold(day("2024-01-01"), &older);

        let (date, current) = builder.current().unwrap();
        assert_eq!(date, day("2024-02-01"));
        assert_eq!(current.len(), 1);
    }

    #[tokio::test]
    async fn test_load_corpus_skips_malformed_days() {
        let store = InMemorySnapshotStore::new();
        let good = Snapshot::new().with_entity("foo", EntityMetrics::new().with_total(1));
        store.put(day("2024-01-01"), &good).await.unwrap();
        store
            .put_raw(day("2024-01-02"), br#"{"foo": {"total": "lots"}}"#)
            .await
            .unwrap();
        store.put(day("2024-01-03"), &good).await.unwrap();

        let corpus = load_corpus(&store).await.unwrap();

        assert_eq!(corpus.snapshots.len(), 2);
        assert_eq!(corpus.skipped, vec![day("2024-01-02")]);
        assert_eq!(corpus.last_date(), Some(day("2024-01-03")));
    }
}

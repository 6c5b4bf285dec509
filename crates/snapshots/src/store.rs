//! Snapshot store trait and implementations.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use badgesync_core::{Error, Result, Snapshot, SnapshotDate, SyncConfig};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

/// Ascending, deduplicated list of stored snapshot dates.
///
/// Iterating does not consume the index, so several callers can walk it
/// independently.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DateIndex {
    dates: Vec<SnapshotDate>,
    skipped: Vec<String>,
}

impl DateIndex {
    /// Build an index from dates in any order.
    pub fn new(dates: impl IntoIterator<Item = SnapshotDate>, skipped: Vec<String>) -> Self {
        let mut dates: Vec<_> = dates.into_iter().collect();
        dates.sort_unstable();
        dates.dedup();
        Self { dates, skipped }
    }

    pub fn iter(&self) -> impl Iterator<Item = SnapshotDate> + '_ {
        self.dates.iter().copied()
    }

    pub fn latest(&self) -> Option<SnapshotDate> {
        self.dates.last().copied()
    }

    /// Entry names that were not valid snapshot dates.
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}

impl<'a> IntoIterator for &'a DateIndex {
    type Item = SnapshotDate;
    type IntoIter = std::iter::Copied<std::slice::Iter<'a, SnapshotDate>>;

    fn into_iter(self) -> Self::IntoIter {
        self.dates.iter().copied()
    }
}

/// Trait for raw snapshot storage backends.
///
/// At most one snapshot exists per date. Rewriting a date replaces it, but
/// only while it is still the newest date; once a later day is stored the
/// earlier one is frozen.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Store the body exactly as fetched under `date`.
    ///
    /// # Errors
    ///
    /// Returns `Error::SnapshotWrite` if `date` is already stored and a later
    /// date exists, or if the bytes cannot be written.
    async fn put_raw(&self, date: SnapshotDate, bytes: &[u8]) -> Result<()>;

    /// Store `snapshot` under `date`.
    ///
    /// # Errors
    ///
    /// See [`SnapshotStore::put_raw`].
    async fn put(&self, date: SnapshotDate, snapshot: &Snapshot) -> Result<()> {
        let bytes = snapshot.to_json(date)?;
        self.put_raw(date, &bytes).await
    }

    /// List every stored date.
    async fn list_dates(&self) -> Result<DateIndex>;

    /// Read the snapshot stored under `date`.
    async fn get(&self, date: SnapshotDate) -> Result<Snapshot>;

    /// Newest stored date, if any.
    async fn latest(&self) -> Result<Option<SnapshotDate>> {
        Ok(self.list_dates().await?.latest())
    }
}

/// Refuse to rewrite `date` once a later snapshot exists.
fn check_rewrite(date: SnapshotDate, exists: bool, latest: Option<SnapshotDate>) -> Result<()> {
    match latest {
        Some(latest) if exists && latest > date => Err(Error::snapshot_write(
            date,
            format!("already stored and superseded by {latest}"),
        )),
        _ => Ok(()),
    }
}

/// In-memory snapshot store for testing.
///
/// Keeps encoded bytes so that decoding behaves like the filesystem store.
#[derive(Default)]
pub struct InMemorySnapshotStore {
    snapshots: RwLock<BTreeMap<SnapshotDate, Vec<u8>>>,
}

impl InMemorySnapshotStore {
    /// Create a new in-memory snapshot store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new in-memory snapshot store wrapped in an Arc.
    pub fn new_arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn put_raw(&self, date: SnapshotDate, bytes: &[u8]) -> Result<()> {
        let mut snapshots = self.snapshots.write().await;
        let latest = snapshots.keys().next_back().copied();
        check_rewrite(date, snapshots.contains_key(&date), latest)?;
        snapshots.insert(date, bytes.to_vec());
        Ok(())
    }

    async fn list_dates(&self) -> Result<DateIndex> {
        let snapshots = self.snapshots.read().await;
        Ok(DateIndex::new(snapshots.keys().copied(), Vec::new()))
    }

    async fn get(&self, date: SnapshotDate) -> Result<Snapshot> {
        let snapshots = self.snapshots.read().await;
        let bytes = snapshots.get(&date).ok_or_else(|| Error::not_found(date))?;
        Snapshot::from_json(date, bytes)
    }
}

/// Snapshot store keeping one `{YYYY-MM-DD}.json` file per day under a root
/// directory.
pub struct FsSnapshotStore {
    root: PathBuf,
    // Serializes writers sharing this store; the rename covers other processes.
    write_lock: Mutex<()>,
}

impl FsSnapshotStore {
    /// Create a store rooted at `root`. The directory is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.snapshot_root.clone())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the snapshot file for `date`.
    pub fn path_for(&self, date: SnapshotDate) -> PathBuf {
        self.root.join(format!("{date}.json"))
    }

    // Callers hold `write_lock`.
    async fn write_atomic(&self, date: SnapshotDate, bytes: &[u8]) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await.map_err(|e| {
            Error::snapshot_write(
                date,
                format!("failed to create {}: {e}", self.root.display()),
            )
        })?;

        let target = self.path_for(date);
        let temp = self
            .root
            .join(format!(".{date}.json.{}.tmp", ulid::Ulid::new()));

        if let Err(e) = tokio::fs::write(&temp, bytes).await {
            discard_temp(&temp).await;
            return Err(Error::snapshot_write(
                date,
                format!("failed to write {}: {e}", temp.display()),
            ));
        }
        if let Err(e) = tokio::fs::rename(&temp, &target).await {
            discard_temp(&temp).await;
            return Err(Error::snapshot_write(
                date,
                format!("failed to move snapshot into {}: {e}", target.display()),
            ));
        }
        Ok(())
    }
}

async fn discard_temp(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        debug!(path = %path.display(), error = %e, "Temp file not removed");
    }
}

#[async_trait]
impl SnapshotStore for FsSnapshotStore {
    async fn put_raw(&self, date: SnapshotDate, bytes: &[u8]) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let exists = tokio::fs::try_exists(self.path_for(date))
            .await
            .map_err(|e| Error::snapshot_write(date, e.to_string()))?;
        check_rewrite(date, exists, self.latest().await?)?;

        self.write_atomic(date, bytes).await?;
        debug!(%date, bytes = bytes.len(), "Stored snapshot");
        Ok(())
    }

    async fn list_dates(&self) -> Result<DateIndex> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(DateIndex::default()),
            Err(e) => return Err(Error::storage_read(&self.root, e.to_string())),
        };

        let mut dates = Vec::new();
        let mut skipped = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::storage_read(&self.root, e.to_string()))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            // In-flight temp files and anything that is not JSON are not candidates.
            if name.starts_with('.') {
                continue;
            }
            let Some(stem) = name.strip_suffix(".json") else {
                continue;
            };
            match SnapshotDate::parse(stem) {
                Ok(date) => dates.push(date),
                Err(e) => {
                    warn!(file = %name, error = %e, "Skipping entry that is not a snapshot date");
                    skipped.push(name);
                }
            }
        }
        skipped.sort();

        Ok(DateIndex::new(dates, skipped))
    }

    async fn get(&self, date: SnapshotDate) -> Result<Snapshot> {
        let path = self.path_for(date);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(Error::not_found(date)),
            Err(e) => return Err(Error::storage_read(&path, e.to_string())),
        };
        Snapshot::from_json(date, &bytes)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use badgesync_core::EntityMetrics;

    fn day(s: &str) -> SnapshotDate {
        SnapshotDate::parse(s).unwrap()
    }

    fn snapshot(total: u64) -> Snapshot {
        Snapshot::new().with_entity("foo", EntityMetrics::new().with_total(total))
    }

    #[tokio::test]
    async fn test_fs_put_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSnapshotStore::new(dir.path().join("raw"));

        store.put(day("2024-01-01"), &snapshot(10)).await.unwrap();

        assert!(store.path_for(day("2024-01-01")).is_file());
        assert_eq!(store.get(day("2024-01-01")).await.unwrap(), snapshot(10));
    }

    #[tokio::test]
    async fn test_fs_same_day_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSnapshotStore::new(dir.path());

        store.put(day("2024-01-01"), &snapshot(10)).await.unwrap();
        store.put(day("2024-01-01"), &snapshot(12)).await.unwrap();

        let index = store.list_dates().await.unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(store.get(day("2024-01-01")).await.unwrap(), snapshot(12));
    }

    #[tokio::test]
    async fn test_fs_superseded_day_is_frozen() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSnapshotStore::new(dir.path());
        store.put(day("2024-01-01"), &snapshot(10)).await.unwrap();
        store.put(day("2024-01-02"), &snapshot(15)).await.unwrap();

        let result = store.put(day("2024-01-01"), &snapshot(99)).await;

        assert!(matches!(result, Err(Error::SnapshotWrite { .. })));
        assert!(result.is_err_and(|e| e.is_storage_write()));
        assert_eq!(store.get(day("2024-01-01")).await.unwrap(), snapshot(10));
        // A missing earlier day can still be backfilled.
        store.put(day("2023-12-31"), &snapshot(5)).await.unwrap();
        assert_eq!(store.list_dates().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_fs_put_raw_keeps_bytes_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSnapshotStore::new(dir.path());
        let body = br#"{"foo":{"total":3,"versions":{"1.0":3},"first_seen":"2023"}}"#;

        store.put_raw(day("2024-01-01"), body).await.unwrap();

        assert_eq!(std::fs::read(store.path_for(day("2024-01-01"))).unwrap(), body);
        let decoded = store.get(day("2024-01-01")).await.unwrap();
        assert_eq!(decoded.get(&"foo".into()).and_then(|m| m.total), Some(3));
    }

    #[tokio::test]
    async fn test_fs_concurrent_writers_leave_one_complete_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FsSnapshotStore::new(dir.path()));

        let writes = (0..8u64).map(|n| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.put(day("2024-05-05"), &snapshot(n)).await })
        });
        for handle in writes {
            handle.await.unwrap().unwrap();
        }

        let stored = store.get(day("2024-05-05")).await.unwrap();
        let total = stored.get(&"foo".into()).and_then(|m| m.total);
        assert!(total.is_some_and(|t| t < 8));
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["2024-05-05.json".to_string()]);
    }

    #[tokio::test]
    async fn test_fs_list_dates_sorted_and_skips_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSnapshotStore::new(dir.path());
        store.put(day("2024-01-03"), &snapshot(3)).await.unwrap();
        store.put(day("2024-01-01"), &snapshot(1)).await.unwrap();
        std::fs::write(dir.path().join("notes.json"), "{}").unwrap();
        std::fs::write(dir.path().join("2024-02-30.json"), "{}").unwrap();
        std::fs::write(dir.path().join("README.md"), "raw data").unwrap();

        let index = store.list_dates().await.unwrap();

        let dates: Vec<_> = index.iter().map(|d| d.to_string()).collect();
        assert_eq!(dates, vec!["2024-01-01", "2024-01-03"]);
        assert_eq!(index.skipped(), ["2024-02-30.json", "notes.json"]);
        // Restartable.
        assert_eq!(index.iter().count(), 2);
        assert_eq!(index.latest(), Some(day("2024-01-03")));
    }

    #[tokio::test]
    async fn test_fs_missing_root_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSnapshotStore::new(dir.path().join("absent"));
        assert!(store.list_dates().await.unwrap().is_empty());
        assert_eq!(store.latest().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_fs_get_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSnapshotStore::new(dir.path());
        std::fs::write(store.path_for(day("2024-01-02")), "{not json").unwrap();

        assert!(matches!(
            store.get(day("2024-01-01")).await,
            Err(Error::NotFound { .. })
        ));
        assert!(matches!(
            store.get(day("2024-01-02")).await,
            Err(Error::MalformedSnapshot { .. })
        ));
    }

    #[tokio::test]
    async fn test_fs_put_fails_when_root_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("raw");
        std::fs::write(&blocker, "").unwrap();
        let store = FsSnapshotStore::new(&blocker);

        let result = store.put(day("2024-01-01"), &snapshot(1)).await;
        assert!(matches!(result, Err(Error::SnapshotWrite { .. })));
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = InMemorySnapshotStore::new();
        store.put_raw(day("2024-01-01"), b"garbage").await.unwrap();
        store.put(day("2024-01-02"), &snapshot(2)).await.unwrap();

        let index = store.list_dates().await.unwrap();
        assert_eq!(index.latest(), Some(day("2024-01-02")));
        assert!(matches!(
            store.get(day("2024-01-01")).await,
            Err(Error::MalformedSnapshot { .. })
        ));
        assert!(matches!(
            store.get(day("2023-12-31")).await,
            Err(Error::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_in_memory_superseded_day_is_frozen() {
        let store = InMemorySnapshotStore::new();
        store.put(day("2024-01-01"), &snapshot(10)).await.unwrap();
        store.put(day("2024-01-01"), &snapshot(11)).await.unwrap();
        store.put(day("2024-01-02"), &snapshot(15)).await.unwrap();

        assert!(store.put(day("2024-01-01"), &snapshot(99)).await.is_err());
        assert!(store.put(day("2024-01-02"), &snapshot(16)).await.is_ok());
        assert_eq!(store.get(day("2024-01-01")).await.unwrap(), snapshot(11));
    }
}

//! Derived artifact storage.
//!
//! Storage is a two-level tree: one container per entity, one artifact per
//! leaf. Only the reconciler writes to it.

use std::collections::{BTreeMap, BTreeSet};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use badgesync_core::{
    ArtifactFailure, ArtifactId, ArtifactValue, EntityId, Error, Result, ResultExt,
};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::format::ArtifactFormat;
use crate::types::ObservedArtifacts;

/// Trait for derived artifact storage backends.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Entities that currently have a container.
    async fn list_entities(&self) -> Result<BTreeSet<EntityId>>;

    /// Artifacts currently stored for `entity`; empty if it has no container.
    async fn observe(&self, entity: &EntityId) -> Result<ObservedArtifacts>;

    /// Create or replace one artifact, creating the container as needed.
    async fn write(&self, entity: &EntityId, id: &ArtifactId, value: &ArtifactValue) -> Result<()>;

    /// Delete one artifact. Deleting an absent artifact succeeds.
    async fn delete(&self, entity: &EntityId, id: &ArtifactId) -> Result<()>;

    /// Delete an entity's container and everything in it.
    async fn remove_entity(&self, entity: &EntityId) -> Result<()>;
}

fn artifact_error(entity: &EntityId, id: &ArtifactId, reason: impl Into<String>) -> Error {
    Error::storage_write(vec![ArtifactFailure::artifact(
        entity.clone(),
        id.clone(),
        reason,
    )])
}

fn container_error(entity: &EntityId, reason: impl Into<String>) -> Error {
    Error::storage_write(vec![ArtifactFailure::container(entity.clone(), reason)])
}

/// Artifact store keeping `{root}/{entity}/{artifact}.json` files.
pub struct FsArtifactStore {
    root: PathBuf,
    format: ArtifactFormat,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>, format: ArtifactFormat) -> Self {
        Self {
            root: root.into(),
            format,
        }
    }

    /// Store for badge files.
    pub fn badges(root: impl Into<PathBuf>) -> Self {
        Self::new(root, ArtifactFormat::Badge)
    }

    /// Store for history series files.
    pub fn history(root: impl Into<PathBuf>) -> Self {
        Self::new(root, ArtifactFormat::Series)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub const fn format(&self) -> ArtifactFormat {
        self.format
    }

    /// Container directory of `entity`.
    ///
    /// Entity ids come from remote data, so anything that is not a single
    /// plain path component is refused.
    fn container(&self, entity: &EntityId) -> std::result::Result<PathBuf, String> {
        let name = entity.as_str();
        let mut components = Path::new(name).components();
        let single_normal = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        if !single_normal || name.starts_with('.') || name.contains(['/', '\\']) {
            return Err(format!("entity id '{name}' is not a safe directory name"));
        }
        Ok(self.root.join(name))
    }

    async fn read_artifact(&self, path: &Path) -> Option<ArtifactValue> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Artifact unreadable");
                return None;
            }
        };
        match self.format.decode(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Artifact undecodable");
                None
            }
        }
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn list_entities(&self) -> Result<BTreeSet<EntityId>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeSet::new()),
            Err(e) => return Err(Error::storage_read(&self.root, e.to_string())),
        };

        let mut entities = BTreeSet::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::storage_read(&self.root, e.to_string()))?
        {
            let is_dir = entry
                .file_type()
                .await
                .map_err(|e| Error::storage_read(entry.path(), e.to_string()))
                .into_option_logged()
                .is_some_and(|kind| kind.is_dir());
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_dir && !name.starts_with('.') {
                entities.insert(EntityId::new(name));
            }
        }
        Ok(entities)
    }

    async fn observe(&self, entity: &EntityId) -> Result<ObservedArtifacts> {
        let dir = self
            .container(entity)
            .map_err(|reason| Error::storage_read(&self.root, reason))?;
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(ObservedArtifacts::new()),
            Err(e) => return Err(Error::storage_read(&dir, e.to_string())),
        };

        let mut observed = ObservedArtifacts::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::storage_read(&dir, e.to_string()))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(id) = ArtifactId::from_file_name(&name) else {
                debug!(entity = %entity, file = %name, "Ignoring non-artifact file");
                continue;
            };
            if !id.is_canonical() {
                debug!(entity = %entity, file = %name, "Found legacy artifact name");
            }
            let value = self.read_artifact(&entry.path()).await;
            observed.insert(id, value);
        }
        Ok(observed)
    }

    async fn write(&self, entity: &EntityId, id: &ArtifactId, value: &ArtifactValue) -> Result<()> {
        let dir = self
            .container(entity)
            .map_err(|reason| artifact_error(entity, id, reason))?;
        let bytes = self
            .format
            .encode(value)
            .map_err(|e| artifact_error(entity, id, e.to_string()))?;

        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| artifact_error(entity, id, format!("failed to create {}: {e}", dir.display())))?;

        let target = dir.join(id.file_name());
        let temp = dir.join(format!(".{}.{}.tmp", id.file_name(), ulid::Ulid::new()));
        if let Err(e) = tokio::fs::write(&temp, &bytes).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(artifact_error(
                entity,
                id,
                format!("failed to write {}: {e}", temp.display()),
            ));
        }
        if let Err(e) = tokio::fs::rename(&temp, &target).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(artifact_error(
                entity,
                id,
                format!("failed to replace {}: {e}", target.display()),
            ));
        }
        Ok(())
    }

    async fn delete(&self, entity: &EntityId, id: &ArtifactId) -> Result<()> {
        let dir = self
            .container(entity)
            .map_err(|reason| artifact_error(entity, id, reason))?;
        let path = dir.join(id.file_name());
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(artifact_error(
                entity,
                id,
                format!("failed to remove {}: {e}", path.display()),
            )),
        }
    }

    async fn remove_entity(&self, entity: &EntityId) -> Result<()> {
        let dir = self
            .container(entity)
            .map_err(|reason| container_error(entity, reason))?;
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(container_error(
                entity,
                format!("failed to remove {}: {e}", dir.display()),
            )),
        }
    }
}

type Containers = BTreeMap<EntityId, BTreeMap<ArtifactId, Option<ArtifactValue>>>;

/// In-memory artifact store for testing.
#[derive(Default)]
pub struct InMemoryArtifactStore {
    containers: RwLock<Containers>,
    failing: RwLock<BTreeSet<ArtifactId>>,
}

impl InMemoryArtifactStore {
    /// Create a new in-memory artifact store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new in-memory artifact store wrapped in an Arc.
    pub fn new_arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Make every write and delete of `id` fail, in any entity.
    pub async fn fail_on(&self, id: ArtifactId) {
        self.failing.write().await.insert(id);
    }

    /// Store an artifact whose content cannot be decoded.
    pub async fn insert_unreadable(&self, entity: EntityId, id: ArtifactId) {
        self.containers
            .write()
            .await
            .entry(entity)
            .or_default()
            .insert(id, None);
    }

    /// Decoded contents of one container, if it exists.
    pub async fn contents(&self, entity: &EntityId) -> Option<BTreeMap<ArtifactId, ArtifactValue>> {
        self.containers.read().await.get(entity).map(|artifacts| {
            artifacts
                .iter()
                .filter_map(|(id, value)| value.clone().map(|v| (id.clone(), v)))
                .collect()
        })
    }

    async fn check(&self, entity: &EntityId, id: &ArtifactId) -> Result<()> {
        if self.failing.read().await.contains(id) {
            Err(artifact_error(entity, id, "injected failure"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn list_entities(&self) -> Result<BTreeSet<EntityId>> {
        Ok(self.containers.read().await.keys().cloned().collect())
    }

    async fn observe(&self, entity: &EntityId) -> Result<ObservedArtifacts> {
        Ok(self
            .containers
            .read()
            .await
            .get(entity)
            .cloned()
            .unwrap_or_default())
    }

    async fn write(&self, entity: &EntityId, id: &ArtifactId, value: &ArtifactValue) -> Result<()> {
        self.check(entity, id).await?;
        self.containers
            .write()
            .await
            .entry(entity.clone())
            .or_default()
            .insert(id.clone(), Some(value.clone()));
        Ok(())
    }

    async fn delete(&self, entity: &EntityId, id: &ArtifactId) -> Result<()> {
        self.check(entity, id).await?;
        if let Some(artifacts) = self.containers.write().await.get_mut(entity) {
            artifacts.remove(id);
        }
        Ok(())
    }

    async fn remove_entity(&self, entity: &EntityId) -> Result<()> {
        self.containers.write().await.remove(entity);
        Ok(())
    }
}

//! Single-file JSON resource store.

use crate::traits::ResourceStore;
use crate::{StoreError, StoreResult};
use async_trait::async_trait;
use medledger_types::{LedgerReference, ResourceId, TrackedResource};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default)]
    resources: BTreeMap<ResourceId, Vec<LedgerReference>>,
}

/// Keeps every tracked resource in one JSON document.
///
/// Each mutation rewrites the document through a synced temp file and rename while
/// holding the store lock, so a crash leaves either the old or the new file in place.
/// A failed write rolls the in-memory state back.
#[derive(Debug)]
pub struct JsonFileResourceStore {
    path: PathBuf,
    data: Mutex<StoreDocument>,
}

impl JsonFileResourceStore {
    /// Open the store at `path`, starting empty if the file does not exist.
    ///
    /// An existing but empty file is rejected rather than read as an empty store,
    /// since the store never writes one.
    pub async fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let data = match fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => {
                return Err(StoreError::Serialization(format!(
                    "{}: store file is empty",
                    path.display()
                )))
            }
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                StoreError::Serialization(format!("{}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreDocument::default(),
            Err(e) => return Err(StoreError::Io(format!("{}: {e}", path.display()))),
        };
        debug!(path = %path.display(), resources = data.resources.len(), "opened resource store");

        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, data: &StoreDocument) -> StoreResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Io(e.to_string()))?;
        }

        let bytes = serde_json::to_vec_pretty(data)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let tmp_path = self.path.with_extension("tmp");
        let mut file = fs::File::create(&tmp_path)
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?;
        file.write_all(&bytes)
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?;
        file.sync_all()
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?;
        drop(file);

        fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?;

        // the new document is in place; memory must not roll back past it
        if let Err(e) = self.sync_parent().await {
            warn!(path = %self.path.display(), error = %e, "could not sync store directory");
        }
        Ok(())
    }

    /// Flush the directory entry so the rename itself survives a crash.
    #[cfg(unix)]
    async fn sync_parent(&self) -> StoreResult<()> {
        let parent = match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => parent,
            None => Path::new("."),
        };
        let dir = fs::File::open(parent)
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?;
        dir.sync_all()
            .await
            .map_err(|e| StoreError::Io(e.to_string()))
    }

    #[cfg(not(unix))]
    async fn sync_parent(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[async_trait]
impl ResourceStore for JsonFileResourceStore {
    async fn register(&self, resource: &ResourceId) -> StoreResult<TrackedResource> {
        let mut data = self.data.lock().await;
        if data.resources.contains_key(resource) {
            return Err(StoreError::Conflict(format!(
                "resource {resource} is already tracked"
            )));
        }

        data.resources.insert(resource.clone(), Vec::new());
        if let Err(e) = self.persist(&data).await {
            data.resources.remove(resource);
            return Err(e);
        }
        Ok(TrackedResource::new(resource.clone()))
    }

    async fn get(&self, resource: &ResourceId) -> StoreResult<Option<TrackedResource>> {
        let data = self.data.lock().await;
        Ok(data.resources.get(resource).map(|refs| TrackedResource {
            id: resource.clone(),
            references: refs.clone(),
        }))
    }

    async fn append_reference(
        &self,
        resource: &ResourceId,
        reference: LedgerReference,
    ) -> StoreResult<usize> {
        let mut data = self.data.lock().await;
        let len = {
            let refs = data
                .resources
                .get_mut(resource)
                .ok_or_else(|| StoreError::NotFound(resource.to_string()))?;
            refs.push(reference);
            refs.len()
        };

        if let Err(e) = self.persist(&data).await {
            if let Some(refs) = data.resources.get_mut(resource) {
                refs.pop();
            }
            return Err(e);
        }
        Ok(len)
    }

    async fn list(&self) -> StoreResult<Vec<ResourceId>> {
        let data = self.data.lock().await;
        Ok(data.resources.keys().cloned().collect())
    }
}

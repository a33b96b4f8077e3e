use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use indexmap::IndexMap;
use tnb_core::{ConversationReference, PagedData};
use tokio::sync::Mutex;
use tracing::debug;

use crate::{ReferenceStorage, RegistryEntry, Result, StoreError, page_of};

pub const DEFAULT_STORE_FILENAME: &str = ".notification.localstore.json";

/// Registry file location from environment-style settings.
///
/// `NOTIFICATION_STORE_DIR` wins, then the `TEMP` directory when `RUNNING_ON_AZURE=1`, then
/// the working directory. `NOTIFICATION_STORE_FILENAME` replaces the default file name.
pub fn store_path_from(lookup: impl Fn(&str) -> Option<String>) -> PathBuf {
    let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
    let dir = non_empty("NOTIFICATION_STORE_DIR")
        .or_else(|| {
            lookup("RUNNING_ON_AZURE")
                .is_some_and(|flag| flag.trim() == "1")
                .then(|| non_empty("TEMP"))
                .flatten()
        })
        .unwrap_or_else(|| ".".to_string());
    let file = non_empty("NOTIFICATION_STORE_FILENAME")
        .unwrap_or_else(|| DEFAULT_STORE_FILENAME.to_string());
    PathBuf::from(dir).join(file)
}

/// Registry kept as one pretty-printed JSON object mapping key to reference. Object members
/// appear in insertion order, which is also the listing order.
///
/// Every call reads the whole document and mutations write it back. Calls from the same
/// process are serialized; other processes writing the file are not coordinated with.
pub struct LocalFileStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl LocalFileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Storage at `dir/.notification.localstore.json`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(DEFAULT_STORE_FILENAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<IndexMap<String, ConversationReference>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(IndexMap::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        if raw.trim().is_empty() {
            return Ok(IndexMap::new());
        }
        serde_json::from_str(&raw).map_err(|source| StoreError::Decode {
            path: self.path.clone(),
            source,
        })
    }

    async fn persist(&self, entries: &IndexMap<String, ConversationReference>) -> Result<()> {
        let payload = serde_json::to_string_pretty(entries).map_err(StoreError::Encode)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| StoreError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        tokio::fs::write(&self.path, payload)
            .await
            .map_err(|source| StoreError::Io {
                path: self.path.clone(),
                source,
            })?;
        debug!(path = %self.path.display(), entries = entries.len(), "registry written");
        Ok(())
    }
}

#[async_trait]
impl ReferenceStorage for LocalFileStorage {
    async fn read(&self, key: &str) -> Result<Option<ConversationReference>> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.shift_remove(key))
    }

    async fn add(
        &self,
        key: &str,
        reference: ConversationReference,
        overwrite: bool,
    ) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        if !overwrite && entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), reference);
        self.persist(&entries).await?;
        Ok(true)
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        if entries.shift_remove(key).is_none() {
            return Ok(false);
        }
        self.persist(&entries).await?;
        Ok(true)
    }

    async fn list_entries(
        &self,
        page_size: Option<usize>,
        continuation_token: Option<&str>,
    ) -> Result<PagedData<RegistryEntry>> {
        let _guard = self.lock.lock().await;
        let entries = self.load().await?;
        page_of(&entries, page_size, continuation_token)
    }
}

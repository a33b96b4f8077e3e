use async_trait::async_trait;
use indexmap::IndexMap;
use tnb_core::{ConversationReference, PagedData};
use tokio::sync::RwLock;

use crate::{ReferenceStorage, RegistryEntry, Result, page_of};

/// Process-local storage. Contents are lost on restart.
#[derive(Default)]
pub struct MemoryStorage {
    inner: RwLock<IndexMap<String, ConversationReference>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage pre-populated with `entries`, listed in the order given.
    pub fn seeded(entries: impl IntoIterator<Item = (String, ConversationReference)>) -> Self {
        Self {
            inner: RwLock::new(entries.into_iter().collect()),
        }
    }

    pub async fn snapshot(&self) -> IndexMap<String, ConversationReference> {
        self.inner.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl ReferenceStorage for MemoryStorage {
    async fn read(&self, key: &str) -> Result<Option<ConversationReference>> {
        Ok(self.inner.read().await.get(key).cloned())
    }

    async fn add(
        &self,
        key: &str,
        reference: ConversationReference,
        overwrite: bool,
    ) -> Result<bool> {
        let mut guard = self.inner.write().await;
        if !overwrite && guard.contains_key(key) {
            return Ok(false);
        }
        guard.insert(key.to_string(), reference);
        Ok(true)
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.inner.write().await.shift_remove(key).is_some())
    }

    async fn list_entries(
        &self,
        page_size: Option<usize>,
        continuation_token: Option<&str>,
    ) -> Result<PagedData<RegistryEntry>> {
        let guard = self.inner.read().await;
        page_of(&guard, page_size, continuation_token)
    }
}

//! Conversation reference registry.
//!
//! [`ReferenceStorage`] is the persistence contract backends implement; the registry itself
//! ([`ConversationReferenceStore`], usually [`DefaultConversationReferenceStore`]) sits on top
//! and is what the notification middleware and bot talk to.
//!
//! Bundled backends list entries in insertion order. A page's continuation token is the key
//! of the first entry of the following page, so removing entries from the page just read
//! never shifts or loses the next one.
mod file;
mod memory;
mod reference_store;
#[cfg(feature = "store_sqlite")]
mod sqlite;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use tnb_core::{ConversationReference, PagedData};

pub use file::{DEFAULT_STORE_FILENAME, LocalFileStorage, store_path_from};
pub use memory::MemoryStorage;
pub use reference_store::DefaultConversationReferenceStore;
#[cfg(feature = "store_sqlite")]
pub use sqlite::{SqliteStorage, sqlite_storage};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to access registry at {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed registry document at {path}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode conversation reference")]
    Encode(#[source] serde_json::Error),
    #[error("continuation token {0} does not name a registry entry")]
    UnknownContinuationToken(String),
    #[error("reference storage backend error")]
    Backend(#[source] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// A stored reference together with the key it is registered under.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryEntry {
    pub key: String,
    pub reference: ConversationReference,
}

/// Persistence contract for registry entries.
///
/// Listing returns entries in insertion order; replacing an entry keeps its position.
/// Implementations decide concurrency control. The bundled backends are not
/// safe against several processes writing the same registry; deployments running more than
/// one bot instance should supply a backend with its own transactions.
#[async_trait]
pub trait ReferenceStorage: Send + Sync {
    async fn read(&self, key: &str) -> Result<Option<ConversationReference>>;

    /// Inserts `reference` under `key`. An existing entry is replaced only when `overwrite`
    /// is set. Returns whether the entry was written.
    async fn add(&self, key: &str, reference: ConversationReference, overwrite: bool)
    -> Result<bool>;

    /// Deletes `key`. Returns whether an entry existed.
    async fn remove(&self, key: &str) -> Result<bool>;

    /// Reads one page of entries with their keys. `page_size` of `None` or `0` reads every
    /// remaining entry. The returned token is the key the next page starts at.
    async fn list_entries(
        &self,
        page_size: Option<usize>,
        continuation_token: Option<&str>,
    ) -> Result<PagedData<RegistryEntry>>;

    async fn list(
        &self,
        page_size: Option<usize>,
        continuation_token: Option<&str>,
    ) -> Result<PagedData<ConversationReference>> {
        Ok(self
            .list_entries(page_size, continuation_token)
            .await?
            .map(|entry| entry.reference))
    }
}

pub type SharedReferenceStorage = Arc<dyn ReferenceStorage>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AddOptions {
    pub overwrite: bool,
}

impl AddOptions {
    pub fn overwrite() -> Self {
        Self { overwrite: true }
    }

    pub fn keep_existing() -> Self {
        Self { overwrite: false }
    }
}

/// Keyed registry of every conversation the bot is installed in.
#[async_trait]
pub trait ConversationReferenceStore: Send + Sync {
    /// Upserts a reference. Returns `false` when the key already existed and `overwrite` was
    /// not requested, leaving the stored value untouched.
    async fn add(
        &self,
        key: &str,
        reference: ConversationReference,
        options: AddOptions,
    ) -> Result<bool>;

    /// Removes a reference. Removing an unknown key is not an error and returns `false`.
    async fn remove(&self, key: &str, reference: &ConversationReference) -> Result<bool>;

    async fn list(
        &self,
        page_size: Option<usize>,
        continuation_token: Option<&str>,
    ) -> Result<PagedData<ConversationReference>>;
}

pub type SharedConversationReferenceStore = Arc<dyn ConversationReferenceStore>;

/// Reads one page of an insertion-ordered map, starting at the entry keyed by
/// `continuation_token`.
pub(crate) fn page_of(
    entries: &IndexMap<String, ConversationReference>,
    page_size: Option<usize>,
    continuation_token: Option<&str>,
) -> Result<PagedData<RegistryEntry>> {
    let start = match continuation_token.filter(|token| !token.is_empty()) {
        Some(token) => entries
            .get_index_of(token)
            .ok_or_else(|| StoreError::UnknownContinuationToken(token.to_string()))?,
        None => 0,
    };
    let limit = page_size.filter(|size| *size > 0).unwrap_or(usize::MAX);
    let end = start.saturating_add(limit).min(entries.len());

    let data = entries
        .iter()
        .skip(start)
        .take(end - start)
        .map(|(key, reference)| RegistryEntry {
            key: key.clone(),
            reference: reference.clone(),
        })
        .collect();
    let next = entries.get_index(end).map(|(key, _)| key.clone());
    Ok(PagedData::new(data, next))
}

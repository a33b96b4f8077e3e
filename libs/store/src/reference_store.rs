use async_trait::async_trait;
use tnb_core::{ConversationReference, PagedData};
use tracing::{debug, instrument};

use crate::{AddOptions, ConversationReferenceStore, Result, SharedReferenceStorage};

/// Registry backed by any [`crate::ReferenceStorage`].
#[derive(Clone)]
pub struct DefaultConversationReferenceStore {
    storage: SharedReferenceStorage,
}

impl DefaultConversationReferenceStore {
    pub fn new(storage: SharedReferenceStorage) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &SharedReferenceStorage {
        &self.storage
    }
}

#[async_trait]
impl ConversationReferenceStore for DefaultConversationReferenceStore {
    #[instrument(name = "registry.add", skip(self, reference), fields(overwrite = options.overwrite))]
    async fn add(
        &self,
        key: &str,
        reference: ConversationReference,
        options: AddOptions,
    ) -> Result<bool> {
        let written = self.storage.add(key, reference, options.overwrite).await?;
        if written {
            debug!(key, "conversation reference stored");
            metrics::counter!("notification_reference_added").increment(1);
        } else {
            debug!(key, "conversation reference already registered");
            metrics::counter!("notification_reference_skipped").increment(1);
        }
        Ok(written)
    }

    #[instrument(name = "registry.remove", skip(self, _reference))]
    async fn remove(&self, key: &str, _reference: &ConversationReference) -> Result<bool> {
        let removed = self.storage.remove(key).await?;
        if removed {
            debug!(key, "conversation reference removed");
            metrics::counter!("notification_reference_removed").increment(1);
        }
        Ok(removed)
    }

    #[instrument(name = "registry.list", skip(self))]
    async fn list(
        &self,
        page_size: Option<usize>,
        continuation_token: Option<&str>,
    ) -> Result<PagedData<ConversationReference>> {
        self.storage.list(page_size, continuation_token).await
    }
}

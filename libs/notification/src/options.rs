use std::env;
use std::path::PathBuf;

use tnb_store::{
    DEFAULT_STORE_FILENAME, SharedConversationReferenceStore, SharedReferenceStorage,
    store_path_from,
};

/// Construction options for [`crate::NotificationBot`].
///
/// `store` wins over `storage`; with neither set the registry is a JSON file at `store_path`.
#[derive(Clone, Default)]
pub struct NotificationOptions {
    pub bot_app_id: String,
    pub store: Option<SharedConversationReferenceStore>,
    pub storage: Option<SharedReferenceStorage>,
    pub store_path: Option<PathBuf>,
}

impl std::fmt::Debug for NotificationOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationOptions")
            .field("bot_app_id", &self.bot_app_id)
            .field("store", &self.store.is_some())
            .field("storage", &self.storage.is_some())
            .field("store_path", &self.store_path)
            .finish()
    }
}

impl NotificationOptions {
    pub fn new(bot_app_id: impl Into<String>) -> Self {
        Self {
            bot_app_id: bot_app_id.into(),
            ..Self::default()
        }
    }

    pub fn with_store(mut self, store: SharedConversationReferenceStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_storage(mut self, storage: SharedReferenceStorage) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = Some(path.into());
        self
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Reads the options through `lookup` instead of the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            bot_app_id: lookup("BOT_ID").unwrap_or_default(),
            store_path: Some(store_path_from(&lookup)),
            ..Self::default()
        }
    }

    /// Path of the file registry used when neither a store nor a storage is supplied.
    pub fn resolved_store_path(&self) -> PathBuf {
        self.store_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(".").join(DEFAULT_STORE_FILENAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_to_working_directory() {
        let options = NotificationOptions::from_lookup(lookup(&[("BOT_ID", "bot-1")]));
        assert_eq!(options.bot_app_id, "bot-1");
        assert_eq!(
            options.resolved_store_path(),
            PathBuf::from(".").join(".notification.localstore.json")
        );
    }

    #[test]
    fn store_location_follows_azure_settings() {
        let options = NotificationOptions::from_lookup(lookup(&[
            ("RUNNING_ON_AZURE", "1"),
            ("TEMP", "/tmp/bot"),
            ("NOTIFICATION_STORE_FILENAME", "registry.json"),
        ]));
        assert_eq!(
            options.resolved_store_path(),
            PathBuf::from("/tmp/bot/registry.json")
        );
    }
}

use std::future::Future;
use std::ops::BitOr;
use std::sync::Arc;

use tnb_core::{
    ConversationReference, NotificationTargetType, PagedData, SharedBotAdapter, TeamDetails,
    reference_key,
};
use tnb_store::{
    DefaultConversationReferenceStore, LocalFileStorage, SharedConversationReferenceStore,
};
use tracing::{debug, info, instrument, warn};

use crate::error::{NotificationError, Result};
use crate::middleware::NotificationMiddleware;
use crate::options::NotificationOptions;
use crate::target::{Channel, Member, NotificationTarget, TeamsBotInstallation};

/// Installation types a member search looks at. Flags combine with `|`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SearchScope(u8);

impl SearchScope {
    pub const PERSON: SearchScope = SearchScope(1);
    pub const GROUP: SearchScope = SearchScope(2);
    pub const CHANNEL: SearchScope = SearchScope(4);
    pub const ALL: SearchScope = SearchScope(7);

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn matches(self, target_type: Option<NotificationTargetType>) -> bool {
        let flag = match target_type {
            Some(NotificationTargetType::Person) => Self::PERSON,
            Some(NotificationTargetType::Group) => Self::GROUP,
            Some(NotificationTargetType::Channel) => Self::CHANNEL,
            None => return false,
        };
        self.0 & flag.0 != 0
    }
}

impl Default for SearchScope {
    fn default() -> Self {
        Self::ALL
    }
}

impl BitOr for SearchScope {
    type Output = SearchScope;

    fn bitor(self, rhs: Self) -> Self::Output {
        SearchScope(self.0 | rhs.0)
    }
}

/// Resolves the registry into live delivery targets.
///
/// Construction registers a [`NotificationMiddleware`] on the adapter so inbound turns keep
/// the registry current.
#[derive(Clone)]
pub struct NotificationBot {
    store: SharedConversationReferenceStore,
    adapter: SharedBotAdapter,
    bot_app_id: String,
    middleware: Arc<NotificationMiddleware>,
}

impl NotificationBot {
    pub fn new(adapter: SharedBotAdapter, options: NotificationOptions) -> Self {
        let store = match (options.store.clone(), options.storage.clone()) {
            (Some(store), _) => store,
            (None, Some(storage)) => {
                Arc::new(DefaultConversationReferenceStore::new(storage)) as _
            }
            (None, None) => {
                let path = options.resolved_store_path();
                debug!(path = %path.display(), "using file registry");
                Arc::new(DefaultConversationReferenceStore::new(Arc::new(
                    LocalFileStorage::new(path),
                ))) as _
            }
        };
        let middleware = Arc::new(NotificationMiddleware::new(Arc::clone(&store)));
        adapter.use_middleware(middleware.clone());
        Self {
            store,
            adapter,
            bot_app_id: options.bot_app_id,
            middleware,
        }
    }

    pub fn store(&self) -> &SharedConversationReferenceStore {
        &self.store
    }

    pub fn middleware(&self) -> &Arc<NotificationMiddleware> {
        &self.middleware
    }

    pub fn bot_app_id(&self) -> &str {
        &self.bot_app_id
    }

    /// Wraps a caller supplied reference without consulting the registry.
    pub fn build_teams_bot_installation(
        &self,
        reference: ConversationReference,
    ) -> Result<TeamsBotInstallation> {
        if reference.conversation.id.trim().is_empty() {
            return Err(NotificationError::MissingReference);
        }
        Ok(TeamsBotInstallation::new(
            self.adapter.clone(),
            reference,
            self.bot_app_id.clone(),
        ))
    }

    /// Probes the conversation for one member. Returns `false` only when the adapter reports
    /// that the bot has left the conversation roster.
    #[instrument(
        name = "notification.validate",
        skip_all,
        fields(conversation_id = %reference.conversation.id)
    )]
    pub async fn validate_installation(&self, reference: &ConversationReference) -> bool {
        let probe = async {
            let context = self
                .adapter
                .continue_conversation(&self.bot_app_id, reference)
                .await?;
            context.get_paged_members(Some(1), None).await
        };
        match probe.await {
            Ok(_) => true,
            Err(err) if err.is_stale() => false,
            Err(err) => {
                warn!(error = %err, "installation probe failed, keeping entry");
                metrics::counter!("notification_validation_transient").increment(1);
                true
            }
        }
    }

    /// One page of installations. With validation on, entries the bot was removed from are
    /// evicted from the registry and left out of the page.
    #[instrument(name = "notification.installations", skip(self))]
    pub async fn get_paged_installations(
        &self,
        page_size: Option<usize>,
        continuation_token: Option<&str>,
        validation_enabled: bool,
    ) -> Result<PagedData<TeamsBotInstallation>> {
        let page = self.store.list(page_size, continuation_token).await?;
        let mut targets = Vec::with_capacity(page.data.len());
        for reference in page.data {
            if validation_enabled && !self.validate_installation(&reference).await {
                let key = reference_key(&reference);
                info!(key = %key, "evicting stale installation");
                self.store.remove(&key, &reference).await?;
                metrics::counter!("notification_installation_evicted").increment(1);
                continue;
            }
            targets.push(TeamsBotInstallation::new(
                self.adapter.clone(),
                reference,
                self.bot_app_id.clone(),
            ));
        }
        Ok(PagedData::new(targets, page.continuation_token))
    }

    /// Every validated installation.
    #[deprecated(note = "use `get_paged_installations` instead")]
    pub async fn installations(&self) -> Result<Vec<TeamsBotInstallation>> {
        self.all_installations().await
    }

    async fn all_installations(&self) -> Result<Vec<TeamsBotInstallation>> {
        let mut targets = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = self
                .get_paged_installations(None, token.as_deref(), true)
                .await?;
            targets.extend(page.data);
            token = page.continuation_token;
            if token.is_none() {
                return Ok(targets);
            }
        }
    }

    /// First member, across installations in `scope`, accepted by `predicate`.
    pub async fn find_member<F, Fut>(
        &self,
        mut predicate: F,
        scope: Option<SearchScope>,
    ) -> Result<Option<Member>>
    where
        F: FnMut(&Member) -> Fut,
        Fut: Future<Output = bool>,
    {
        let scope = scope.unwrap_or_default();
        for target in self.all_installations().await? {
            if !scope.matches(target.target_type()) {
                continue;
            }
            for member in target.all_members().await? {
                if predicate(&member).await {
                    return Ok(Some(member));
                }
            }
        }
        Ok(None)
    }

    /// Every member, across installations in `scope`, accepted by `predicate`.
    pub async fn find_all_members<F, Fut>(
        &self,
        mut predicate: F,
        scope: Option<SearchScope>,
    ) -> Result<Vec<Member>>
    where
        F: FnMut(&Member) -> Fut,
        Fut: Future<Output = bool>,
    {
        let scope = scope.unwrap_or_default();
        let mut found = Vec::new();
        for target in self.all_installations().await? {
            if !scope.matches(target.target_type()) {
                continue;
            }
            for member in target.all_members().await? {
                if predicate(&member).await {
                    found.push(member);
                }
            }
        }
        Ok(found)
    }

    /// First team channel accepted by `predicate`. Team details are fetched once per team.
    pub async fn find_channel<F, Fut>(&self, mut predicate: F) -> Result<Option<Channel>>
    where
        F: FnMut(&Channel, Option<&TeamDetails>) -> Fut,
        Fut: Future<Output = bool>,
    {
        for target in self.all_installations().await? {
            if target.target_type() != Some(NotificationTargetType::Channel) {
                continue;
            }
            let details = target.get_team_details().await?;
            for channel in target.channels().await? {
                if predicate(&channel, details.as_ref()).await {
                    return Ok(Some(channel));
                }
            }
        }
        Ok(None)
    }

    /// Every team channel accepted by `predicate`.
    pub async fn find_all_channels<F, Fut>(&self, mut predicate: F) -> Result<Vec<Channel>>
    where
        F: FnMut(&Channel, Option<&TeamDetails>) -> Fut,
        Fut: Future<Output = bool>,
    {
        let mut found = Vec::new();
        for target in self.all_installations().await? {
            if target.target_type() != Some(NotificationTargetType::Channel) {
                continue;
            }
            let details = target.get_team_details().await?;
            for channel in target.channels().await? {
                if predicate(&channel, details.as_ref()).await {
                    found.push(channel);
                }
            }
        }
        Ok(found)
    }
}

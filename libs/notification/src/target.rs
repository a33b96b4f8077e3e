//! Delivery targets: a bot installation, one of its team channels, or one of its members.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tnb_core::{
    Activity, AdapterError, ChannelInfo, ConversationParameters, ConversationReference,
    NotificationTargetType, PagedData, SharedBotAdapter, TeamDetails, TeamsChannelAccount,
    TurnContext, installation_team_id,
};
use tracing::warn;

use crate::error::{NotificationError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// Recovers from a failed send.
///
/// When a handler is supplied the send resolves normally after the handler returns;
/// without one the adapter error is returned to the caller.
#[async_trait]
pub trait SendErrorHandler: Send + Sync {
    async fn handle(&self, context: &dyn TurnContext, error: AdapterError) -> anyhow::Result<()>;
}

#[async_trait]
impl<F> SendErrorHandler for F
where
    F: Fn(&dyn TurnContext, &AdapterError) + Send + Sync,
{
    async fn handle(&self, context: &dyn TurnContext, error: AdapterError) -> anyhow::Result<()> {
        self(context, &error);
        Ok(())
    }
}

/// Anything a notification can be pushed to.
#[async_trait]
pub trait NotificationTarget: Send + Sync {
    fn target_type(&self) -> Option<NotificationTargetType>;

    async fn send_message(
        &self,
        text: &str,
        on_error: Option<&dyn SendErrorHandler>,
    ) -> Result<MessageResponse>;

    async fn send_adaptive_card(
        &self,
        card: Value,
        on_error: Option<&dyn SendErrorHandler>,
    ) -> Result<MessageResponse>;
}

/// Sends plain text to `target`.
pub async fn send_message(
    target: &dyn NotificationTarget,
    text: &str,
    on_error: Option<&dyn SendErrorHandler>,
) -> Result<MessageResponse> {
    target.send_message(text, on_error).await
}

/// Sends an adaptive card to `target`.
pub async fn send_adaptive_card(
    target: &dyn NotificationTarget,
    card: Value,
    on_error: Option<&dyn SendErrorHandler>,
) -> Result<MessageResponse> {
    target.send_adaptive_card(card, on_error).await
}

fn text_activity(text: &str) -> Result<Activity> {
    if text.is_empty() {
        return Err(NotificationError::EmptyMessage);
    }
    Ok(Activity::message(text))
}

fn card_activity(card: Value) -> Result<Activity> {
    let empty = match &card {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    };
    if empty {
        return Err(NotificationError::EmptyCard);
    }
    Ok(Activity::adaptive_card(card))
}

async fn deliver(
    context: &dyn TurnContext,
    activity: Activity,
    on_error: Option<&dyn SendErrorHandler>,
) -> Result<MessageResponse> {
    match context.send_activity(activity).await {
        Ok(response) => Ok(MessageResponse { id: response.id }),
        Err(error) => {
            metrics::counter!("notification_send_failed").increment(1);
            let Some(handler) = on_error else {
                return Err(error.into());
            };
            warn!(
                conversation_id = context.activity().conversation_id().unwrap_or_default(),
                error = %error,
                "send failed, delegating to error handler"
            );
            handler
                .handle(context, error)
                .await
                .map_err(NotificationError::ErrorHandler)?;
            Ok(MessageResponse::default())
        }
    }
}

/// A conversation the bot is installed in: a personal chat, a group chat, or a team (whose
/// General channel receives the messages).
#[derive(Clone)]
pub struct TeamsBotInstallation {
    adapter: SharedBotAdapter,
    conversation_reference: ConversationReference,
    bot_app_id: String,
    target_type: Option<NotificationTargetType>,
}

impl std::fmt::Debug for TeamsBotInstallation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TeamsBotInstallation")
            .field("conversation_reference", &self.conversation_reference)
            .field("bot_app_id", &self.bot_app_id)
            .field("target_type", &self.target_type)
            .finish()
    }
}

impl TeamsBotInstallation {
    pub fn new(
        adapter: SharedBotAdapter,
        conversation_reference: ConversationReference,
        bot_app_id: impl Into<String>,
    ) -> Self {
        let target_type = NotificationTargetType::of(&conversation_reference);
        Self {
            adapter,
            conversation_reference,
            bot_app_id: bot_app_id.into(),
            target_type,
        }
    }

    pub fn adapter(&self) -> &SharedBotAdapter {
        &self.adapter
    }

    pub fn conversation_reference(&self) -> &ConversationReference {
        &self.conversation_reference
    }

    pub fn bot_app_id(&self) -> &str {
        &self.bot_app_id
    }

    async fn enter(&self) -> Result<Box<dyn TurnContext>> {
        Ok(self
            .adapter
            .continue_conversation(&self.bot_app_id, &self.conversation_reference)
            .await?)
    }

    async fn enter_reference(
        &self,
        reference: &ConversationReference,
    ) -> Result<Box<dyn TurnContext>> {
        Ok(self
            .adapter
            .continue_conversation(&self.bot_app_id, reference)
            .await?)
    }

    /// Team channels of this installation. Empty unless the bot is installed into a team.
    pub async fn channels(&self) -> Result<Vec<Channel>> {
        if self.target_type != Some(NotificationTargetType::Channel) {
            return Ok(Vec::new());
        }
        let context = self.enter().await?;
        let Some(team_id) = installation_team_id(context.activity()) else {
            return Ok(Vec::new());
        };
        let channels = context.get_team_channels(&team_id).await?;
        Ok(channels
            .into_iter()
            .map(|info| Channel::new(self.clone(), info))
            .collect())
    }

    /// One page of the members of this installation.
    pub async fn get_paged_members(
        &self,
        page_size: Option<u32>,
        continuation_token: Option<&str>,
    ) -> Result<PagedData<Member>> {
        let context = self.enter().await?;
        let page = context
            .get_paged_members(page_size, continuation_token)
            .await?;
        Ok(PagedData::new(
            page.members
                .into_iter()
                .map(|account| Member::new(self.clone(), account))
                .collect(),
            page.continuation_token,
        ))
    }

    /// Every member of this installation.
    #[deprecated(note = "use `get_paged_members` instead")]
    pub async fn members(&self) -> Result<Vec<Member>> {
        self.all_members().await
    }

    pub(crate) async fn all_members(&self) -> Result<Vec<Member>> {
        let mut members = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = self.get_paged_members(None, token.as_deref()).await?;
            members.extend(page.data);
            token = page.continuation_token;
            if token.is_none() {
                return Ok(members);
            }
        }
    }

    /// Details of the team this installation belongs to, if it is a team installation.
    pub async fn get_team_details(&self) -> Result<Option<TeamDetails>> {
        if self.target_type != Some(NotificationTargetType::Channel) {
            return Ok(None);
        }
        let context = self.enter().await?;
        let Some(team_id) = installation_team_id(context.activity()) else {
            return Ok(None);
        };
        Ok(Some(context.get_team_details(&team_id).await?))
    }
}

#[async_trait]
impl NotificationTarget for TeamsBotInstallation {
    fn target_type(&self) -> Option<NotificationTargetType> {
        self.target_type
    }

    async fn send_message(
        &self,
        text: &str,
        on_error: Option<&dyn SendErrorHandler>,
    ) -> Result<MessageResponse> {
        let activity = text_activity(text)?;
        let context = self.enter().await?;
        deliver(context.as_ref(), activity, on_error).await
    }

    async fn send_adaptive_card(
        &self,
        card: Value,
        on_error: Option<&dyn SendErrorHandler>,
    ) -> Result<MessageResponse> {
        let activity = card_activity(card)?;
        let context = self.enter().await?;
        deliver(context.as_ref(), activity, on_error).await
    }
}

/// A channel of a team the bot is installed in.
#[derive(Debug, Clone)]
pub struct Channel {
    parent: TeamsBotInstallation,
    info: ChannelInfo,
}

impl Channel {
    pub fn new(parent: TeamsBotInstallation, info: ChannelInfo) -> Self {
        Self { parent, info }
    }

    pub fn parent(&self) -> &TeamsBotInstallation {
        &self.parent
    }

    pub fn info(&self) -> &ChannelInfo {
        &self.info
    }

    /// Enters the parent conversation, then the conversation of this channel.
    async fn enter(&self) -> Result<Box<dyn TurnContext>> {
        let context = self.parent.enter().await?;
        let reference = ConversationReference::from_activity(context.activity())
            .with_conversation_id(self.info.id.clone().unwrap_or_default());
        self.parent.enter_reference(&reference).await
    }
}

#[async_trait]
impl NotificationTarget for Channel {
    fn target_type(&self) -> Option<NotificationTargetType> {
        Some(NotificationTargetType::Channel)
    }

    async fn send_message(
        &self,
        text: &str,
        on_error: Option<&dyn SendErrorHandler>,
    ) -> Result<MessageResponse> {
        let activity = text_activity(text)?;
        let context = self.enter().await?;
        deliver(context.as_ref(), activity, on_error).await
    }

    async fn send_adaptive_card(
        &self,
        card: Value,
        on_error: Option<&dyn SendErrorHandler>,
    ) -> Result<MessageResponse> {
        let activity = card_activity(card)?;
        let context = self.enter().await?;
        deliver(context.as_ref(), activity, on_error).await
    }
}

/// A member of a bot installation, reached through a 1:1 chat.
#[derive(Debug, Clone)]
pub struct Member {
    parent: TeamsBotInstallation,
    account: TeamsChannelAccount,
}

impl Member {
    pub fn new(parent: TeamsBotInstallation, account: TeamsChannelAccount) -> Self {
        Self { parent, account }
    }

    pub fn parent(&self) -> &TeamsBotInstallation {
        &self.parent
    }

    pub fn account(&self) -> &TeamsChannelAccount {
        &self.account
    }

    /// Enters the parent conversation, opens a personal chat with the member, and enters it.
    async fn enter(&self) -> Result<Box<dyn TurnContext>> {
        let context = self.parent.enter().await?;
        let activity = context.activity();
        let parameters = ConversationParameters {
            is_group: false,
            bot: activity.recipient.clone(),
            members: vec![(&self.account).into()],
            tenant_id: activity
                .conversation
                .as_ref()
                .and_then(|c| c.tenant_id.clone()),
            channel_data: Value::Object(Default::default()),
        };
        let created = context.create_conversation(parameters).await?;
        let reference =
            ConversationReference::from_activity(activity).with_conversation_id(created.id);
        self.parent.enter_reference(&reference).await
    }
}

#[async_trait]
impl NotificationTarget for Member {
    fn target_type(&self) -> Option<NotificationTargetType> {
        Some(NotificationTargetType::Person)
    }

    async fn send_message(
        &self,
        text: &str,
        on_error: Option<&dyn SendErrorHandler>,
    ) -> Result<MessageResponse> {
        let activity = text_activity(text)?;
        let context = self.enter().await?;
        deliver(context.as_ref(), activity, on_error).await
    }

    async fn send_adaptive_card(
        &self,
        card: Value,
        on_error: Option<&dyn SendErrorHandler>,
    ) -> Result<MessageResponse> {
        let activity = card_activity(card)?;
        let context = self.enter().await?;
        deliver(context.as_ref(), activity, on_error).await
    }
}

use std::sync::Arc;

use async_trait::async_trait;

use crate::activity::{Activity, ConversationReference};
use crate::middleware::Middleware;
use crate::teams::{
    ChannelInfo, ConversationParameters, ConversationResourceResponse, PagedMembers,
    ResourceResponse, TeamDetails,
};

/// Error code the Teams connector returns when the bot was removed from a conversation.
pub const BOT_NOT_IN_CONVERSATION_ROSTER: &str = "BotNotInConversationRoster";

/// Failure reported by the hosting adapter.
///
/// `NotInConversationRoster` is the only variant treated as proof that an installation is
/// gone. Everything else is considered transient by the notification layer.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("bot is not in the conversation roster")]
    NotInConversationRoster,
    #[error("{code}: {message}")]
    Remote {
        code: String,
        message: String,
        status: Option<u16>,
    },
    #[error("adapter transport error: {0}")]
    Transport(#[source] anyhow::Error),
}

impl AdapterError {
    /// Translates a connector error code into an adapter error.
    pub fn from_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        let code = code.into();
        if code == BOT_NOT_IN_CONVERSATION_ROSTER {
            return AdapterError::NotInConversationRoster;
        }
        AdapterError::Remote {
            code,
            message: message.into(),
            status: None,
        }
    }

    pub fn transport(err: impl Into<anyhow::Error>) -> Self {
        AdapterError::Transport(err.into())
    }

    pub fn with_status(self, status: u16) -> Self {
        match self {
            AdapterError::Remote { code, message, .. } => AdapterError::Remote {
                code,
                message,
                status: Some(status),
            },
            other => other,
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            AdapterError::NotInConversationRoster => Some(BOT_NOT_IN_CONVERSATION_ROSTER),
            AdapterError::Remote { code, .. } => Some(code),
            AdapterError::Transport(_) => None,
        }
    }

    /// Returns `true` when the error proves the bot is no longer part of the conversation.
    pub fn is_stale(&self) -> bool {
        matches!(self, AdapterError::NotInConversationRoster)
    }
}

/// Turn-scoped capabilities of the hosting adapter.
///
/// A context is bound to one conversation: inbound turns get it from the host pipeline,
/// proactive turns get it from [`BotAdapter::continue_conversation`].
#[async_trait]
pub trait TurnContext: Send + Sync {
    fn activity(&self) -> &Activity;

    async fn send_activity(&self, activity: Activity) -> Result<ResourceResponse, AdapterError>;

    async fn get_paged_members(
        &self,
        page_size: Option<u32>,
        continuation_token: Option<&str>,
    ) -> Result<PagedMembers, AdapterError>;

    async fn get_team_channels(&self, team_id: &str) -> Result<Vec<ChannelInfo>, AdapterError>;

    async fn get_team_details(&self, team_id: &str) -> Result<TeamDetails, AdapterError>;

    async fn create_conversation(
        &self,
        parameters: ConversationParameters,
    ) -> Result<ConversationResourceResponse, AdapterError>;
}

/// The hosting bot adapter.
#[async_trait]
pub trait BotAdapter: Send + Sync {
    /// Re-enters a stored conversation and returns a proactive turn context for it.
    async fn continue_conversation(
        &self,
        bot_app_id: &str,
        reference: &ConversationReference,
    ) -> Result<Box<dyn TurnContext>, AdapterError>;

    /// Registers a middleware that runs ahead of the bot logic on every inbound turn.
    fn use_middleware(&self, middleware: Arc<dyn Middleware>);
}

pub type SharedBotAdapter = Arc<dyn BotAdapter>;

//! Registry helpers derived from a stored conversation reference.
use serde::{Deserialize, Serialize};

use crate::activity::ConversationReference;

pub const PERSONAL_CONVERSATION: &str = "personal";
pub const GROUP_CHAT_CONVERSATION: &str = "groupChat";
pub const CHANNEL_CONVERSATION: &str = "channel";

/// Registry key of a reference: `_{tenantId}_{conversationId}`.
///
/// Two references for the same tenant and conversation share a key and therefore a single
/// registry entry.
pub fn reference_key(reference: &ConversationReference) -> String {
    format!(
        "_{}_{}",
        reference.tenant_id().unwrap_or_default(),
        reference.conversation.id
    )
}

/// Where a bot installation lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationTargetType {
    /// Installed into a team; messages land in its General channel.
    Channel,
    Group,
    Person,
}

impl NotificationTargetType {
    /// Maps `conversation.conversationType` to a target type.
    pub fn of(reference: &ConversationReference) -> Option<Self> {
        match reference.conversation.conversation_type.as_deref() {
            Some(CHANNEL_CONVERSATION) => Some(NotificationTargetType::Channel),
            Some(GROUP_CHAT_CONVERSATION) => Some(NotificationTargetType::Group),
            Some(PERSONAL_CONVERSATION) => Some(NotificationTargetType::Person),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationTargetType::Channel => "Channel",
            NotificationTargetType::Group => "Group",
            NotificationTargetType::Person => "Person",
        }
    }
}

impl std::fmt::Display for NotificationTargetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

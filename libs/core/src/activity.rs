use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

pub const MESSAGE_ACTIVITY: &str = "message";
pub const INSTALLATION_UPDATE_ACTIVITY: &str = "installationUpdate";
pub const CONVERSATION_UPDATE_ACTIVITY: &str = "conversationUpdate";
pub const EVENT_ACTIVITY: &str = "event";
pub const CONTINUE_CONVERSATION_EVENT: &str = "ContinueConversation";
pub const ADAPTIVE_CARD_CONTENT_TYPE: &str = "application/vnd.microsoft.card.adaptive";

/// Bot Framework activity as delivered to, or sent from, the bot.
///
/// Only the fields the notification layer reads are typed; everything else is kept in
/// `extra` so activities survive a round trip untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(default)]
    pub r#type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<OffsetDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<ChannelAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<ChannelAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation: Option<ConversationAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Activity {
    /// Creates an activity of the given type with every other field empty.
    pub fn new(r#type: impl Into<String>) -> Self {
        Self {
            r#type: r#type.into(),
            ..Self::default()
        }
    }

    /// Plain text message activity.
    pub fn message(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::new(MESSAGE_ACTIVITY)
        }
    }

    /// Message activity carrying a single adaptive card attachment.
    pub fn adaptive_card(card: Value) -> Self {
        Self {
            attachments: vec![Attachment::adaptive_card(card)],
            ..Self::new(MESSAGE_ACTIVITY)
        }
    }

    pub fn is_type(&self, r#type: &str) -> bool {
        self.r#type.eq_ignore_ascii_case(r#type)
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation.as_ref().map(|c| c.id.as_str())
    }
}

/// Account of a user or bot on a channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChannelAccount {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aad_object_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChannelAccount {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }
}

/// Conversation an activity belongs to.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationAccount {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_group: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ConversationAccount {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_type(mut self, conversation_type: impl Into<String>) -> Self {
        self.conversation_type = Some(conversation_type.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub content_type: String,
    #[serde(default)]
    pub content: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Attachment {
    pub fn adaptive_card(card: Value) -> Self {
        Self {
            content_type: ADAPTIVE_CARD_CONTENT_TYPE.to_string(),
            content: card,
            name: None,
        }
    }
}

/// Addressing record used to re-open a conversation outside of the turn that produced it.
///
/// Stored references are treated as opaque: unknown fields are preserved in `extra` so a
/// record written by a newer bot version reads back without loss.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<ChannelAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot: Option<ChannelAccount>,
    #[serde(default)]
    pub conversation: ConversationAccount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ConversationReference {
    /// Captures the reference of an inbound activity.
    pub fn from_activity(activity: &Activity) -> Self {
        Self {
            activity_id: activity.id.clone(),
            user: activity.from.clone(),
            bot: activity.recipient.clone(),
            conversation: activity.conversation.clone().unwrap_or_default(),
            channel_id: activity.channel_id.clone(),
            locale: activity.locale.clone(),
            service_url: activity.service_url.clone(),
            extra: Map::new(),
        }
    }

    /// Builds the synthetic event activity a proactive turn starts from.
    pub fn continuation_activity(&self) -> Activity {
        Activity {
            id: self.activity_id.clone(),
            name: Some(CONTINUE_CONVERSATION_EVENT.to_string()),
            channel_id: self.channel_id.clone(),
            service_url: self.service_url.clone(),
            locale: self.locale.clone(),
            from: self.user.clone(),
            recipient: self.bot.clone(),
            conversation: Some(self.conversation.clone()),
            ..Activity::new(EVENT_ACTIVITY)
        }
    }

    /// Returns a copy addressed to another conversation id in the same tenant.
    pub fn with_conversation_id(&self, conversation_id: impl Into<String>) -> Self {
        let mut reference = self.clone();
        reference.conversation.id = conversation_id.into();
        reference
    }

    pub fn tenant_id(&self) -> Option<&str> {
        self.conversation.tenant_id.as_deref()
    }
}

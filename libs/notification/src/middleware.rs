//! Keeps the reference registry in step with installation lifecycle events.
use async_trait::async_trait;
use tnb_core::{
    Activity, CHANNEL_CONVERSATION, CONVERSATION_UPDATE_ACTIVITY, ConversationReference,
    GROUP_CHAT_CONVERSATION, INSTALLATION_UPDATE_ACTIVITY, MESSAGE_ACTIVITY, Middleware, Next,
    PERSONAL_CONVERSATION, TeamsChannelData, TurnContext, reference_key,
};
use tnb_store::{AddOptions, SharedConversationReferenceStore};
use tracing::{debug, instrument};

use crate::error::Result;

const TEAM_DELETED_EVENT: &str = "teamDeleted";
const TEAM_RESTORED_EVENT: &str = "teamRestored";

/// Where an inbound message was posted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOrigin {
    /// A personal or group chat.
    Chat,
    /// The General channel of a team. Registered under the team id.
    GeneralChannel { team_id: String },
    /// Any channel other than General, or a channel message without team data.
    OtherChannel,
    UnknownScope,
}

/// What an inbound activity means for the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnSignal {
    BotInstalled,
    TeamRestored,
    BotMessaged(MessageOrigin),
    BotUninstalled,
    TeamDeleted,
    Unknown,
}

impl TurnSignal {
    pub fn classify(activity: &Activity) -> Self {
        if activity.is_type(INSTALLATION_UPDATE_ACTIVITY) {
            let action = activity.action.as_deref().unwrap_or_default().to_lowercase();
            return match action.as_str() {
                "add" | "add-upgrade" => TurnSignal::BotInstalled,
                _ => TurnSignal::BotUninstalled,
            };
        }

        if activity.is_type(CONVERSATION_UPDATE_ACTIVITY) {
            return match TeamsChannelData::of(activity).event_type.as_deref() {
                Some(TEAM_DELETED_EVENT) => TurnSignal::TeamDeleted,
                Some(TEAM_RESTORED_EVENT) => TurnSignal::TeamRestored,
                _ => TurnSignal::Unknown,
            };
        }

        if activity.is_type(MESSAGE_ACTIVITY) {
            let conversation_type = activity
                .conversation
                .as_ref()
                .and_then(|conversation| conversation.conversation_type.as_deref());
            let origin = match conversation_type {
                Some(PERSONAL_CONVERSATION) | Some(GROUP_CHAT_CONVERSATION) => MessageOrigin::Chat,
                Some(CHANNEL_CONVERSATION) => {
                    let data = TeamsChannelData::of(activity);
                    match (data.team_id(), data.channel_id()) {
                        (Some(team), None) => MessageOrigin::GeneralChannel {
                            team_id: team.to_string(),
                        },
                        (Some(team), Some(channel)) if team == channel => {
                            MessageOrigin::GeneralChannel {
                                team_id: team.to_string(),
                            }
                        }
                        _ => MessageOrigin::OtherChannel,
                    }
                }
                _ => MessageOrigin::UnknownScope,
            };
            return TurnSignal::BotMessaged(origin);
        }

        TurnSignal::Unknown
    }
}

/// Middleware that records where the bot is installed.
///
/// Installs and team restores overwrite the stored reference. A message only registers a
/// conversation that has not been seen yet, so the reference captured at install time wins.
#[derive(Clone)]
pub struct NotificationMiddleware {
    store: SharedConversationReferenceStore,
}

impl NotificationMiddleware {
    pub fn new(store: SharedConversationReferenceStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &SharedConversationReferenceStore {
        &self.store
    }

    /// Applies one inbound activity to the registry and returns how it was classified.
    #[instrument(
        name = "notification.track",
        skip_all,
        fields(activity_type = %activity.r#type)
    )]
    pub async fn track(&self, activity: &Activity) -> Result<TurnSignal> {
        let signal = TurnSignal::classify(activity);
        let reference = ConversationReference::from_activity(activity);
        match &signal {
            TurnSignal::BotInstalled | TurnSignal::TeamRestored => {
                self.store
                    .add(&reference_key(&reference), reference, AddOptions::overwrite())
                    .await?;
            }
            TurnSignal::BotMessaged(MessageOrigin::Chat) => {
                self.store
                    .add(
                        &reference_key(&reference),
                        reference,
                        AddOptions::keep_existing(),
                    )
                    .await?;
            }
            TurnSignal::BotMessaged(MessageOrigin::GeneralChannel { team_id }) => {
                let reference = reference.with_conversation_id(team_id.clone());
                self.store
                    .add(
                        &reference_key(&reference),
                        reference,
                        AddOptions::keep_existing(),
                    )
                    .await?;
            }
            TurnSignal::BotUninstalled | TurnSignal::TeamDeleted => {
                self.store
                    .remove(&reference_key(&reference), &reference)
                    .await?;
            }
            TurnSignal::BotMessaged(_) | TurnSignal::Unknown => {
                debug!(?signal, "activity ignored by registry");
            }
        }
        Ok(signal)
    }
}

#[async_trait]
impl Middleware for NotificationMiddleware {
    async fn on_turn(&self, context: &dyn TurnContext, next: Next<'_>) -> anyhow::Result<()> {
        self.track(context.activity()).await?;
        next.run().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tnb_core::ConversationAccount;

    fn message(conversation_type: &str, channel_data: serde_json::Value) -> Activity {
        let mut activity = Activity::message("hi");
        activity.conversation =
            Some(ConversationAccount::new("19:x").with_type(conversation_type));
        activity.channel_data = Some(channel_data);
        activity
    }

    #[test]
    fn installation_actions_are_case_insensitive() {
        let mut activity = Activity::new("installationUpdate");
        activity.action = Some("Add-Upgrade".into());
        assert_eq!(TurnSignal::classify(&activity), TurnSignal::BotInstalled);
        activity.action = Some("remove".into());
        assert_eq!(TurnSignal::classify(&activity), TurnSignal::BotUninstalled);
        activity.action = None;
        assert_eq!(TurnSignal::classify(&activity), TurnSignal::BotUninstalled);
    }

    #[test]
    fn team_events_are_recognised() {
        let mut activity = Activity::new("conversationUpdate");
        activity.channel_data = Some(json!({ "eventType": "teamDeleted" }));
        assert_eq!(TurnSignal::classify(&activity), TurnSignal::TeamDeleted);
        activity.channel_data = Some(json!({ "eventType": "teamRestored" }));
        assert_eq!(TurnSignal::classify(&activity), TurnSignal::TeamRestored);
        activity.channel_data = Some(json!({ "eventType": "channelCreated" }));
        assert_eq!(TurnSignal::classify(&activity), TurnSignal::Unknown);
    }

    #[test]
    fn channel_messages_resolve_general_channel() {
        let general = message("channel", json!({ "team": { "id": "t1" } }));
        assert_eq!(
            TurnSignal::classify(&general),
            TurnSignal::BotMessaged(MessageOrigin::GeneralChannel {
                team_id: "t1".into()
            })
        );
        let same = message(
            "channel",
            json!({ "team": { "id": "t1" }, "channel": { "id": "t1" } }),
        );
        assert!(matches!(
            TurnSignal::classify(&same),
            TurnSignal::BotMessaged(MessageOrigin::GeneralChannel { .. })
        ));
        let other = message(
            "channel",
            json!({ "team": { "id": "t1" }, "channel": { "id": "c2" } }),
        );
        assert_eq!(
            TurnSignal::classify(&other),
            TurnSignal::BotMessaged(MessageOrigin::OtherChannel)
        );
        let teamless = message("channel", json!({}));
        assert_eq!(
            TurnSignal::classify(&teamless),
            TurnSignal::BotMessaged(MessageOrigin::OtherChannel)
        );
    }

    #[test]
    fn chat_messages_and_unknown_types() {
        assert_eq!(
            TurnSignal::classify(&message("groupChat", json!({}))),
            TurnSignal::BotMessaged(MessageOrigin::Chat)
        );
        assert_eq!(
            TurnSignal::classify(&message("meeting", json!({}))),
            TurnSignal::BotMessaged(MessageOrigin::UnknownScope)
        );
        assert_eq!(
            TurnSignal::classify(&Activity::new("typing")),
            TurnSignal::Unknown
        );
    }
}

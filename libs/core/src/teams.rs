//! Teams-specific payloads: channel data, rosters, team details.
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::activity::{Activity, ChannelAccount};

/// Teams channel of a team. The General channel shares its id with the team.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChannelInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChannelInfo {
    pub fn new(id: impl Into<String>, name: Option<&str>) -> Self {
        Self {
            id: Some(id.into()),
            name: name.map(str::to_string),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TeamInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aad_group_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TeamDetails {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aad_group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_count: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Roster entry returned by the Teams member APIs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TeamsChannelAccount {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_principal_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aad_object_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TeamsChannelAccount {
    pub fn new(id: impl Into<String>, name: Option<&str>) -> Self {
        Self {
            id: id.into(),
            name: name.map(str::to_string),
            ..Self::default()
        }
    }
}

impl From<&TeamsChannelAccount> for ChannelAccount {
    fn from(account: &TeamsChannelAccount) -> Self {
        ChannelAccount {
            id: account.id.clone(),
            name: account.name.clone(),
            aad_object_id: account.aad_object_id.clone(),
            role: None,
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PagedMembers {
    #[serde(default)]
    pub members: Vec<TeamsChannelAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuation_token: Option<String>,
}

/// Parameters for opening a new conversation, typically a 1:1 chat with a member.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationParameters {
    #[serde(default)]
    pub is_group: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot: Option<ChannelAccount>,
    #[serde(default)]
    pub members: Vec<ChannelAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub channel_data: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationResourceResponse {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// The subset of Teams `channelData` the notification layer inspects.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TeamsChannelData {
    #[serde(default)]
    pub team: Option<TeamInfo>,
    #[serde(default)]
    pub channel: Option<ChannelInfo>,
    #[serde(default)]
    pub event_type: Option<String>,
}

impl TeamsChannelData {
    /// Reads the Teams channel data of an activity. Missing or malformed data reads as empty.
    pub fn of(activity: &Activity) -> Self {
        activity
            .channel_data
            .as_ref()
            .and_then(|value| serde_json::from_value(value.clone()).ok())
            .unwrap_or_default()
    }

    pub fn team_id(&self) -> Option<&str> {
        self.team
            .as_ref()
            .and_then(|team| team.id.as_deref())
            .filter(|id| !id.is_empty())
    }

    pub fn channel_id(&self) -> Option<&str> {
        self.channel
            .as_ref()
            .and_then(|channel| channel.id.as_deref())
            .filter(|id| !id.is_empty())
    }
}

/// Resolves the team a channel installation belongs to.
///
/// Uses `channelData.team.id` when present. A conversation without a name is the team's
/// General channel, whose id equals the team id.
pub fn installation_team_id(activity: &Activity) -> Option<String> {
    if let Some(team_id) = TeamsChannelData::of(activity).team_id() {
        return Some(team_id.to_string());
    }
    activity
        .conversation
        .as_ref()
        .filter(|conversation| conversation.name.is_none() && !conversation.id.is_empty())
        .map(|conversation| conversation.id.clone())
}

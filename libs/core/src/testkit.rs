//! In-memory adapter for exercising the notification layer without a Bot Framework host.
//!
//! Rosters, channels, and team details are scripted per conversation/team id, failures can
//! be injected per conversation id, and every continued conversation and sent activity is
//! recorded for assertions.
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::activity::{Activity, ConversationReference};
use crate::adapter::{AdapterError, BOT_NOT_IN_CONVERSATION_ROSTER, BotAdapter, TurnContext};
use crate::middleware::Middleware;
use crate::teams::{
    ChannelInfo, ConversationParameters, ConversationResourceResponse, PagedMembers,
    ResourceResponse, TeamDetails, TeamsChannelAccount,
};

/// Failure injected into a mocked call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedFailure {
    NotInRoster,
    Remote { code: String, message: String },
    Transport(String),
}

impl ScriptedFailure {
    pub fn remote(code: &str, message: &str) -> Self {
        ScriptedFailure::Remote {
            code: code.to_string(),
            message: message.to_string(),
        }
    }

    pub fn to_error(&self) -> AdapterError {
        match self {
            ScriptedFailure::NotInRoster => {
                AdapterError::from_code(BOT_NOT_IN_CONVERSATION_ROSTER, "bot removed")
            }
            ScriptedFailure::Remote { code, message } => {
                AdapterError::from_code(code.clone(), message.clone())
            }
            ScriptedFailure::Transport(message) => {
                AdapterError::transport(anyhow::anyhow!(message.clone()))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentActivity {
    pub bot_app_id: String,
    pub conversation_id: String,
    pub activity: Activity,
}

#[derive(Default)]
struct MockState {
    members: HashMap<String, Vec<TeamsChannelAccount>>,
    channels: HashMap<String, Vec<ChannelInfo>>,
    team_details: HashMap<String, TeamDetails>,
    member_failures: HashMap<String, ScriptedFailure>,
    send_failures: HashMap<String, ScriptedFailure>,
    continue_failures: HashMap<String, ScriptedFailure>,
    continued: Vec<(String, ConversationReference)>,
    sent: Vec<SentActivity>,
    created: Vec<ConversationParameters>,
    member_calls: Vec<(String, Option<u32>)>,
    middlewares: Vec<Arc<dyn Middleware>>,
    next_activity: u64,
}

#[derive(Clone, Default)]
pub struct MockAdapter {
    state: Arc<Mutex<MockState>>,
}

impl MockAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().expect("mock adapter lock poisoned")
    }

    pub fn with_members(self, conversation_id: &str, members: Vec<TeamsChannelAccount>) -> Self {
        self.state()
            .members
            .insert(conversation_id.to_string(), members);
        self
    }

    pub fn with_channels(self, team_id: &str, channels: Vec<ChannelInfo>) -> Self {
        self.state().channels.insert(team_id.to_string(), channels);
        self
    }

    pub fn with_team_details(self, team_id: &str, details: TeamDetails) -> Self {
        self.state()
            .team_details
            .insert(team_id.to_string(), details);
        self
    }

    pub fn fail_members(&self, conversation_id: &str, failure: ScriptedFailure) {
        self.state()
            .member_failures
            .insert(conversation_id.to_string(), failure);
    }

    pub fn fail_sends(&self, conversation_id: &str, failure: ScriptedFailure) {
        self.state()
            .send_failures
            .insert(conversation_id.to_string(), failure);
    }

    pub fn fail_continue(&self, conversation_id: &str, failure: ScriptedFailure) {
        self.state()
            .continue_failures
            .insert(conversation_id.to_string(), failure);
    }

    pub fn continued(&self) -> Vec<(String, ConversationReference)> {
        self.state().continued.clone()
    }

    pub fn sent(&self) -> Vec<SentActivity> {
        self.state().sent.clone()
    }

    pub fn created_conversations(&self) -> Vec<ConversationParameters> {
        self.state().created.clone()
    }

    /// `(conversation id, page size)` of every member lookup, probes included.
    pub fn member_calls(&self) -> Vec<(String, Option<u32>)> {
        self.state().member_calls.clone()
    }

    pub fn middleware_count(&self) -> usize {
        self.state().middlewares.len()
    }

    /// Context for an inbound turn, as the host pipeline would build it.
    pub fn turn_context(&self, activity: Activity) -> MockTurnContext {
        MockTurnContext {
            adapter: self.clone(),
            bot_app_id: String::new(),
            activity,
        }
    }
}

#[async_trait]
impl BotAdapter for MockAdapter {
    async fn continue_conversation(
        &self,
        bot_app_id: &str,
        reference: &ConversationReference,
    ) -> Result<Box<dyn TurnContext>, AdapterError> {
        let mut state = self.state();
        if let Some(failure) = state.continue_failures.get(&reference.conversation.id) {
            return Err(failure.to_error());
        }
        state
            .continued
            .push((bot_app_id.to_string(), reference.clone()));
        Ok(Box::new(MockTurnContext {
            adapter: self.clone(),
            bot_app_id: bot_app_id.to_string(),
            activity: reference.continuation_activity(),
        }))
    }

    fn use_middleware(&self, middleware: Arc<dyn Middleware>) {
        self.state().middlewares.push(middleware);
    }
}

pub struct MockTurnContext {
    adapter: MockAdapter,
    bot_app_id: String,
    activity: Activity,
}

impl MockTurnContext {
    fn conversation_id(&self) -> String {
        self.activity
            .conversation_id()
            .unwrap_or_default()
            .to_string()
    }
}

#[async_trait]
impl TurnContext for MockTurnContext {
    fn activity(&self) -> &Activity {
        &self.activity
    }

    async fn send_activity(&self, activity: Activity) -> Result<ResourceResponse, AdapterError> {
        let conversation_id = self.conversation_id();
        let mut state = self.adapter.state();
        if let Some(failure) = state.send_failures.get(&conversation_id) {
            return Err(failure.to_error());
        }
        state.next_activity += 1;
        let id = format!("activity-{}", state.next_activity);
        state.sent.push(SentActivity {
            bot_app_id: self.bot_app_id.clone(),
            conversation_id,
            activity,
        });
        Ok(ResourceResponse { id: Some(id) })
    }

    async fn get_paged_members(
        &self,
        page_size: Option<u32>,
        continuation_token: Option<&str>,
    ) -> Result<PagedMembers, AdapterError> {
        let conversation_id = self.conversation_id();
        let mut state = self.adapter.state();
        state
            .member_calls
            .push((conversation_id.clone(), page_size));
        if let Some(failure) = state.member_failures.get(&conversation_id) {
            return Err(failure.to_error());
        }
        let members = state
            .members
            .get(&conversation_id)
            .cloned()
            .unwrap_or_default();
        let start = continuation_token
            .and_then(|token| token.parse::<usize>().ok())
            .unwrap_or(0)
            .min(members.len());
        let size = page_size.map(|size| size.max(1) as usize).unwrap_or(members.len().max(1));
        let end = start.saturating_add(size).min(members.len());
        Ok(PagedMembers {
            members: members[start..end].to_vec(),
            continuation_token: (end < members.len()).then(|| end.to_string()),
        })
    }

    async fn get_team_channels(&self, team_id: &str) -> Result<Vec<ChannelInfo>, AdapterError> {
        Ok(self
            .adapter
            .state()
            .channels
            .get(team_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_team_details(&self, team_id: &str) -> Result<TeamDetails, AdapterError> {
        self.adapter
            .state()
            .team_details
            .get(team_id)
            .cloned()
            .ok_or_else(|| AdapterError::from_code("TeamNotFound", team_id.to_string()))
    }

    async fn create_conversation(
        &self,
        parameters: ConversationParameters,
    ) -> Result<ConversationResourceResponse, AdapterError> {
        let member = parameters
            .members
            .first()
            .map(|member| member.id.clone())
            .unwrap_or_default();
        self.adapter.state().created.push(parameters);
        Ok(ConversationResourceResponse {
            id: format!("a:{member}"),
            activity_id: None,
            service_url: None,
        })
    }
}

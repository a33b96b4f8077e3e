use std::sync::{Arc, Mutex};

use serde_json::json;
use tnb_core::testkit::{MockAdapter, ScriptedFailure};
use tnb_core::{
    ADAPTIVE_CARD_CONTENT_TYPE, AdapterError, ChannelAccount, ChannelInfo, ConversationAccount,
    ConversationReference, NotificationTargetType, TeamDetails, TeamsChannelAccount, TurnContext,
    reference_key,
};
use tnb_notification::{
    Channel, NotificationBot, NotificationError, NotificationOptions, NotificationTarget,
    SearchScope, send_adaptive_card, send_message,
};
use tnb_store::{MemoryStorage, ReferenceStorage};

fn reference(id: &str, conversation_type: &str) -> ConversationReference {
    ConversationReference {
        channel_id: Some("msteams".into()),
        service_url: Some("https://smba.example".into()),
        bot: Some(ChannelAccount::new("28:bot")),
        conversation: ConversationAccount::new(id)
            .with_tenant("a")
            .with_type(conversation_type),
        ..ConversationReference::default()
    }
}

fn seeded(references: &[ConversationReference]) -> Arc<MemoryStorage> {
    Arc::new(MemoryStorage::seeded(
        references.iter().map(|r| (reference_key(r), r.clone())),
    ))
}

fn bot(adapter: &MockAdapter, storage: Arc<MemoryStorage>) -> NotificationBot {
    NotificationBot::new(
        Arc::new(adapter.clone()),
        NotificationOptions::new("bot-app").with_storage(storage),
    )
}

fn team_installation() -> ConversationReference {
    reference("19:team", "channel")
}

#[tokio::test]
async fn construction_registers_tracking_middleware() {
    let adapter = MockAdapter::new();
    let _bot = bot(&adapter, seeded(&[]));
    assert_eq!(adapter.middleware_count(), 1);
}

#[tokio::test]
async fn paged_listing_returns_entries_in_order() {
    let adapter = MockAdapter::new();
    let storage = seeded(&[
        reference("9", "personal"),
        reference("10", "personal"),
        reference("2", "personal"),
    ]);
    let bot = bot(&adapter, storage.clone());

    let page = bot.get_paged_installations(None, None, true).await.unwrap();

    let ids: Vec<_> = page
        .data
        .iter()
        .map(|t| t.conversation_reference().conversation.id.clone())
        .collect();
    assert_eq!(ids, vec!["9", "10", "2"]);
    assert!(page.continuation_token.is_none());
    assert_eq!(storage.len().await, 3);
    assert_eq!(
        adapter.member_calls(),
        vec![
            ("9".to_string(), Some(1)),
            ("10".to_string(), Some(1)),
            ("2".to_string(), Some(1))
        ]
    );
    assert!(adapter.continued().iter().all(|(bot_id, _)| bot_id == "bot-app"));
}

#[tokio::test]
async fn validation_evicts_only_roster_failures() {
    let adapter = MockAdapter::new();
    adapter.fail_members("1", ScriptedFailure::NotInRoster);
    adapter.fail_members("2", ScriptedFailure::remote("Throttled", "slow down"));
    let storage = seeded(&[reference("1", "personal"), reference("2", "groupChat")]);
    let bot = bot(&adapter, storage.clone());

    let page = bot.get_paged_installations(None, None, true).await.unwrap();

    assert_eq!(page.data.len(), 1);
    assert_eq!(page.data[0].conversation_reference().conversation.id, "2");
    assert!(storage.read("_a_1").await.unwrap().is_none());
    assert!(storage.read("_a_2").await.unwrap().is_some());
}

#[tokio::test]
async fn failed_continue_is_treated_as_transient() {
    let adapter = MockAdapter::new();
    adapter.fail_continue("1", ScriptedFailure::Transport("connection reset".into()));
    let storage = seeded(&[reference("1", "personal")]);
    let bot = bot(&adapter, storage.clone());

    assert!(bot.validate_installation(&reference("1", "personal")).await);
    let page = bot.get_paged_installations(None, None, true).await.unwrap();
    assert_eq!(page.data.len(), 1);
    assert_eq!(storage.len().await, 1);
}

#[tokio::test]
async fn validation_can_be_skipped() {
    let adapter = MockAdapter::new();
    adapter.fail_members("1", ScriptedFailure::NotInRoster);
    let storage = seeded(&[reference("1", "personal"), reference("2", "personal")]);
    let bot = bot(&adapter, storage.clone());

    let page = bot.get_paged_installations(None, None, false).await.unwrap();

    assert_eq!(page.data.len(), 2);
    assert!(adapter.member_calls().is_empty());
    assert_eq!(storage.len().await, 2);
}

#[tokio::test]
async fn pages_follow_continuation_tokens() {
    let adapter = MockAdapter::new();
    adapter.fail_members("2", ScriptedFailure::NotInRoster);
    let storage = seeded(&[
        reference("1", "personal"),
        reference("2", "personal"),
        reference("3", "personal"),
    ]);
    let bot = bot(&adapter, storage.clone());

    let first = bot.get_paged_installations(Some(2), None, true).await.unwrap();
    assert_eq!(first.data.len(), 1);
    let token = first.continuation_token.expect("more pages");

    let second = bot
        .get_paged_installations(Some(2), Some(&token), true)
        .await
        .unwrap();
    assert_eq!(second.data.len(), 1);
    assert_eq!(second.data[0].conversation_reference().conversation.id, "3");
    assert!(second.continuation_token.is_none());
    assert_eq!(storage.len().await, 2);
}

#[tokio::test]
#[tracing_test::traced_test]
async fn transient_probe_failure_is_logged() {
    let adapter = MockAdapter::new();
    adapter.fail_members("1", ScriptedFailure::remote("Throttled", "slow down"));
    let bot = bot(&adapter, seeded(&[reference("1", "personal")]));

    assert!(bot.validate_installation(&reference("1", "personal")).await);
    assert!(logs_contain("installation probe failed"));
    assert!(logs_contain("Throttled"));
}

#[tokio::test]
async fn build_installation_requires_a_conversation() {
    let adapter = MockAdapter::new();
    let bot = bot(&adapter, seeded(&[]));

    let err = bot
        .build_teams_bot_installation(ConversationReference::default())
        .unwrap_err();
    assert!(matches!(err, NotificationError::MissingReference));

    let installation = bot
        .build_teams_bot_installation(reference("1", "groupChat"))
        .unwrap();
    assert_eq!(installation.target_type(), Some(NotificationTargetType::Group));
    assert_eq!(installation.bot_app_id(), "bot-app");
    assert!(adapter.continued().is_empty());
}

#[tokio::test]
async fn installation_sends_text_and_cards() {
    let adapter = MockAdapter::new();
    let bot = bot(&adapter, seeded(&[]));
    let installation = bot
        .build_teams_bot_installation(reference("1", "personal"))
        .unwrap();

    let sent = send_message(&installation, "build passed", None).await.unwrap();
    assert_eq!(sent.id.as_deref(), Some("activity-1"));

    let card = json!({ "type": "AdaptiveCard", "version": "1.4", "body": [] });
    send_adaptive_card(&installation, card.clone(), None)
        .await
        .unwrap();

    let log = adapter.sent();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].conversation_id, "1");
    assert_eq!(log[0].bot_app_id, "bot-app");
    assert_eq!(log[0].activity.text.as_deref(), Some("build passed"));
    assert_eq!(log[1].activity.attachments[0].content_type, ADAPTIVE_CARD_CONTENT_TYPE);
    assert_eq!(log[1].activity.attachments[0].content, card);
}

#[tokio::test]
async fn empty_payloads_fail_before_any_io() {
    let adapter = MockAdapter::new();
    let bot = bot(&adapter, seeded(&[]));
    let installation = bot
        .build_teams_bot_installation(reference("1", "personal"))
        .unwrap();

    let err = installation.send_message("", None).await.unwrap_err();
    assert!(matches!(err, NotificationError::EmptyMessage));
    let err = installation
        .send_adaptive_card(json!({}), None)
        .await
        .unwrap_err();
    assert!(matches!(err, NotificationError::EmptyCard));
    assert!(adapter.continued().is_empty());
}

#[tokio::test]
async fn whitespace_text_is_sent_as_is() {
    let adapter = MockAdapter::new();
    let bot = bot(&adapter, seeded(&[]));
    let installation = bot
        .build_teams_bot_installation(reference("1", "personal"))
        .unwrap();

    installation.send_message("  ", None).await.unwrap();
    assert_eq!(adapter.sent()[0].activity.text.as_deref(), Some("  "));
}

#[tokio::test]
async fn channel_send_failure_goes_to_handler() {
    let adapter = MockAdapter::new();
    adapter.fail_sends("19:ops", ScriptedFailure::Transport("boom".into()));
    let bot = bot(&adapter, seeded(&[]));
    let installation = bot.build_teams_bot_installation(team_installation()).unwrap();
    let channel = Channel::new(installation, ChannelInfo::new("19:ops", Some("Ops")));

    let seen = Mutex::new(Vec::new());
    let handler = |context: &dyn TurnContext, error: &AdapterError| {
        let conversation = context.activity().conversation_id().unwrap_or_default();
        seen.lock()
            .unwrap()
            .push(format!("{conversation}: {error}"));
    };

    let response = channel.send_message("x", Some(&handler)).await.unwrap();
    assert!(response.id.is_none());
    assert_eq!(
        seen.lock().unwrap().as_slice(),
        ["19:ops: adapter transport error: boom"]
    );

    let err = channel.send_message("x", None).await.unwrap_err();
    assert!(matches!(err, NotificationError::Adapter(_)));
    assert!(err.to_string().contains("boom"));
    assert!(adapter.sent().is_empty());
}

#[tokio::test]
async fn channel_send_reenters_channel_conversation() {
    let adapter = MockAdapter::new();
    let bot = bot(&adapter, seeded(&[]));
    let installation = bot.build_teams_bot_installation(team_installation()).unwrap();
    let channel = Channel::new(installation, ChannelInfo::new("19:ops", Some("Ops")));

    channel.send_message("deploy started", None).await.unwrap();

    let continued: Vec<_> = adapter
        .continued()
        .into_iter()
        .map(|(_, r)| r.conversation.id)
        .collect();
    assert_eq!(continued, vec!["19:team", "19:ops"]);
    assert_eq!(adapter.sent()[0].conversation_id, "19:ops");
}

#[tokio::test]
async fn member_send_opens_personal_chat() {
    let adapter = MockAdapter::new().with_members(
        "19:group",
        vec![TeamsChannelAccount::new("29:ada", Some("Ada"))],
    );
    let bot = bot(&adapter, seeded(&[]));
    let installation = bot
        .build_teams_bot_installation(reference("19:group", "groupChat"))
        .unwrap();

    let members = installation.get_paged_members(None, None).await.unwrap();
    let member = &members.data[0];
    assert_eq!(member.target_type(), Some(NotificationTargetType::Person));
    member.send_message("hello Ada", None).await.unwrap();

    let created = adapter.created_conversations();
    assert_eq!(created.len(), 1);
    assert!(!created[0].is_group);
    assert_eq!(created[0].tenant_id.as_deref(), Some("a"));
    assert_eq!(created[0].members[0].id, "29:ada");
    assert_eq!(created[0].bot.as_ref().map(|b| b.id.as_str()), Some("28:bot"));
    assert_eq!(created[0].channel_data, json!({}));
    assert_eq!(adapter.sent()[0].conversation_id, "a:29:ada");
}

#[tokio::test]
async fn member_card_failure_goes_to_handler() {
    let adapter = MockAdapter::new().with_members(
        "19:group",
        vec![TeamsChannelAccount::new("29:ada", Some("Ada"))],
    );
    adapter.fail_sends("a:29:ada", ScriptedFailure::Transport("card rejected".into()));
    let bot = bot(&adapter, seeded(&[]));
    let installation = bot
        .build_teams_bot_installation(reference("19:group", "groupChat"))
        .unwrap();
    let members = installation.get_paged_members(None, None).await.unwrap();
    let member = &members.data[0];
    let card = json!({ "type": "AdaptiveCard", "version": "1.4", "body": [] });

    let seen = Mutex::new(Vec::new());
    let handler = |context: &dyn TurnContext, error: &AdapterError| {
        let conversation = context.activity().conversation_id().unwrap_or_default();
        seen.lock()
            .unwrap()
            .push(format!("{conversation}: {error}"));
    };
    let response = send_adaptive_card(member, card.clone(), Some(&handler))
        .await
        .unwrap();
    assert!(response.id.is_none());
    assert_eq!(
        seen.lock().unwrap().as_slice(),
        ["a:29:ada: adapter transport error: card rejected"]
    );

    let err = member.send_adaptive_card(card, None).await.unwrap_err();
    assert!(matches!(err, NotificationError::Adapter(_)));
    assert!(adapter.sent().is_empty());
    assert_eq!(adapter.created_conversations().len(), 2);
}

#[tokio::test]
#[allow(deprecated)]
async fn members_walks_every_page() {
    let adapter = MockAdapter::new().with_members(
        "19:group",
        vec![
            TeamsChannelAccount::new("29:a", None),
            TeamsChannelAccount::new("29:b", None),
            TeamsChannelAccount::new("29:c", None),
        ],
    );
    let bot = bot(&adapter, seeded(&[]));
    let installation = bot
        .build_teams_bot_installation(reference("19:group", "groupChat"))
        .unwrap();

    let first = installation.get_paged_members(Some(2), None).await.unwrap();
    assert_eq!(first.data.len(), 2);
    assert!(first.continuation_token.is_some());
    assert_eq!(installation.members().await.unwrap().len(), 3);
}

#[tokio::test]
async fn team_queries_are_empty_outside_teams() {
    let adapter = MockAdapter::new();
    let bot = bot(&adapter, seeded(&[]));
    let installation = bot
        .build_teams_bot_installation(reference("1", "personal"))
        .unwrap();

    assert!(installation.channels().await.unwrap().is_empty());
    assert!(installation.get_team_details().await.unwrap().is_none());
    assert!(adapter.continued().is_empty());
}

#[tokio::test]
async fn find_member_respects_scope() {
    let adapter = MockAdapter::new()
        .with_members("p1", vec![TeamsChannelAccount::new("29:ada", Some("Ada"))])
        .with_members(
            "g1",
            vec![
                TeamsChannelAccount::new("29:bob", Some("Bob")),
                TeamsChannelAccount::new("29:cy", Some("Cy")),
            ],
        );
    let bot = bot(
        &adapter,
        seeded(&[reference("p1", "personal"), reference("g1", "groupChat")]),
    );

    let by_name = |name: &'static str| {
        move |member: &tnb_notification::Member| {
            let hit = member.account().name.as_deref() == Some(name);
            async move { hit }
        }
    };

    let missing = bot
        .find_member(by_name("Cy"), Some(SearchScope::PERSON))
        .await
        .unwrap();
    assert!(missing.is_none());

    let found = bot
        .find_member(by_name("Cy"), Some(SearchScope::PERSON | SearchScope::GROUP))
        .await
        .unwrap()
        .expect("member in group chat");
    assert_eq!(found.account().id, "29:cy");
    assert_eq!(
        found.parent().conversation_reference().conversation.id,
        "g1"
    );

    let everyone = bot.find_all_members(|_| async { true }, None).await.unwrap();
    assert_eq!(everyone.len(), 3);
}

#[tokio::test]
async fn find_channel_sees_team_details() {
    let adapter = MockAdapter::new()
        .with_channels(
            "19:team",
            vec![
                ChannelInfo::new("19:team", None),
                ChannelInfo::new("19:ops", Some("Ops")),
            ],
        )
        .with_team_details(
            "19:team",
            TeamDetails {
                id: "19:team".into(),
                name: Some("Contoso".into()),
                ..TeamDetails::default()
            },
        );
    let bot = bot(
        &adapter,
        seeded(&[team_installation(), reference("p1", "personal")]),
    );

    let ops = bot
        .find_channel(|channel, details| {
            let hit = channel.info().name.as_deref() == Some("Ops")
                && details.and_then(|d| d.name.as_deref()) == Some("Contoso");
            async move { hit }
        })
        .await
        .unwrap()
        .expect("ops channel");
    assert_eq!(ops.info().id.as_deref(), Some("19:ops"));

    let all = bot
        .find_all_channels(|_, _| async { true })
        .await
        .unwrap();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn default_registry_is_a_json_file() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("registry.json");
    let adapter = MockAdapter::new();
    let bot = NotificationBot::new(
        Arc::new(adapter.clone()),
        NotificationOptions::new("bot-app").with_store_path(&path),
    );

    let install = serde_json::from_value(json!({
        "type": "installationUpdate",
        "action": "add",
        "conversation": { "id": "1", "tenantId": "a", "conversationType": "personal" }
    }))
    .unwrap();
    bot.middleware().track(&install).await.unwrap();

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw["_a_1"]["conversation"]["id"], json!("1"));
    let page = bot.get_paged_installations(None, None, false).await.unwrap();
    assert_eq!(page.data.len(), 1);
}

// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for agent actions across both channels.

use std::sync::Arc;

use serde_json::json;
use switchboard_auth::{Credential, CredentialCoordinator, MemoryCredentialStore};
use switchboard_core::{AgentStatus, EventKind, MessageId, PullChannel, SwitchboardError};
use switchboard_gateway::{AuthorizedPullChannel, ConversationGateway};
use switchboard_queue::{QueueSettings, ReconciliationService};
use switchboard_test_utils::{MockConnector, MockDispatcher, fixtures};
use switchboard_transport::{TransportManager, TransportSettings};

struct Harness {
    gateway: ConversationGateway,
    queue: ReconciliationService,
    transport: TransportManager,
    connector: Arc<MockConnector>,
    pull: Arc<AuthorizedPullChannel>,
    server: Arc<MockDispatcher>,
    credentials: Arc<CredentialCoordinator>,
}

fn harness() -> Harness {
    let server = Arc::new(MockDispatcher::new("t-0"));
    let credentials = Arc::new(CredentialCoordinator::new(
        server.clone(),
        Arc::new(MemoryCredentialStore::new()),
        "session",
    ));
    let connector = Arc::new(MockConnector::new());
    let transport = TransportManager::new(
        TransportSettings {
            ws_url: "ws://console.test/ws".into(),
            ..TransportSettings::default()
        },
        connector.clone(),
        credentials.clone(),
    );
    let pull = Arc::new(AuthorizedPullChannel::new(credentials.clone()));
    let queue = ReconciliationService::new(
        QueueSettings::default(),
        transport.clone(),
        pull.clone(),
        credentials.subscribe_identity(),
    );
    let gateway = ConversationGateway::new(
        transport.clone(),
        pull.clone(),
        queue.clone(),
        credentials.clone(),
    );
    Harness {
        gateway,
        queue,
        transport,
        connector,
        pull,
        server,
        credentials,
    }
}

async fn signed_in() -> Harness {
    let h = harness();
    h.credentials
        .establish(Credential::new("t-0", None), Some(fixtures::agent("a-1")))
        .await;
    h.queue
        .apply_snapshot(vec![fixtures::conversation("c-1", Some("+1"), 1_000, 1)])
        .unwrap();
    h
}

#[tokio::test]
async fn sent_message_is_confirmed_with_server_id() {
    let h = signed_in().await;

    let receipt = h.gateway.send_message("c-1", "  on my way  ").await.unwrap();
    assert_eq!(receipt.message_id.as_deref(), Some("srv-1"));

    let sent = h.server.requests_named("send-message");
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0].body,
        Some(json!({"conversationId": "c-1", "agentId": "a-1", "message": "on my way"}))
    );

    let messages = h.queue.find_by_id("c-1").unwrap().messages;
    let last = messages.last().unwrap();
    assert_eq!(last.id, MessageId::Confirmed("srv-1".into()));
    assert_eq!(last.text, "on my way");
    assert!(last.delivery_error.is_none());
}

#[tokio::test]
async fn failed_send_is_annotated_then_retried() {
    let h = signed_in().await;
    h.server.fail_next("send-message", Some(500), "upstream down");

    let err = h.gateway.send_message("c-1", "hello").await.unwrap_err();
    assert!(matches!(err, SwitchboardError::Pull { status: Some(500), .. }));

    let failed = h.queue.find_by_id("c-1").unwrap().messages.pop().unwrap();
    assert!(failed.id.is_pending());
    assert!(failed.delivery_error.as_deref().unwrap().contains("upstream down"));

    let correlation = failed.correlation_id.unwrap();
    let receipt = h.gateway.retry_message(&correlation).await.unwrap();
    assert_eq!(receipt.message_id.as_deref(), Some("srv-1"));

    let retried = h.queue.find_by_id("c-1").unwrap().messages.pop().unwrap();
    assert_eq!(retried.id, MessageId::Confirmed("srv-1".into()));
    assert!(retried.delivery_error.is_none());
}

#[tokio::test]
async fn blank_message_never_leaves_the_console() {
    let h = signed_in().await;
    let err = h.gateway.send_message("c-1", "   ").await.unwrap_err();
    assert!(matches!(err, SwitchboardError::ValidationRejected(_)));
    assert!(h.server.requests_named("send-message").is_empty());
    assert_eq!(h.queue.find_by_id("c-1").unwrap().messages.len(), 1);
}

#[tokio::test]
async fn retry_of_unknown_correlation_is_rejected() {
    let h = signed_in().await;
    let err = h.gateway.retry_message("nope").await.unwrap_err();
    assert!(matches!(err, SwitchboardError::ValidationRejected(_)));
}

#[tokio::test]
async fn actions_require_a_signed_in_agent() {
    let h = harness();
    let err = h.gateway.assign("c-1").await.unwrap_err();
    assert!(matches!(err, SwitchboardError::ValidationRejected(_)));
    assert!(h.server.requests().is_empty());
}

#[tokio::test]
async fn expired_credential_is_refreshed_behind_the_action() {
    let h = signed_in().await;
    h.server.expire_token();

    h.gateway.assign("c-1").await.unwrap();

    assert_eq!(h.server.refresh_count(), 1);
    let tokens: Vec<_> = h
        .server
        .requests_named("assign")
        .into_iter()
        .map(|r| r.token.unwrap())
        .collect();
    assert_eq!(tokens, vec!["t-0", "token-1"]);
}

#[tokio::test]
async fn push_notification_goes_out_before_the_pull_call() {
    let h = signed_in().await;
    h.transport.connect().await.unwrap();
    let mut session = h.connector.next_session().await;

    h.gateway.complete("c-1").await.unwrap();

    let frame = session.next_non_ping().await.unwrap();
    assert_eq!(frame.kind(), Some(EventKind::ConversationComplete));
    assert_eq!(frame.payload, json!({"conversationId": "c-1"}));
    assert_eq!(
        h.server.requests_named("complete")[0].body,
        Some(json!({"conversationId": "c-1", "agentId": "a-1"}))
    );
}

#[tokio::test]
async fn refused_acknowledgement_is_an_error() {
    let h = signed_in().await;
    h.server.set_response("assign", json!({"success": false}));
    let err = h.gateway.assign("c-1").await.unwrap_err();
    assert!(matches!(err, SwitchboardError::Pull { .. }));
}

#[tokio::test]
async fn priority_and_tags_are_pull_only() {
    let h = signed_in().await;
    h.transport.connect().await.unwrap();
    let mut session = h.connector.next_session().await;

    h.gateway.set_priority("c-1", 1).await.unwrap();
    h.gateway
        .set_tags("c-1", &["vip".to_string(), "billing".to_string()])
        .await
        .unwrap();

    assert_eq!(
        h.server.requests_named("set-priority")[0].body,
        Some(json!({"conversationId": "c-1", "priority": 1}))
    );
    assert_eq!(
        h.server.requests_named("set-tags")[0].body,
        Some(json!({"conversationId": "c-1", "tags": ["vip", "billing"]}))
    );
    assert!(session.drain().iter().all(|f| f.kind() == Some(EventKind::Ping)));
}

#[tokio::test]
async fn agent_status_change_republishes_identity() {
    let h = signed_in().await;
    let mut identity = h.credentials.subscribe_identity();
    identity.borrow_and_update();

    h.gateway.set_agent_status(AgentStatus::Busy).await.unwrap();

    assert!(identity.has_changed().unwrap());
    assert_eq!(h.credentials.identity().unwrap().status, AgentStatus::Busy);
    assert_eq!(
        h.server.requests_named("update-agent-status")[0].body,
        Some(json!({"agentId": "a-1", "status": "Ocupado"}))
    );
}

#[tokio::test]
async fn snapshot_list_skips_undecodable_entries() {
    let h = signed_in().await;
    h.server.set_response(
        "get-queue-snapshot",
        json!([fixtures::conversation_json("c-2", Some("+2"), 1_000, 1), 42, "junk"]),
    );
    let items = h.pull.queue_snapshot().await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].identity(), Some("c-2"));
}

#[tokio::test]
async fn queue_update_request_is_pushed() {
    let h = signed_in().await;
    h.transport.connect().await.unwrap();
    let mut session = h.connector.next_session().await;

    h.gateway.request_queue_update();

    let frame = session.next_non_ping().await.unwrap();
    assert_eq!(frame.kind(), Some(EventKind::QueueRequest));
}

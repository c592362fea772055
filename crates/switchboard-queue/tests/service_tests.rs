// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the reconciliation service over a mock push channel.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use switchboard_auth::{Credential, CredentialCoordinator, MemoryCredentialStore};
use switchboard_core::{EventKind, MessageId};
use switchboard_queue::{QueueSettings, ReconciliationService};
use switchboard_test_utils::{MockConnector, MockDispatcher, MockPullChannel, fixtures};
use switchboard_transport::{TransportManager, TransportSettings};
use tokio_util::sync::CancellationToken;

struct Harness {
    service: ReconciliationService,
    transport: TransportManager,
    connector: Arc<MockConnector>,
    pull: Arc<MockPullChannel>,
    cancel: CancellationToken,
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn harness_with(pull: MockPullChannel) -> Harness {
    let credentials = Arc::new(CredentialCoordinator::new(
        Arc::new(MockDispatcher::new("t-0")),
        Arc::new(MemoryCredentialStore::new()),
        "session",
    ));
    credentials
        .establish(Credential::new("t-0", None), Some(fixtures::agent("a-1")))
        .await;

    let connector = Arc::new(MockConnector::new());
    let transport = TransportManager::new(
        TransportSettings {
            ws_url: "ws://console.test/ws".into(),
            ..TransportSettings::default()
        },
        connector.clone(),
        credentials.clone(),
    );
    let pull = Arc::new(pull);
    let service = ReconciliationService::new(
        QueueSettings::default(),
        transport.clone(),
        pull.clone(),
        credentials.subscribe_identity(),
    );
    Harness {
        service,
        transport,
        connector,
        pull,
        cancel: CancellationToken::new(),
    }
}

async fn harness() -> Harness {
    harness_with(MockPullChannel::new()).await
}

impl Harness {
    fn start(&self) {
        tokio::spawn(self.service.clone().run(self.cancel.clone()));
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

fn ids(service: &ReconciliationService) -> Vec<String> {
    service
        .queue()
        .into_iter()
        .map(|r| r.conversation_id)
        .collect()
}

#[tokio::test(start_paused = true)]
async fn connecting_pulls_a_snapshot() {
    let h = harness().await;
    h.pull.push_snapshot(vec![
        fixtures::conversation("c-1", Some("+1"), 1_000, 1),
        fixtures::conversation("c-2", Some("+2"), 2_000, 1),
    ]);
    h.start();
    settle().await;
    assert!(h.service.queue().is_empty());

    h.transport.connect().await.unwrap();
    settle().await;

    assert_eq!(ids(&h.service), vec!["c-1", "c-2"]);
    assert_eq!(h.pull.calls(), vec!["get-queue-snapshot"]);
}

#[tokio::test(start_paused = true)]
async fn push_events_reach_the_queue() {
    let h = harness().await;
    h.start();
    h.transport.connect().await.unwrap();
    let server = h.connector.next_session().await;
    settle().await;

    server.push(
        EventKind::QueueUpdated,
        json!([fixtures::conversation_json("c-1", Some("+1"), 1_000, 1)]),
    );
    settle().await;
    assert_eq!(ids(&h.service), vec!["c-1"]);

    server.push(
        EventKind::MessageNew,
        json!({
            "conversationId": "c-1",
            "message": fixtures::message_json("m-9", "c-1", "user", "hola", 9_000)
        }),
    );
    settle().await;
    let record = h.service.find_by_id("c-1").unwrap();
    assert_eq!(record.messages.len(), 2);
    assert_eq!(record.messages[1].id.as_str(), "m-9");
}

#[tokio::test(start_paused = true)]
async fn message_for_unknown_conversation_requests_it() {
    let h = harness().await;
    h.start();
    h.transport.connect().await.unwrap();
    let mut server = h.connector.next_session().await;
    settle().await;

    server.push(
        EventKind::MessageNew,
        json!({
            "conversationId": "c-404",
            "message": fixtures::message_json("m-1", "c-404", "user", "hello?", 1_000)
        }),
    );

    let frame = server.next_non_ping().await.unwrap();
    assert_eq!(frame.kind(), Some(EventKind::ConversationRequest));
    assert_eq!(frame.payload["conversationId"], "c-404");
    assert!(h.service.queue().is_empty());
}

#[tokio::test(start_paused = true)]
async fn conversation_new_drops_ghosts() {
    let h = harness().await;
    h.start();
    h.transport.connect().await.unwrap();
    let server = h.connector.next_session().await;
    settle().await;

    server.push(
        EventKind::QueueUpdated,
        json!([fixtures::conversation_json("c-1", Some("+1"), 1_000, 1)]),
    );
    settle().await;

    // No messages yet.
    server.push(
        EventKind::ConversationNew,
        fixtures::conversation_json("c-2", Some("+2"), 2_000, 0),
    );
    // Same origin as a queued conversation.
    server.push(
        EventKind::ConversationNew,
        fixtures::conversation_json("c-3", Some("+1"), 3_000, 1),
    );
    server.push(
        EventKind::ConversationNew,
        fixtures::conversation_json("c-4", Some("+4"), 4_000, 2),
    );
    settle().await;

    assert_eq!(ids(&h.service), vec!["c-1", "c-4"]);
}

#[tokio::test(start_paused = true)]
async fn completion_clears_queue_and_active() {
    let h = harness().await;
    h.start();
    h.transport.connect().await.unwrap();
    let server = h.connector.next_session().await;
    settle().await;

    h.service
        .apply_snapshot(vec![fixtures::conversation("c-1", Some("+1"), 1_000, 2)])
        .unwrap();
    h.service.set_active(h.service.find_by_id("c-1"));
    assert!(h.service.active().is_some());

    server.push(
        EventKind::ConversationCompleted,
        json!({"conversationId": "c-1"}),
    );
    settle().await;
    assert!(h.service.queue().is_empty());
    assert!(h.service.active().is_none());
}

#[tokio::test(start_paused = true)]
async fn own_assignment_becomes_active() {
    let h = harness().await;
    h.start();
    h.transport.connect().await.unwrap();
    let server = h.connector.next_session().await;
    settle().await;

    let mut assigned = fixtures::conversation_json("c-7", Some("+7"), 1_000, 1);
    assigned["assignedAgent"] = json!("a-1");
    server.push(
        EventKind::ConversationAssigned,
        json!({"conversation": assigned}),
    );
    settle().await;

    let active = h.service.active().unwrap();
    assert_eq!(active.conversation_id, "c-7");
    assert_eq!(active.assigned_agent_id.as_deref(), Some("a-1"));
}

#[tokio::test(start_paused = true)]
async fn failed_pull_keeps_last_known_queue() {
    let h = harness().await;
    h.pull
        .push_snapshot(vec![fixtures::conversation("c-1", Some("+1"), 1_000, 1)]);
    h.pull.push_snapshot_error("service unavailable");

    assert!(h.service.pull_snapshot().await.is_some());
    assert!(h.service.pull_snapshot().await.is_none());
    assert_eq!(ids(&h.service), vec!["c-1"]);
}

#[tokio::test(start_paused = true)]
async fn push_snapshot_is_dropped_while_pull_merges() {
    let h = harness_with(MockPullChannel::new().with_snapshot_delay(Duration::from_secs(1))).await;
    h.pull
        .push_snapshot(vec![fixtures::conversation("c-pull", Some("+1"), 1_000, 1)]);

    let service = h.service.clone();
    let pulling = tokio::spawn(async move { service.pull_snapshot().await });
    settle().await;

    let dropped = h
        .service
        .apply_snapshot(vec![fixtures::conversation("c-push", Some("+2"), 1_000, 1)]);
    assert!(dropped.is_none());

    assert!(pulling.await.unwrap().is_some());
    assert_eq!(ids(&h.service), vec!["c-pull"]);
    assert!(h.service.apply_snapshot(Vec::new()).is_some());
}

#[tokio::test(start_paused = true)]
async fn dedup_runs_shortly_after_a_snapshot() {
    let h = harness().await;
    h.start();
    settle().await;

    // Same origin an hour apart with very different sizes: not merged on
    // arrival, but the assigned one claims the origin during the sweep.
    h.service
        .apply_snapshot(vec![
            fixtures::assigned("c-1", Some("+1"), 1_000, 10, "a-1"),
            fixtures::conversation("c-2", Some("+1"), 3_601_000, 1),
        ])
        .unwrap();
    assert_eq!(ids(&h.service), vec!["c-1", "c-2"]);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(h.service.queue().len(), 2);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(ids(&h.service), vec!["c-1"]);
}

#[tokio::test(start_paused = true)]
async fn snapshot_restores_own_conversations_it_left_out() {
    let h = harness().await;
    h.service
        .apply_snapshot(vec![
            fixtures::assigned("c-1", Some("+1"), 1_000, 2, "a-1"),
            fixtures::assigned("c-2", Some("+2"), 1_000, 2, "a-9"),
        ])
        .unwrap();

    let report = h.service.apply_snapshot(Vec::new()).unwrap();
    assert_eq!(report.restored, 1);
    assert_eq!(ids(&h.service), vec!["c-1"]);
}

#[tokio::test(start_paused = true)]
async fn refresh_splices_known_and_requests_unknown() {
    let h = harness().await;
    h.service
        .apply_snapshot(vec![fixtures::conversation("c-1", Some("+1"), 1_000, 1)])
        .unwrap();
    h.pull
        .set_conversation("c-1", fixtures::conversation("c-1", Some("+1"), 1_000, 3));

    let refreshed = h.service.refresh("c-1").await.unwrap();
    assert_eq!(refreshed.messages.len(), 3);
    assert_eq!(h.service.find_by_id("c-1").unwrap().messages.len(), 3);

    assert!(h.service.refresh("c-404").await.is_none());
    assert_eq!(h.pull.calls(), vec!["get-conversation c-1"]);

    // Buffered while disconnected, delivered once the send kicks off a connect.
    let mut server = h.connector.next_session().await;
    let frame = server.next_non_ping().await.unwrap();
    assert_eq!(frame.kind(), Some(EventKind::ConversationRequest));
    assert_eq!(frame.payload["conversationId"], "c-404");
}

#[tokio::test(start_paused = true)]
async fn refresh_failure_returns_last_known() {
    let h = harness().await;
    h.service
        .apply_snapshot(vec![fixtures::conversation("c-1", Some("+1"), 1_000, 2)])
        .unwrap();
    h.pull.fail("get-conversation", "boom");

    let record = h.service.refresh("c-1").await.unwrap();
    assert_eq!(record.messages.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn history_merges_and_survives_failure() {
    let h = harness().await;
    h.service
        .apply_snapshot(vec![fixtures::conversation("c-1", Some("+1"), 10_000, 1)])
        .unwrap();
    h.pull.set_messages(
        "c-1",
        vec![
            fixtures::message("old-1", "c-1", "user", "earlier", 1_000),
            fixtures::message("c-1-m0", "c-1", "user", "message 0", 10_000),
        ],
    );

    let merged = h.service.load_messages("c-1").await;
    let order: Vec<_> = merged.iter().map(|m| m.id.as_str().to_owned()).collect();
    assert_eq!(order, vec!["old-1", "c-1-m0"]);

    h.pull.fail("get-messages", "timeout");
    assert_eq!(h.service.load_messages("c-1").await.len(), 2);
    assert!(h.service.load_messages("c-404").await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn completed_list_degrades_to_empty() {
    let h = harness().await;
    h.pull
        .set_completed(vec![fixtures::conversation("c-9", Some("+9"), 1_000, 1)]);
    assert_eq!(h.service.completed_conversations().await.len(), 1);

    h.pull.fail("get-completed", "boom");
    assert!(h.service.completed_conversations().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn clear_empties_local_state_and_asks_for_queue() {
    let h = harness().await;
    h.start();
    h.transport.connect().await.unwrap();
    let mut server = h.connector.next_session().await;
    settle().await;

    h.service
        .apply_snapshot(vec![fixtures::conversation("c-1", Some("+1"), 1_000, 1)])
        .unwrap();
    h.service.set_active(h.service.find_by_id("c-1"));

    h.service.clear();
    assert!(h.service.queue().is_empty());
    assert!(h.service.active().is_none());

    let frame = server.next_non_ping().await.unwrap();
    assert_eq!(frame.kind(), Some(EventKind::QueueRequest));
}

#[tokio::test(start_paused = true)]
async fn optimistic_message_is_confirmed_by_echo() {
    let h = harness().await;
    h.start();
    h.transport.connect().await.unwrap();
    let server = h.connector.next_session().await;
    settle().await;

    h.service
        .apply_snapshot(vec![fixtures::conversation("c-1", Some("+1"), 1_000, 1)])
        .unwrap();
    let pending = h.service.push_optimistic("c-1", "  on it  ").unwrap();
    assert!(matches!(pending.id, MessageId::Pending(_)));
    assert_eq!(pending.text, "on it");
    assert_eq!(pending.agent_id.as_deref(), Some("a-1"));

    server.push(
        EventKind::MessageNew,
        json!({
            "conversationId": "c-1",
            "message": {
                "id": "srv-1",
                "from": "agent",
                "text": "on it",
                "agentId": "a-1",
                "timestamp": pending.timestamp
            }
        }),
    );
    settle().await;

    let messages = h.service.find_by_id("c-1").unwrap().messages;
    assert_eq!(messages.len(), 2);
    let echo = messages.last().unwrap();
    assert_eq!(echo.id, MessageId::Confirmed("srv-1".into()));
    assert_eq!(echo.correlation_id, pending.correlation_id);
}

#[tokio::test(start_paused = true)]
async fn failed_optimistic_message_can_be_retried() {
    let h = harness().await;
    h.service
        .apply_snapshot(vec![fixtures::conversation("c-1", Some("+1"), 1_000, 1)])
        .unwrap();
    let pending = h.service.push_optimistic("c-1", "hello").unwrap();
    let correlation = pending.correlation_id.clone().unwrap();

    assert!(h.service.fail_message(&correlation, "network down"));
    let failed = h.service.find_by_id("c-1").unwrap().messages;
    assert_eq!(
        failed.last().unwrap().delivery_error.as_deref(),
        Some("network down")
    );

    let retried = h.service.retry_message(&correlation).unwrap();
    assert!(retried.delivery_error.is_none());
    assert!(h.service.confirm_message(&correlation, "srv-7"));
    let messages = h.service.find_by_id("c-1").unwrap().messages;
    assert_eq!(messages.last().unwrap().id, MessageId::Confirmed("srv-7".into()));
}

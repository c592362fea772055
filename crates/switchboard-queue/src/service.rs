// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reconciliation service: feeds push events and pull results into the
//! [`QueueStore`] and republishes the merged state.
//!
//! Mutation happens under a short `std::sync::Mutex` section that is never
//! held across an await. Pull failures are logged and turned into
//! last-known results; nothing here returns a network error to the caller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::json;
use switchboard_bus::StateCell;
use switchboard_core::{
    AgentIdentity, ConnectionState, ConversationRecord, Envelope, EventKind, InboundEvent,
    MessageRecord, PullChannel, RawConversation, SwitchboardError, now_millis,
};
use switchboard_transport::TransportManager;
use tokio::sync::{Notify, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::normalize;
use crate::settings::QueueSettings;
use crate::store::{ConversationOutcome, MessageOutcome, QueueStore, SnapshotReport, UpdateKind};

/// Held while a snapshot merge is in progress; released on drop.
struct MergeGuard<'a>(&'a AtomicBool);

impl<'a> MergeGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for MergeGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct Shared {
    settings: QueueSettings,
    store: Mutex<QueueStore>,
    queue: StateCell<Vec<ConversationRecord>>,
    active: StateCell<Option<ConversationRecord>>,
    merging: AtomicBool,
    snapshot_merged: Notify,
    transport: TransportManager,
    pull: Arc<dyn PullChannel>,
    identity: watch::Receiver<Option<AgentIdentity>>,
}

/// Cloneable handle to the reconciled queue.
#[derive(Clone)]
pub struct ReconciliationService {
    inner: Arc<Shared>,
}

impl ReconciliationService {
    pub fn new(
        settings: QueueSettings,
        transport: TransportManager,
        pull: Arc<dyn PullChannel>,
        identity: watch::Receiver<Option<AgentIdentity>>,
    ) -> Self {
        Self {
            inner: Arc::new(Shared {
                store: Mutex::new(QueueStore::new(settings.clone())),
                settings,
                queue: StateCell::new(Vec::new()),
                active: StateCell::new(None),
                merging: AtomicBool::new(false),
                snapshot_merged: Notify::new(),
                transport,
                pull,
                identity,
            }),
        }
    }

    /// Run `f` against the store, then publish whatever changed.
    fn with_store<R>(&self, f: impl FnOnce(&mut QueueStore) -> R) -> R {
        let mut store = self
            .inner
            .store
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let result = f(&mut store);
        self.inner.queue.set_if_changed(store.queue().to_vec());
        self.inner.active.set_if_changed(store.active().cloned());
        result
    }

    fn agent_id(&self) -> Option<String> {
        self.inner.identity.borrow().as_ref().map(|a| a.id.clone())
    }

    pub fn queue(&self) -> Vec<ConversationRecord> {
        self.inner.queue.get()
    }

    pub fn subscribe_queue(&self) -> watch::Receiver<Vec<ConversationRecord>> {
        self.inner.queue.subscribe()
    }

    pub fn active(&self) -> Option<ConversationRecord> {
        self.inner.active.get()
    }

    pub fn subscribe_active(&self) -> watch::Receiver<Option<ConversationRecord>> {
        self.inner.active.subscribe()
    }

    /// Make `record` the active conversation, or clear it.
    pub fn set_active(&self, record: Option<ConversationRecord>) {
        self.with_store(|s| s.set_active(record));
    }

    pub fn find_by_id(&self, id: &str) -> Option<ConversationRecord> {
        self.with_store(|s| s.find_by_id(id).cloned())
    }

    /// Merge a snapshot. Dropped if another merge is in progress.
    pub fn apply_snapshot(&self, items: Vec<RawConversation>) -> Option<SnapshotReport> {
        let Some(_guard) = MergeGuard::acquire(&self.inner.merging) else {
            debug!("snapshot merge already running, dropping this one");
            return None;
        };
        Some(self.merge_snapshot(items))
    }

    fn merge_snapshot(&self, items: Vec<RawConversation>) -> SnapshotReport {
        let me = self.agent_id();
        let received = items.len();
        let report = self.with_store(|s| s.apply_snapshot(items, me.as_deref(), now_millis()));
        info!(
            received,
            admitted = report.admitted,
            merged = report.merged,
            rejected = report.rejected,
            restored = report.restored,
            "queue snapshot merged"
        );
        self.inner.snapshot_merged.notify_one();
        report
    }

    /// Pull the queue snapshot and merge it.
    ///
    /// The merge guard is held for the whole round trip, so a push snapshot
    /// arriving meanwhile is dropped. Returns `None` when skipped or failed.
    pub async fn pull_snapshot(&self) -> Option<SnapshotReport> {
        let Some(_guard) = MergeGuard::acquire(&self.inner.merging) else {
            debug!("snapshot merge already running, skipping pull");
            return None;
        };
        match self.inner.pull.queue_snapshot().await {
            Ok(items) => Some(self.merge_snapshot(items)),
            Err(e) => {
                warn!(error = %e, "queue snapshot pull failed, keeping last known queue");
                None
            }
        }
    }

    /// Run one dedup pass now. Returns how many records were dropped.
    pub fn dedup_now(&self) -> usize {
        self.with_store(QueueStore::dedup_pass)
    }

    /// Re-fetch a conversation, or ask the server to push it if unknown.
    pub async fn refresh(&self, conversation_id: &str) -> Option<ConversationRecord> {
        let Some(known) = self.find_by_id(conversation_id) else {
            debug!(conversation_id, "unknown conversation, requesting it");
            self.request_conversation(conversation_id);
            return None;
        };
        match self.inner.pull.conversation(conversation_id).await {
            Ok(raw) => self
                .with_store(|s| s.splice_refreshed(raw, now_millis()))
                .or(Some(known)),
            Err(e) => {
                warn!(conversation_id, error = %e, "conversation refresh failed");
                Some(known)
            }
        }
    }

    /// Pull the message history and merge it in.
    pub async fn load_messages(&self, conversation_id: &str) -> Vec<MessageRecord> {
        match self.inner.pull.messages(conversation_id).await {
            Ok(raw) => self.with_store(|s| s.merge_history(conversation_id, raw, now_millis())),
            Err(e) => {
                warn!(conversation_id, error = %e, "message history pull failed");
                self.find_by_id(conversation_id)
                    .map(|r| r.messages)
                    .unwrap_or_default()
            }
        }
    }

    pub async fn completed_conversations(&self) -> Vec<ConversationRecord> {
        match self.inner.pull.completed_conversations().await {
            Ok(items) => {
                let now = now_millis();
                items
                    .into_iter()
                    .filter_map(|raw| {
                        normalize::conversation(raw, now, self.inner.settings.default_priority)
                    })
                    .map(|c| c.record)
                    .collect()
            }
            Err(e) => {
                warn!(error = %e, "completed conversations pull failed");
                Vec::new()
            }
        }
    }

    /// Forget everything local and ask the server for a fresh queue.
    pub fn clear(&self) {
        info!("clearing local conversation cache");
        self.with_store(QueueStore::clear);
        self.request_queue_update();
    }

    pub fn request_queue_update(&self) {
        if let Err(e) = self.inner.transport.send(EventKind::QueueRequest, json!({})) {
            warn!(error = %e, "queue request not sent");
        }
    }

    fn request_conversation(&self, conversation_id: &str) {
        let payload = json!({ "conversationId": conversation_id });
        if let Err(e) = self.inner.transport.send(EventKind::ConversationRequest, payload) {
            warn!(conversation_id, error = %e, "conversation request not sent");
        }
    }

    /// Add a pending agent message ahead of server confirmation.
    pub fn push_optimistic(&self, conversation_id: &str, text: &str) -> Result<MessageRecord, SwitchboardError> {
        let me = self.agent_id();
        self.with_store(|s| s.push_optimistic(conversation_id, text, me.as_deref(), now_millis()))
    }

    pub fn confirm_message(&self, correlation_id: &str, server_id: &str) -> bool {
        self.with_store(|s| s.confirm_message(correlation_id, server_id))
    }

    pub fn fail_message(&self, correlation_id: &str, error: &str) -> bool {
        self.with_store(|s| s.fail_message(correlation_id, error))
    }

    pub fn retry_message(&self, correlation_id: &str) -> Option<MessageRecord> {
        self.with_store(|s| s.retry_message(correlation_id))
    }

    /// Apply one push envelope.
    pub fn handle_envelope(&self, envelope: &Envelope) {
        if !envelope.kind().is_some_and(EventKind::is_inbound) {
            return;
        }
        let event = match InboundEvent::try_from(envelope) {
            Ok(event) => event,
            Err(e) => {
                warn!(event_type = %envelope.event_type, error = %e, "dropping undecodable event");
                return;
            }
        };

        let now = now_millis();
        match event {
            InboundEvent::QueueUpdated(items) => {
                self.apply_snapshot(items);
            }
            InboundEvent::ConversationUpdated(raw) => {
                self.apply_update(raw, UpdateKind::Updated, now);
            }
            InboundEvent::ConversationAssigned(raw) => {
                self.apply_update(raw, UpdateKind::Assigned, now);
            }
            InboundEvent::ConversationCompleted { conversation_id } => {
                if self.with_store(|s| s.apply_completed(&conversation_id)) {
                    info!(conversation_id = %conversation_id, "conversation completed");
                }
            }
            InboundEvent::ConversationNew(raw) => {
                let outcome = self.with_store(|s| s.apply_new_conversation(raw, now));
                debug!(?outcome, "conversation:new applied");
            }
            InboundEvent::MessageNew {
                conversation_id,
                message,
            } => {
                let outcome = self.with_store(|s| s.apply_new_message(&conversation_id, message, now));
                if outcome == MessageOutcome::UnknownConversation {
                    self.request_conversation(&conversation_id);
                }
            }
            InboundEvent::AgentStatusUpdated(_) | InboundEvent::Pong => {}
        }
    }

    fn apply_update(&self, raw: RawConversation, kind: UpdateKind, now: i64) {
        let me = self.agent_id();
        let outcome = self.with_store(|s| s.apply_update(raw, kind, me.as_deref(), now));
        if outcome == ConversationOutcome::Ignored {
            debug!(?kind, "update for unknown conversation ignored");
        }
    }

    /// Consume push events and timers until `cancel` fires.
    ///
    /// Pulls a snapshot on every transition to connected, runs the periodic
    /// dedup pass, and a follow-up pass shortly after each snapshot merge.
    pub async fn run(self, cancel: CancellationToken) {
        let mut events = self.inner.transport.on_event(None);
        let mut state = self.inner.transport.subscribe_state();

        let period = self.inner.settings.dedup_interval;
        let mut dedup = tokio::time::interval_at(Instant::now() + period, period);
        dedup.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let follow_up = tokio::time::sleep(self.inner.settings.dedup_after_snapshot);
        tokio::pin!(follow_up);
        let mut follow_up_armed = false;

        if *state.borrow_and_update() == ConnectionState::Connected {
            self.spawn_pull_snapshot();
        }

        info!("reconciliation service started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(envelope) => self.handle_envelope(&envelope),
                    None => break,
                },
                changed = state.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    if *state.borrow_and_update() == ConnectionState::Connected {
                        self.spawn_pull_snapshot();
                    }
                }
                _ = self.inner.snapshot_merged.notified() => {
                    follow_up
                        .as_mut()
                        .reset(Instant::now() + self.inner.settings.dedup_after_snapshot);
                    follow_up_armed = true;
                }
                _ = &mut follow_up, if follow_up_armed => {
                    follow_up_armed = false;
                    self.dedup_now();
                }
                _ = dedup.tick() => {
                    self.dedup_now();
                }
            }
        }
        info!("reconciliation service stopped");
    }

    fn spawn_pull_snapshot(&self) {
        let this = self.clone();
        tokio::spawn(async move {
            this.pull_snapshot().await;
        });
    }
}

impl std::fmt::Debug for ReconciliationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciliationService")
            .field("queue_len", &self.inner.queue.get().len())
            .field("merging", &self.inner.merging.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_guard_is_exclusive_and_released_on_drop() {
        let flag = AtomicBool::new(false);
        let guard = MergeGuard::acquire(&flag).unwrap();
        assert!(MergeGuard::acquire(&flag).is_none());
        drop(guard);
        assert!(MergeGuard::acquire(&flag).is_some());
    }

    #[test]
    fn merge_guard_is_released_on_panic() {
        let flag = AtomicBool::new(false);
        let result = std::panic::catch_unwind(|| {
            let _guard = MergeGuard::acquire(&flag).unwrap();
            panic!("merge blew up");
        });
        assert!(result.is_err());
        assert!(!flag.load(Ordering::Acquire));
    }
}

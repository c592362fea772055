// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted pull channel for exercising the reconciliation service on its own.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use switchboard_core::{
    AgentStatus, PullChannel, RawConversation, RawMessage, SendReceipt, SwitchboardError,
};

#[derive(Default)]
struct Script {
    snapshots: VecDeque<Result<Vec<RawConversation>, SwitchboardError>>,
    conversations: HashMap<String, RawConversation>,
    messages: HashMap<String, Vec<RawMessage>>,
    completed: Vec<RawConversation>,
    fail: HashMap<&'static str, String>,
    calls: Vec<String>,
}

/// A [`PullChannel`] that answers from canned data.
///
/// Snapshots are consumed in order; once the script runs dry an empty queue
/// is returned. Operation names match [`switchboard_core::PullRequest::name`].
#[derive(Default)]
pub struct MockPullChannel {
    script: Mutex<Script>,
    snapshot_delay: Duration,
}

impl MockPullChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every snapshot response for `delay`.
    pub fn with_snapshot_delay(mut self, delay: Duration) -> Self {
        self.snapshot_delay = delay;
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn push_snapshot(&self, items: Vec<RawConversation>) {
        self.lock().snapshots.push_back(Ok(items));
    }

    pub fn push_snapshot_error(&self, message: &str) {
        self.lock()
            .snapshots
            .push_back(Err(SwitchboardError::pull(Some(503), message)));
    }

    pub fn set_conversation(&self, id: &str, raw: RawConversation) {
        self.lock().conversations.insert(id.to_string(), raw);
    }

    pub fn set_messages(&self, conversation_id: &str, messages: Vec<RawMessage>) {
        self.lock()
            .messages
            .insert(conversation_id.to_string(), messages);
    }

    pub fn set_completed(&self, items: Vec<RawConversation>) {
        self.lock().completed = items;
    }

    /// Every call named `name` fails until cleared.
    pub fn fail(&self, name: &'static str, message: &str) {
        self.lock().fail.insert(name, message.to_string());
    }

    pub fn clear_failure(&self, name: &'static str) {
        self.lock().fail.remove(name);
    }

    /// Operation names in call order, with the conversation id when there is one.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    fn enter(&self, name: &'static str, subject: Option<&str>) -> Result<(), SwitchboardError> {
        let mut script = self.lock();
        script.calls.push(match subject {
            Some(s) => format!("{name} {s}"),
            None => name.to_string(),
        });
        match script.fail.get(name) {
            Some(message) => Err(SwitchboardError::pull(Some(500), message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PullChannel for MockPullChannel {
    async fn queue_snapshot(&self) -> Result<Vec<RawConversation>, SwitchboardError> {
        self.enter("get-queue-snapshot", None)?;
        if !self.snapshot_delay.is_zero() {
            tokio::time::sleep(self.snapshot_delay).await;
        }
        self.lock().snapshots.pop_front().unwrap_or(Ok(Vec::new()))
    }

    async fn messages(&self, conversation_id: &str) -> Result<Vec<RawMessage>, SwitchboardError> {
        self.enter("get-messages", Some(conversation_id))?;
        Ok(self
            .lock()
            .messages
            .get(conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn conversation(
        &self,
        conversation_id: &str,
    ) -> Result<RawConversation, SwitchboardError> {
        self.enter("get-conversation", Some(conversation_id))?;
        self.lock()
            .conversations
            .get(conversation_id)
            .cloned()
            .ok_or_else(|| SwitchboardError::pull(Some(404), format!("{conversation_id} not found")))
    }

    async fn completed_conversations(&self) -> Result<Vec<RawConversation>, SwitchboardError> {
        self.enter("get-completed", None)?;
        Ok(self.lock().completed.clone())
    }

    async fn send_message(
        &self,
        conversation_id: &str,
        _agent_id: &str,
        _text: &str,
    ) -> Result<SendReceipt, SwitchboardError> {
        self.enter("send-message", Some(conversation_id))?;
        let n = self.lock().calls.len();
        Ok(SendReceipt {
            success: true,
            message_id: Some(format!("srv-{n}")),
        })
    }

    async fn assign(&self, conversation_id: &str, _agent_id: &str) -> Result<(), SwitchboardError> {
        self.enter("assign", Some(conversation_id))
    }

    async fn complete(&self, conversation_id: &str, _agent_id: &str) -> Result<(), SwitchboardError> {
        self.enter("complete", Some(conversation_id))
    }

    async fn set_priority(&self, conversation_id: &str, _priority: i64) -> Result<(), SwitchboardError> {
        self.enter("set-priority", Some(conversation_id))
    }

    async fn set_tags(&self, conversation_id: &str, _tags: &[String]) -> Result<(), SwitchboardError> {
        self.enter("set-tags", Some(conversation_id))
    }

    async fn update_agent_status(
        &self,
        agent_id: &str,
        _status: AgentStatus,
    ) -> Result<(), SwitchboardError> {
        self.enter("update-agent-status", Some(agent_id))
    }
}

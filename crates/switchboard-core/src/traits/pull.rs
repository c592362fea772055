// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed pull channel operations.

use async_trait::async_trait;

use crate::error::SwitchboardError;
use crate::request::SendReceipt;
use crate::types::{AgentStatus, RawConversation, RawMessage};

/// Authoritative request/response operations against the console API.
///
/// Every call is expected to pass through the credential coordinator.
#[async_trait]
pub trait PullChannel: Send + Sync {
    async fn queue_snapshot(&self) -> Result<Vec<RawConversation>, SwitchboardError>;

    async fn messages(&self, conversation_id: &str) -> Result<Vec<RawMessage>, SwitchboardError>;

    async fn conversation(&self, conversation_id: &str)
    -> Result<RawConversation, SwitchboardError>;

    async fn completed_conversations(&self) -> Result<Vec<RawConversation>, SwitchboardError>;

    async fn send_message(
        &self,
        conversation_id: &str,
        agent_id: &str,
        text: &str,
    ) -> Result<SendReceipt, SwitchboardError>;

    async fn assign(&self, conversation_id: &str, agent_id: &str) -> Result<(), SwitchboardError>;

    async fn complete(&self, conversation_id: &str, agent_id: &str)
    -> Result<(), SwitchboardError>;

    async fn set_priority(&self, conversation_id: &str, priority: i64)
    -> Result<(), SwitchboardError>;

    async fn set_tags(&self, conversation_id: &str, tags: &[String])
    -> Result<(), SwitchboardError>;

    async fn update_agent_status(
        &self,
        agent_id: &str,
        status: AgentStatus,
    ) -> Result<(), SwitchboardError>;
}

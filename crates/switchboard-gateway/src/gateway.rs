// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Agent actions as dual dispatch.
//!
//! Each action first notifies the push channel so other consoles see it
//! quickly, then makes the authoritative pull call. Only the pull result
//! decides success. A suppressed or buffered notification never fails an
//! action.

use std::sync::Arc;

use serde_json::{Value, json};
use switchboard_auth::CredentialCoordinator;
use switchboard_core::{
    AgentIdentity, AgentStatus, EventKind, MessageRecord, PullChannel, SendReceipt,
    SwitchboardError,
};
use switchboard_queue::ReconciliationService;
use switchboard_transport::TransportManager;
use tracing::{debug, info, warn};

/// Thin front door for agent actions.
#[derive(Clone)]
pub struct ConversationGateway {
    transport: TransportManager,
    pull: Arc<dyn PullChannel>,
    queue: ReconciliationService,
    credentials: Arc<CredentialCoordinator>,
}

impl ConversationGateway {
    pub fn new(
        transport: TransportManager,
        pull: Arc<dyn PullChannel>,
        queue: ReconciliationService,
        credentials: Arc<CredentialCoordinator>,
    ) -> Self {
        Self {
            transport,
            pull,
            queue,
            credentials,
        }
    }

    fn agent(&self) -> Result<AgentIdentity, SwitchboardError> {
        self.credentials
            .identity()
            .ok_or_else(|| SwitchboardError::ValidationRejected("no signed-in agent".into()))
    }

    fn notify(&self, kind: EventKind, payload: Value) {
        match self.transport.send(kind, payload) {
            Ok(outcome) => debug!(event = %kind, ?outcome, "push notification"),
            Err(e) if e.is_informational() => debug!(event = %kind, "push notification suppressed"),
            Err(e) => warn!(event = %kind, error = %e, "push notification not sent"),
        }
    }

    /// Send an agent message.
    ///
    /// The message shows up immediately as a pending record. On success it is
    /// confirmed with the server id; on failure it keeps a delivery error and
    /// the error is returned.
    pub async fn send_message(
        &self,
        conversation_id: &str,
        text: &str,
    ) -> Result<SendReceipt, SwitchboardError> {
        let agent = self.agent()?;
        let pending = self.queue.push_optimistic(conversation_id, text)?;
        self.deliver(&agent, pending).await
    }

    /// Send a failed message again.
    pub async fn retry_message(&self, correlation_id: &str) -> Result<SendReceipt, SwitchboardError> {
        let agent = self.agent()?;
        let pending = self.queue.retry_message(correlation_id).ok_or_else(|| {
            SwitchboardError::ValidationRejected(format!("no pending message {correlation_id}"))
        })?;
        self.deliver(&agent, pending).await
    }

    async fn deliver(
        &self,
        agent: &AgentIdentity,
        pending: MessageRecord,
    ) -> Result<SendReceipt, SwitchboardError> {
        let Some(correlation_id) = pending.correlation_id.as_deref() else {
            return Err(SwitchboardError::Internal(
                "optimistic message without correlation id".into(),
            ));
        };
        let conversation_id = pending.conversation_id.as_str();

        self.notify(
            EventKind::MessageSend,
            json!({"conversationId": conversation_id, "message": pending.text}),
        );

        let result = match self
            .pull
            .send_message(conversation_id, &agent.id, &pending.text)
            .await
        {
            Ok(receipt) if receipt.success => Ok(receipt),
            Ok(_) => Err(SwitchboardError::pull(None, "send-message was refused")),
            Err(e) => Err(e),
        };

        match result {
            Ok(receipt) => {
                if let Some(server_id) = receipt.message_id.as_deref() {
                    self.queue.confirm_message(correlation_id, server_id);
                }
                info!(conversation_id, message_id = ?receipt.message_id, "message sent");
                self.queue.refresh(conversation_id).await;
                Ok(receipt)
            }
            Err(e) => {
                warn!(conversation_id, error = %e, "message delivery failed");
                self.queue.fail_message(correlation_id, &e.to_string());
                Err(e)
            }
        }
    }

    /// Claim a conversation for the signed-in agent.
    pub async fn assign(&self, conversation_id: &str) -> Result<(), SwitchboardError> {
        let agent = self.agent()?;
        self.notify(
            EventKind::ConversationAssign,
            json!({"conversationId": conversation_id}),
        );
        self.pull.assign(conversation_id, &agent.id).await?;
        info!(conversation_id, agent_id = %agent.id, "conversation assigned");
        self.queue.refresh(conversation_id).await;
        Ok(())
    }

    pub async fn complete(&self, conversation_id: &str) -> Result<(), SwitchboardError> {
        let agent = self.agent()?;
        self.notify(
            EventKind::ConversationComplete,
            json!({"conversationId": conversation_id}),
        );
        self.pull.complete(conversation_id, &agent.id).await?;
        info!(conversation_id, "conversation completed");
        Ok(())
    }

    pub async fn set_priority(&self, conversation_id: &str, priority: i64) -> Result<(), SwitchboardError> {
        self.pull.set_priority(conversation_id, priority).await
    }

    pub async fn set_tags(&self, conversation_id: &str, tags: &[String]) -> Result<(), SwitchboardError> {
        self.pull.set_tags(conversation_id, tags).await
    }

    /// Change the agent's availability and republish the identity.
    pub async fn set_agent_status(&self, status: AgentStatus) -> Result<(), SwitchboardError> {
        let mut agent = self.agent()?;
        self.notify(EventKind::AgentStatus, json!({"status": status}));
        self.pull.update_agent_status(&agent.id, status).await?;
        agent.status = status;
        self.credentials.update_identity(agent).await;
        Ok(())
    }

    pub fn request_queue_update(&self) {
        self.queue.request_queue_update();
    }
}

impl std::fmt::Debug for ConversationGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationGateway")
            .field("transport", &self.transport)
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

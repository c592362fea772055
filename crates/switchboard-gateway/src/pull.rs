// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed pull operations routed through the credential coordinator.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use switchboard_auth::CredentialCoordinator;
use switchboard_core::{
    AgentStatus, PullChannel, PullRequest, RawConversation, RawMessage, SendReceipt,
    SwitchboardError,
};
use tracing::debug;

/// [`PullChannel`] whose every call goes through
/// [`CredentialCoordinator::execute`], so expired credentials are refreshed
/// and retried transparently.
#[derive(Debug, Clone)]
pub struct AuthorizedPullChannel {
    credentials: Arc<CredentialCoordinator>,
}

/// `{success}` acknowledgement returned by the mutating endpoints.
#[derive(Deserialize)]
struct Ack {
    #[serde(default = "yes")]
    success: bool,
}

fn yes() -> bool {
    true
}

impl AuthorizedPullChannel {
    pub fn new(credentials: Arc<CredentialCoordinator>) -> Self {
        Self { credentials }
    }

    async fn fetch<T: DeserializeOwned>(&self, request: PullRequest) -> Result<T, SwitchboardError> {
        let name = request.name();
        let value = self.credentials.execute(request).await?;
        serde_json::from_value(value).map_err(|e| SwitchboardError::Pull {
            status: None,
            message: format!("unexpected {name} payload: {e}"),
            source: Some(Box::new(e)),
        })
    }

    /// Decode an array, skipping entries that do not fit the shape.
    async fn fetch_list<T: DeserializeOwned>(
        &self,
        request: PullRequest,
    ) -> Result<Vec<T>, SwitchboardError> {
        let name = request.name();
        let values: Vec<Value> = self.fetch(request).await?;
        let total = values.len();
        let items: Vec<T> = values
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect();
        if items.len() < total {
            debug!(request = name, skipped = total - items.len(), "skipped undecodable entries");
        }
        Ok(items)
    }

    async fn acknowledge(&self, request: PullRequest) -> Result<(), SwitchboardError> {
        let name = request.name();
        let value = self.credentials.execute(request).await?;
        let ack = match value {
            Value::Null => Ack { success: true },
            other => serde_json::from_value(other).unwrap_or(Ack { success: true }),
        };
        if ack.success {
            Ok(())
        } else {
            Err(SwitchboardError::pull(None, format!("{name} was refused")))
        }
    }
}

#[async_trait]
impl PullChannel for AuthorizedPullChannel {
    async fn queue_snapshot(&self) -> Result<Vec<RawConversation>, SwitchboardError> {
        self.fetch_list(PullRequest::QueueSnapshot).await
    }

    async fn messages(&self, conversation_id: &str) -> Result<Vec<RawMessage>, SwitchboardError> {
        self.fetch_list(PullRequest::Messages {
            conversation_id: conversation_id.to_string(),
        })
        .await
    }

    async fn conversation(
        &self,
        conversation_id: &str,
    ) -> Result<RawConversation, SwitchboardError> {
        self.fetch(PullRequest::Conversation {
            conversation_id: conversation_id.to_string(),
        })
        .await
    }

    async fn completed_conversations(&self) -> Result<Vec<RawConversation>, SwitchboardError> {
        self.fetch_list(PullRequest::CompletedConversations).await
    }

    async fn send_message(
        &self,
        conversation_id: &str,
        agent_id: &str,
        text: &str,
    ) -> Result<SendReceipt, SwitchboardError> {
        self.fetch(PullRequest::SendMessage {
            conversation_id: conversation_id.to_string(),
            agent_id: agent_id.to_string(),
            message: text.to_string(),
        })
        .await
    }

    async fn assign(&self, conversation_id: &str, agent_id: &str) -> Result<(), SwitchboardError> {
        self.acknowledge(PullRequest::Assign {
            conversation_id: conversation_id.to_string(),
            agent_id: agent_id.to_string(),
        })
        .await
    }

    async fn complete(&self, conversation_id: &str, agent_id: &str) -> Result<(), SwitchboardError> {
        self.acknowledge(PullRequest::Complete {
            conversation_id: conversation_id.to_string(),
            agent_id: agent_id.to_string(),
        })
        .await
    }

    async fn set_priority(&self, conversation_id: &str, priority: i64) -> Result<(), SwitchboardError> {
        self.acknowledge(PullRequest::SetPriority {
            conversation_id: conversation_id.to_string(),
            priority,
        })
        .await
    }

    async fn set_tags(&self, conversation_id: &str, tags: &[String]) -> Result<(), SwitchboardError> {
        self.acknowledge(PullRequest::SetTags {
            conversation_id: conversation_id.to_string(),
            tags: tags.to_vec(),
        })
        .await
    }

    async fn update_agent_status(
        &self,
        agent_id: &str,
        status: AgentStatus,
    ) -> Result<(), SwitchboardError> {
        self.acknowledge(PullRequest::UpdateAgentStatus {
            agent_id: agent_id.to_string(),
            status,
        })
        .await
    }
}

// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pull channel requests and response shapes.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::types::{AgentIdentity, AgentStatus};

/// HTTP verb of a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullMethod {
    Get,
    Post,
}

/// Every request the console makes over the pull channel.
#[derive(Debug, Clone)]
pub enum PullRequest {
    QueueSnapshot,
    Messages {
        conversation_id: String,
    },
    Conversation {
        conversation_id: String,
    },
    CompletedConversations,
    SendMessage {
        conversation_id: String,
        agent_id: String,
        message: String,
    },
    Assign {
        conversation_id: String,
        agent_id: String,
    },
    Complete {
        conversation_id: String,
        agent_id: String,
    },
    SetPriority {
        conversation_id: String,
        priority: i64,
    },
    SetTags {
        conversation_id: String,
        tags: Vec<String>,
    },
    UpdateAgentStatus {
        agent_id: String,
        status: AgentStatus,
    },
    Login {
        email: String,
        password: SecretString,
    },
    RefreshCredential,
    CurrentAgent,
    Logout,
}

impl PullRequest {
    /// Stable operation name used in logs and test assertions.
    pub fn name(&self) -> &'static str {
        match self {
            Self::QueueSnapshot => "get-queue-snapshot",
            Self::Messages { .. } => "get-messages",
            Self::Conversation { .. } => "get-conversation",
            Self::CompletedConversations => "get-completed",
            Self::SendMessage { .. } => "send-message",
            Self::Assign { .. } => "assign",
            Self::Complete { .. } => "complete",
            Self::SetPriority { .. } => "set-priority",
            Self::SetTags { .. } => "set-tags",
            Self::UpdateAgentStatus { .. } => "update-agent-status",
            Self::Login { .. } => "login",
            Self::RefreshCredential => "refresh-credential",
            Self::CurrentAgent => "current-agent",
            Self::Logout => "logout",
        }
    }

    pub fn method(&self) -> PullMethod {
        match self {
            Self::QueueSnapshot
            | Self::Messages { .. }
            | Self::Conversation { .. }
            | Self::CompletedConversations
            | Self::CurrentAgent => PullMethod::Get,
            _ => PullMethod::Post,
        }
    }

    /// Path relative to the API base URL, without a leading slash.
    pub fn path(&self) -> String {
        match self {
            Self::QueueSnapshot => "agent/queue".into(),
            Self::Messages { conversation_id } => format!("agent/messages/{conversation_id}"),
            Self::Conversation { conversation_id } => {
                format!("agent/conversation/{conversation_id}")
            }
            Self::CompletedConversations => "agent/completed".into(),
            Self::SendMessage { .. } => "agent/send".into(),
            Self::Assign { .. } => "agent/assign".into(),
            Self::Complete { .. } => "agent/complete".into(),
            Self::SetPriority { .. } => "agent/priority".into(),
            Self::SetTags { .. } => "agent/tags".into(),
            Self::UpdateAgentStatus { .. } => "agents/status".into(),
            Self::Login { .. } => "auth/login".into(),
            Self::RefreshCredential => "auth/refresh".into(),
            Self::CurrentAgent => "auth/me".into(),
            Self::Logout => "auth/logout".into(),
        }
    }

    /// JSON body for POST requests.
    pub fn body(&self) -> Option<Value> {
        match self {
            Self::SendMessage {
                conversation_id,
                agent_id,
                message,
            } => Some(json!({
                "conversationId": conversation_id,
                "agentId": agent_id,
                "message": message,
            })),
            Self::Assign {
                conversation_id,
                agent_id,
            }
            | Self::Complete {
                conversation_id,
                agent_id,
            } => Some(json!({"conversationId": conversation_id, "agentId": agent_id})),
            Self::SetPriority {
                conversation_id,
                priority,
            } => Some(json!({"conversationId": conversation_id, "priority": priority})),
            Self::SetTags {
                conversation_id,
                tags,
            } => Some(json!({"conversationId": conversation_id, "tags": tags})),
            Self::UpdateAgentStatus { agent_id, status } => {
                Some(json!({"agentId": agent_id, "status": status}))
            }
            Self::Login { email, password } => Some(json!({
                "email": email,
                "password": password.expose_secret(),
            })),
            Self::RefreshCredential | Self::Logout => Some(json!({})),
            _ => None,
        }
    }

    /// Requests that must never trigger the refresh-and-retry path.
    pub fn is_session_request(&self) -> bool {
        matches!(
            self,
            Self::Login { .. } | Self::RefreshCredential | Self::Logout
        )
    }
}

/// Body returned by the login and refresh endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionGrant {
    pub token: String,
    #[serde(default, alias = "identity")]
    pub agent: Option<AgentIdentity>,
    /// Lifetime of `token` in seconds.
    #[serde(default, alias = "expires_in")]
    pub expires_in: Option<i64>,
}

/// Body returned by the send endpoint.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SendReceipt {
    pub success: bool,
    pub message_id: Option<String>,
}

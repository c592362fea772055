// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain records and their loosely-typed wire counterparts.
//!
//! `Raw*` types mirror what the server actually sends: every field optional,
//! both identity spellings accepted, timestamps as numbers or RFC 3339 text.
//! The normalized records are what the reconciliation store owns and publishes.

use std::collections::BTreeSet;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumString};

/// Milliseconds since the Unix epoch.
pub type EpochMillis = i64;

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> EpochMillis {
    chrono::Utc::now().timestamp_millis()
}

/// Who authored a message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MessageSender {
    User,
    Bot,
    Agent,
    System,
}

/// Message identity: a local placeholder until the server confirms it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", content = "id", rename_all = "lowercase")]
pub enum MessageId {
    Pending(String),
    Confirmed(String),
}

impl MessageId {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending(id) | Self::Confirmed(id) => id,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }
}

/// A validated message owned by the reconciliation store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub id: MessageId,
    /// Stable local key for optimistic records; survives promotion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    pub conversation_id: String,
    pub sender: MessageSender,
    pub text: String,
    pub timestamp: EpochMillis,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(
        default,
        rename = "attachmentUrl",
        skip_serializing_if = "Option::is_none"
    )]
    pub attachment_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_error: Option<String>,
}

/// A validated conversation owned by the reconciliation store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRecord {
    pub conversation_id: String,
    /// Secondary identifier the server sometimes uses (`id` on the wire).
    #[serde(default, rename = "id", skip_serializing_if = "Option::is_none")]
    pub alias_id: Option<String>,
    /// Channel-level sender address (`from` on the wire).
    #[serde(default, rename = "from", skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    pub start_time: EpochMillis,
    pub priority: i64,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default, rename = "assignedAgent")]
    pub assigned_agent_id: Option<String>,
    #[serde(default)]
    pub messages: Vec<MessageRecord>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl ConversationRecord {
    /// True when `id` names this record under either identity field.
    pub fn answers_to(&self, id: &str) -> bool {
        self.conversation_id == id || self.alias_id.as_deref() == Some(id)
    }

    pub fn has_messages(&self) -> bool {
        !self.messages.is_empty()
    }
}

/// Message as received from the push or pull channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawMessage {
    pub id: Option<String>,
    pub conversation_id: Option<String>,
    pub from: Option<String>,
    pub text: Option<String>,
    #[serde(deserialize_with = "lenient_millis")]
    pub timestamp: Option<EpochMillis>,
    pub agent_id: Option<String>,
    pub attachment_url: Option<String>,
    pub metadata: Option<Map<String, Value>>,
}

/// Conversation as received from the push or pull channel.
///
/// Also accepts the summary shape returned by the queue endpoint
/// (`waitTime`, `messageCount`, no messages).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawConversation {
    pub id: Option<String>,
    pub conversation_id: Option<String>,
    pub from: Option<String>,
    #[serde(rename = "phone_number_id")]
    pub phone_number_id: Option<String>,
    #[serde(deserialize_with = "lenient_millis")]
    pub start_time: Option<EpochMillis>,
    pub priority: Option<i64>,
    pub tags: Option<Vec<String>>,
    pub assigned_agent: Option<String>,
    #[serde(deserialize_with = "lenient_messages")]
    pub messages: Option<Vec<RawMessage>>,
    pub metadata: Option<Map<String, Value>>,
    pub wait_time: Option<i64>,
    pub message_count: Option<u64>,
}

impl RawConversation {
    /// Primary identity, falling back to the alias.
    pub fn identity(&self) -> Option<&str> {
        self.conversation_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.id.as_deref().filter(|s| !s.is_empty()))
    }
}

/// Availability reported by an agent.
///
/// The server speaks Spanish labels; the English names are accepted too.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AgentStatus {
    #[default]
    #[serde(rename = "Desconectado", alias = "offline")]
    #[strum(to_string = "offline", serialize = "Desconectado")]
    Offline,
    #[serde(rename = "En linea", alias = "online")]
    #[strum(to_string = "online", serialize = "En linea")]
    Online,
    #[serde(rename = "Ocupado", alias = "busy")]
    #[strum(to_string = "busy", serialize = "Ocupado")]
    Busy,
    #[serde(rename = "No disponible", alias = "away")]
    #[strum(to_string = "away", serialize = "No disponible")]
    Away,
}

/// Permission tier of an agent.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AgentRole {
    #[default]
    Agent,
    Supervisor,
    Admin,
}

/// The signed-in agent as published by the credential coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentIdentity {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub status: AgentStatus,
    #[serde(default)]
    pub active_conversations: Vec<String>,
    #[serde(default)]
    pub max_concurrent_chats: u32,
    #[serde(default)]
    pub role: AgentRole,
    #[serde(default, deserialize_with = "lenient_millis")]
    pub last_activity: Option<EpochMillis>,
}

/// Push channel lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TimestampRepr {
    Int(i64),
    Float(f64),
    Text(String),
}

/// Accepts epoch milliseconds as an integer, a float, a numeric string, or
/// an RFC 3339 date. Anything else becomes `None`.
pub fn lenient_millis<'de, D>(deserializer: D) -> Result<Option<EpochMillis>, D::Error>
where
    D: Deserializer<'de>,
{
    let repr = Option::<TimestampRepr>::deserialize(deserializer)?;
    Ok(repr.and_then(|r| match r {
        TimestampRepr::Int(v) => Some(v),
        TimestampRepr::Float(v) if v.is_finite() => Some(v as i64),
        TimestampRepr::Float(_) => None,
        TimestampRepr::Text(s) => s.trim().parse::<i64>().ok().or_else(|| {
            chrono::DateTime::parse_from_rfc3339(s.trim())
                .ok()
                .map(|d| d.timestamp_millis())
        }),
    }))
}

/// Keeps the entries of a message array that decode; nulls and garbage are skipped.
fn lenient_messages<'de, D>(deserializer: D) -> Result<Option<Vec<RawMessage>>, D::Error>
where
    D: Deserializer<'de>,
{
    let values = Option::<Vec<Value>>::deserialize(deserializer)?;
    Ok(values.map(|values| {
        values
            .into_iter()
            .filter(|v| v.is_object())
            .filter_map(|v| serde_json::from_value::<RawMessage>(v).ok())
            .collect()
    }))
}

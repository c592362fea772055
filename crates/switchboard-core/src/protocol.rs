// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Push channel wire protocol.
//!
//! Every frame is a JSON envelope:
//! ```json
//! {"type": "message:new", "payload": {"conversationId": "c-1", "message": {}}, "timestamp": 1700000000000}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display, EnumString};

use crate::error::SwitchboardError;
use crate::types::{
    AgentIdentity, EpochMillis, RawConversation, RawMessage, lenient_millis, now_millis,
};

/// Every event name the push channel knows about, in either direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
pub enum EventKind {
    #[strum(serialize = "queue:updated")]
    QueueUpdated,
    #[strum(serialize = "conversation:updated")]
    ConversationUpdated,
    #[strum(serialize = "conversation:assigned")]
    ConversationAssigned,
    #[strum(serialize = "conversation:completed")]
    ConversationCompleted,
    #[strum(serialize = "conversation:new")]
    ConversationNew,
    #[strum(serialize = "message:new")]
    MessageNew,
    #[strum(serialize = "agent:status:updated")]
    AgentStatusUpdated,
    #[strum(serialize = "pong")]
    Pong,
    #[strum(serialize = "ping")]
    Ping,
    #[strum(serialize = "agent:status")]
    AgentStatus,
    #[strum(serialize = "conversation:assign")]
    ConversationAssign,
    #[strum(serialize = "conversation:complete")]
    ConversationComplete,
    #[strum(serialize = "conversation:request")]
    ConversationRequest,
    #[strum(serialize = "queue:request")]
    QueueRequest,
    #[strum(serialize = "message:send")]
    MessageSend,
}

impl EventKind {
    /// True for events the server sends to us.
    pub fn is_inbound(self) -> bool {
        matches!(
            self,
            Self::QueueUpdated
                | Self::ConversationUpdated
                | Self::ConversationAssigned
                | Self::ConversationCompleted
                | Self::ConversationNew
                | Self::MessageNew
                | Self::AgentStatusUpdated
                | Self::Pong
        )
    }
}

/// A single push channel frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, deserialize_with = "lenient_millis")]
    pub timestamp: Option<EpochMillis>,
}

impl Envelope {
    /// Build an outbound frame stamped with the current time.
    pub fn new(kind: EventKind, payload: Value) -> Self {
        Self {
            event_type: kind.to_string(),
            payload,
            timestamp: Some(now_millis()),
        }
    }

    /// The recognized event kind, if any.
    pub fn kind(&self) -> Option<EventKind> {
        self.event_type.parse().ok()
    }

    pub fn encode(&self) -> Result<String, SwitchboardError> {
        serde_json::to_string(self).map_err(|e| SwitchboardError::Transport {
            message: format!("failed to encode {} frame: {e}", self.event_type),
            source: Some(Box::new(e)),
        })
    }

    pub fn decode(text: &str) -> Result<Self, SwitchboardError> {
        let envelope: Self = serde_json::from_str(text).map_err(|e| SwitchboardError::Transport {
            message: format!("malformed frame: {e}"),
            source: Some(Box::new(e)),
        })?;
        if envelope.event_type.is_empty() {
            return Err(SwitchboardError::transport("frame has an empty type"));
        }
        Ok(envelope)
    }
}

/// Decoded inbound event the reconciliation store understands.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    QueueUpdated(Vec<RawConversation>),
    ConversationUpdated(RawConversation),
    ConversationAssigned(RawConversation),
    ConversationCompleted { conversation_id: String },
    ConversationNew(RawConversation),
    MessageNew {
        conversation_id: String,
        message: RawMessage,
    },
    AgentStatusUpdated(AgentIdentity),
    Pong,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompletedPayload {
    conversation_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageNewPayload {
    #[serde(default)]
    conversation_id: Option<String>,
    message: RawMessage,
}

impl TryFrom<&Envelope> for InboundEvent {
    type Error = SwitchboardError;

    fn try_from(envelope: &Envelope) -> Result<Self, Self::Error> {
        let kind = envelope.kind().ok_or_else(|| {
            SwitchboardError::transport(format!("unknown event type `{}`", envelope.event_type))
        })?;
        let payload = envelope.payload.clone();

        let event = match kind {
            EventKind::QueueUpdated => Self::QueueUpdated(decode(kind, payload)?),
            EventKind::ConversationUpdated => Self::ConversationUpdated(decode(kind, payload)?),
            EventKind::ConversationAssigned => {
                Self::ConversationAssigned(decode(kind, unwrap_field(payload, "conversation"))?)
            }
            EventKind::ConversationCompleted => {
                let p: CompletedPayload = decode(kind, payload)?;
                Self::ConversationCompleted {
                    conversation_id: p.conversation_id,
                }
            }
            EventKind::ConversationNew => Self::ConversationNew(decode(kind, payload)?),
            EventKind::MessageNew => {
                let p: MessageNewPayload = decode(kind, payload)?;
                let conversation_id = p
                    .conversation_id
                    .or_else(|| p.message.conversation_id.clone())
                    .ok_or_else(|| {
                        SwitchboardError::transport("message:new without conversationId")
                    })?;
                Self::MessageNew {
                    conversation_id,
                    message: p.message,
                }
            }
            EventKind::AgentStatusUpdated => {
                Self::AgentStatusUpdated(decode(kind, unwrap_field(payload, "agent"))?)
            }
            EventKind::Pong => Self::Pong,
            other => {
                return Err(SwitchboardError::transport(format!(
                    "`{other}` is an outbound event type"
                )));
            }
        };
        Ok(event)
    }
}

/// Accept both `{field: {...}}` and the bare object.
fn unwrap_field(payload: Value, field: &str) -> Value {
    match payload {
        Value::Object(mut map) if map.get(field).is_some_and(Value::is_object) => {
            map.remove(field).unwrap_or(Value::Null)
        }
        other => other,
    }
}

fn decode<T: serde::de::DeserializeOwned>(kind: EventKind, payload: Value) -> Result<T, SwitchboardError> {
    serde_json::from_value(payload).map_err(|e| SwitchboardError::Transport {
        message: format!("invalid `{kind}` payload: {e}"),
        source: Some(Box::new(e)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_kind_names_match_the_wire() {
        assert_eq!(EventKind::AgentStatusUpdated.to_string(), "agent:status:updated");
        assert_eq!("message:send".parse::<EventKind>().unwrap(), EventKind::MessageSend);
        assert!("message:deleted".parse::<EventKind>().is_err());
        assert!(EventKind::Pong.is_inbound());
        assert!(!EventKind::Ping.is_inbound());
    }

    #[test]
    fn envelope_encodes_type_payload_timestamp() {
        let env = Envelope::new(EventKind::QueueRequest, json!({}));
        let text = env.encode().unwrap();
        let v: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(v["type"], "queue:request");
        assert!(v["timestamp"].is_i64());
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(Envelope::decode("not json").is_err());
        assert!(Envelope::decode(r#"{"payload": {}}"#).is_err());
        assert!(Envelope::decode(r#"{"type": ""}"#).is_err());
    }

    #[test]
    fn inbound_assigned_unwraps_conversation() {
        let env = Envelope::decode(
            r#"{"type":"conversation:assigned","payload":{"conversation":{"conversationId":"c-1","assignedAgent":"a-1"}}}"#,
        )
        .unwrap();
        match InboundEvent::try_from(&env).unwrap() {
            InboundEvent::ConversationAssigned(raw) => {
                assert_eq!(raw.identity(), Some("c-1"));
                assert_eq!(raw.assigned_agent.as_deref(), Some("a-1"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn inbound_message_new_falls_back_to_message_conversation_id() {
        let env = Envelope {
            event_type: "message:new".into(),
            payload: json!({"message": {"id": "m-1", "conversationId": "c-3", "from": "user", "text": "hola"}}),
            timestamp: None,
        };
        match InboundEvent::try_from(&env).unwrap() {
            InboundEvent::MessageNew { conversation_id, message } => {
                assert_eq!(conversation_id, "c-3");
                assert_eq!(message.text.as_deref(), Some("hola"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn outbound_kinds_are_not_inbound_events() {
        let env = Envelope::new(EventKind::Ping, Value::Null);
        assert!(InboundEvent::try_from(&env).is_err());
    }

    #[test]
    fn agent_status_updated_accepts_wrapped_agent() {
        let env = Envelope {
            event_type: "agent:status:updated".into(),
            payload: json!({"agent": {"id": "a-1", "status": "Ocupado"}}),
            timestamp: Some(1),
        };
        match InboundEvent::try_from(&env).unwrap() {
            InboundEvent::AgentStatusUpdated(agent) => assert_eq!(agent.id, "a-1"),
            other => panic!("unexpected {other:?}"),
        }
    }
}

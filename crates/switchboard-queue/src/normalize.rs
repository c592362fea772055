// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ingress normalization: wire shapes in, validated records out.
//!
//! Every path into the store (snapshot, push, pull history, optimistic echo)
//! goes through here, so an invalid message can never reach published state.

use std::str::FromStr;

use switchboard_core::{
    ConversationRecord, EpochMillis, MessageId, MessageRecord, MessageSender, RawConversation,
    RawMessage,
};
use tracing::debug;

/// A normalized conversation plus which optional fields the sender actually set.
///
/// Merges only overwrite fields that were provided, so defaults filled in here
/// never clobber what the store already knows.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub record: ConversationRecord,
    pub start_provided: bool,
    pub priority_provided: bool,
    pub tags_provided: bool,
}

impl Candidate {
    /// A record with neither messages nor an origin is never admitted.
    pub fn is_admissible(&self) -> bool {
        is_admissible(&self.record)
    }
}

pub fn is_admissible(record: &ConversationRecord) -> bool {
    record.has_messages() || record.origin.is_some()
}

/// Normalize a conversation. Returns `None` when it has no usable identity.
pub fn conversation(raw: RawConversation, now: EpochMillis, default_priority: i64) -> Option<Candidate> {
    let Some(conversation_id) = raw.identity().map(str::to_owned) else {
        debug!("dropping conversation without identity");
        return None;
    };
    let alias_id = raw
        .id
        .filter(|id| !id.is_empty() && *id != conversation_id);
    let origin = raw.from.filter(|s| !s.trim().is_empty());

    let start_provided = raw.start_time.is_some_and(|t| t > 0);
    let start_time = raw.start_time.filter(|t| *t > 0).unwrap_or(now);

    // Zero is treated as unset, same as a missing value.
    let priority_provided = raw.priority.is_some_and(|p| p != 0);
    let priority = raw.priority.filter(|p| *p != 0).unwrap_or(default_priority);

    let tags_provided = raw.tags.is_some();
    let tags = raw.tags.unwrap_or_default().into_iter().collect();

    let messages = messages(
        raw.messages.unwrap_or_default(),
        &conversation_id,
        start_time,
    );

    let mut metadata = raw.metadata.unwrap_or_default();
    if let Some(count) = raw.message_count {
        metadata.entry("messageCount").or_insert(count.into());
    }
    if let Some(wait) = raw.wait_time {
        metadata.entry("waitTime").or_insert(wait.into());
    }

    Some(Candidate {
        record: ConversationRecord {
            conversation_id,
            alias_id,
            origin,
            start_time,
            priority,
            tags,
            assigned_agent_id: raw.assigned_agent.filter(|a| !a.is_empty()),
            messages,
            metadata,
        },
        start_provided,
        priority_provided,
        tags_provided,
    })
}

/// Validate and sort a batch of messages, dropping invalid ones.
pub fn messages(
    raw: Vec<RawMessage>,
    conversation_id: &str,
    fallback_timestamp: EpochMillis,
) -> Vec<MessageRecord> {
    let total = raw.len();
    let mut out: Vec<MessageRecord> = raw
        .into_iter()
        .filter_map(|m| message(m, conversation_id, fallback_timestamp))
        .collect();
    if out.len() < total {
        debug!(conversation_id, dropped = total - out.len(), "dropped invalid messages");
    }
    out.sort_by_key(|m| m.timestamp);
    dedup_by_id(&mut out);
    out
}

/// Validate one message. `None` when the text is blank or the sender is unknown.
pub fn message(
    raw: RawMessage,
    conversation_id: &str,
    fallback_timestamp: EpochMillis,
) -> Option<MessageRecord> {
    let text = raw.text.filter(|t| !t.trim().is_empty())?;
    let sender = raw
        .from
        .as_deref()
        .and_then(|s| MessageSender::from_str(&s.to_ascii_lowercase()).ok())?;
    let conversation_id = raw
        .conversation_id
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| conversation_id.to_owned());
    let timestamp = raw.timestamp.unwrap_or(fallback_timestamp);
    // Stable synthetic id so the same id-less message dedups across snapshots.
    let id = raw
        .id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| format!("{conversation_id}-{timestamp}-{sender}"));

    Some(MessageRecord {
        id: MessageId::Confirmed(id),
        correlation_id: None,
        conversation_id,
        sender,
        text,
        timestamp,
        agent_id: raw.agent_id.filter(|a| !a.is_empty()),
        attachment_ref: raw.attachment_url.filter(|u| !u.is_empty()),
        delivery_error: None,
    })
}

/// Re-validate a record handed in from outside the store.
pub fn sanitize(mut record: ConversationRecord) -> ConversationRecord {
    record
        .messages
        .retain(|m| !m.text.trim().is_empty());
    record.messages.sort_by_key(|m| m.timestamp);
    record
}

fn dedup_by_id(messages: &mut Vec<MessageRecord>) {
    let mut seen = std::collections::HashSet::new();
    messages.retain(|m| seen.insert(m.id.as_str().to_owned()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: serde_json::Value) -> RawConversation {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn identity_falls_back_to_alias_field() {
        let c = conversation(raw(json!({"id": "c-1", "from": "+1"})), 5, 2).unwrap();
        assert_eq!(c.record.conversation_id, "c-1");
        assert_eq!(c.record.alias_id, None);

        let c = conversation(raw(json!({"id": "x-9", "conversationId": "c-1", "from": "+1"})), 5, 2)
            .unwrap();
        assert_eq!(c.record.alias_id.as_deref(), Some("x-9"));

        assert!(conversation(raw(json!({"from": "+1"})), 5, 2).is_none());
    }

    #[test]
    fn defaults_are_filled_and_flagged() {
        let c = conversation(raw(json!({"conversationId": "c-1", "priority": 0})), 1_000, 2).unwrap();
        assert_eq!(c.record.start_time, 1_000);
        assert_eq!(c.record.priority, 2);
        assert!(!c.start_provided);
        assert!(!c.priority_provided);
        assert!(!c.tags_provided);
        assert!(!c.is_admissible());
    }

    #[test]
    fn invalid_messages_are_dropped_and_rest_sorted() {
        let c = conversation(
            raw(json!({
                "conversationId": "c-1",
                "messages": [
                    {"id": "m2", "from": "user", "text": "second", "timestamp": 20},
                    {"id": "m0", "from": "user", "text": "", "timestamp": 5},
                    {"id": "m3", "text": "no sender", "timestamp": 30},
                    {"id": "m1", "from": "bot", "text": "first", "timestamp": 10},
                    {"id": "m4", "from": "martian", "text": "who", "timestamp": 40}
                ]
            })),
            0,
            2,
        )
        .unwrap();
        let ids: Vec<_> = c.record.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2"]);
        assert!(c.is_admissible());
    }

    #[test]
    fn missing_message_id_is_deterministic() {
        let raw = || RawMessage {
            from: Some("user".into()),
            text: Some("hola".into()),
            timestamp: Some(42),
            ..RawMessage::default()
        };
        let a = message(raw(), "c-1", 0).unwrap();
        let b = message(raw(), "c-1", 0).unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.id.as_str(), "c-1-42-user");
    }

    #[test]
    fn summary_fields_land_in_metadata() {
        let c = conversation(
            raw(json!({"id": "c-1", "from": "+1", "waitTime": 30, "messageCount": 4})),
            0,
            2,
        )
        .unwrap();
        assert_eq!(c.record.metadata["messageCount"], 4);
        assert_eq!(c.record.metadata["waitTime"], 30);
    }
}

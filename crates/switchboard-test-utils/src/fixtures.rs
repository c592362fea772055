// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Builders for wire-shaped test data.

use serde_json::{Value, json};
use switchboard_core::{AgentIdentity, RawConversation, RawMessage};

pub fn agent(id: &str) -> AgentIdentity {
    serde_json::from_value(json!({
        "id": id,
        "name": format!("Agent {id}"),
        "email": format!("{id}@example.com"),
        "status": "En linea",
        "activeConversations": [],
        "maxConcurrentChats": 5,
        "role": "agent",
        "lastActivity": 0
    }))
    .expect("agent fixture")
}

pub fn message_json(id: &str, conversation_id: &str, from: &str, text: &str, ts: i64) -> Value {
    json!({
        "id": id,
        "conversationId": conversation_id,
        "from": from,
        "text": text,
        "timestamp": ts
    })
}

pub fn message(id: &str, conversation_id: &str, from: &str, text: &str, ts: i64) -> RawMessage {
    serde_json::from_value(message_json(id, conversation_id, from, text, ts))
        .expect("message fixture")
}

/// A conversation with `count` user messages, one second apart from `start`.
pub fn conversation_json(id: &str, origin: Option<&str>, start: i64, count: usize) -> Value {
    let messages: Vec<Value> = (0..count)
        .map(|i| {
            message_json(
                &format!("{id}-m{i}"),
                id,
                "user",
                &format!("message {i}"),
                start + (i as i64) * 1000,
            )
        })
        .collect();
    let mut value = json!({
        "conversationId": id,
        "startTime": start,
        "priority": 2,
        "tags": [],
        "assignedAgent": null,
        "messages": messages,
    });
    if let Some(origin) = origin {
        value["from"] = json!(origin);
    }
    value
}

pub fn conversation(id: &str, origin: Option<&str>, start: i64, count: usize) -> RawConversation {
    serde_json::from_value(conversation_json(id, origin, start, count))
        .expect("conversation fixture")
}

/// Same as [`conversation`] but assigned to `agent_id`.
pub fn assigned(id: &str, origin: Option<&str>, start: i64, count: usize, agent_id: &str) -> RawConversation {
    let mut raw = conversation(id, origin, start, count);
    raw.assigned_agent = Some(agent_id.to_string());
    raw
}

// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Switchboard sync core.
//!
//! This crate provides the error taxonomy, domain records, push channel
//! protocol, pull request catalogue and the adapter traits shared by every
//! other crate in the workspace.

pub mod error;
pub mod protocol;
pub mod request;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::{Result, SwitchboardError};
pub use protocol::{Envelope, EventKind, InboundEvent};
pub use request::{PullMethod, PullRequest, SendReceipt, SessionGrant};
pub use types::{
    AgentIdentity, AgentRole, AgentStatus, ConnectionState, ConversationRecord, EpochMillis,
    MessageId, MessageRecord, MessageSender, RawConversation, RawMessage, now_millis,
};

pub use traits::{
    AuthorizedRequest, CredentialStore, PullChannel, PushConnector, PushSocket,
    RequestDispatcher,
};

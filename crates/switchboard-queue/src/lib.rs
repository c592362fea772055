// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue reconciliation for the Switchboard sync core.
//!
//! Snapshots, push events and pull results all land in one canonical queue
//! plus an active-conversation projection. Conversations that reach us under
//! different identifiers are merged, duplicates are swept periodically, and
//! agent messages are tracked optimistically until the server confirms them.

pub mod matcher;
pub mod normalize;
pub mod service;
pub mod settings;
pub mod store;

pub use matcher::{MatchKind, MatchPolicy};
pub use service::ReconciliationService;
pub use settings::QueueSettings;
pub use store::{ConversationOutcome, MessageOutcome, QueueStore, SnapshotReport, UpdateKind};

// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation gateway for the Switchboard sync core.
//!
//! [`ConversationGateway`] turns agent actions into a push notification plus
//! an authoritative pull call. [`AuthorizedPullChannel`] provides the typed
//! pull operations on top of the credential coordinator, and
//! [`HttpDispatcher`] is the HTTP transport underneath it.

pub mod gateway;
pub mod http;
pub mod pull;

pub use gateway::ConversationGateway;
pub use http::HttpDispatcher;
pub use pull::AuthorizedPullChannel;

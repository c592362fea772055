// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Switchboard.
//!
//! Provides mock adapters so the sync core can be exercised deterministically
//! without a live console server.
//!
//! # Components
//!
//! - [`MockDispatcher`] - pull channel with a token model (valid, expired, revoked)
//! - [`MockConnector`] - push channel whose server side is driven by the test
//! - [`MockPullChannel`] - scripted pull channel without a credential layer
//! - [`fixtures`] - conversation, message and agent builders

pub mod fixtures;
pub mod mock_connector;
pub mod mock_dispatcher;
pub mod mock_pull;

pub use mock_connector::{MockConnector, MockServer};
pub use mock_dispatcher::{MockDispatcher, RecordedRequest};
pub use mock_pull::MockPullChannel;

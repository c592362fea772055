// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Seams between the sync core and the outside world.
//!
//! Production implementations live in the gateway and transport crates;
//! deterministic mocks live in `switchboard-test-utils`.

pub mod connector;
pub mod dispatcher;
pub mod pull;
pub mod store;

pub use connector::{PushConnector, PushSocket};
pub use dispatcher::{AuthorizedRequest, RequestDispatcher};
pub use pull::PullChannel;
pub use store::CredentialStore;

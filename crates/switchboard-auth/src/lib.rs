// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Credential lifecycle for the Switchboard sync core.
//!
//! [`CredentialCoordinator`] gates every pull request: it attaches the current
//! credential, and when the server answers that the credential expired it runs
//! exactly one refresh no matter how many requests failed concurrently, then
//! retries each of them once with the new credential.

pub mod coordinator;
pub mod credential;
pub mod store;

pub use coordinator::{CredentialCoordinator, SessionEvent};
pub use credential::Credential;
pub use store::{FileCredentialStore, MemoryCredentialStore};

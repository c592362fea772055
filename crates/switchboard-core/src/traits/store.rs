// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Credential persistence trait.

use async_trait::async_trait;

use crate::error::SwitchboardError;

/// Stores opaque named blobs. The coordinator serializes its session into one.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, name: &str) -> Result<Option<String>, SwitchboardError>;

    async fn set(&self, name: &str, blob: &str) -> Result<(), SwitchboardError>;

    async fn clear(&self, name: &str) -> Result<(), SwitchboardError>;
}

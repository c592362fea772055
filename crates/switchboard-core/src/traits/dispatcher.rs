// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outer request dispatcher wrapped by the credential coordinator.

use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::Value;

use crate::error::SwitchboardError;
use crate::request::PullRequest;

/// A pull request paired with the credential that was current when it was attached.
#[derive(Clone)]
pub struct AuthorizedRequest {
    pub request: PullRequest,
    pub credential: Option<SecretString>,
}

impl AuthorizedRequest {
    pub fn anonymous(request: PullRequest) -> Self {
        Self {
            request,
            credential: None,
        }
    }
}

impl std::fmt::Debug for AuthorizedRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizedRequest")
            .field("request", &self.request.name())
            .field("credential", &self.credential.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

/// Sends a request over the pull channel and returns the decoded JSON body.
///
/// Implementations map a 401 carrying `expired: true` to
/// [`SwitchboardError::CredentialExpired`] and any other 401 to
/// [`SwitchboardError::CredentialInvalid`].
#[async_trait]
pub trait RequestDispatcher: Send + Sync {
    async fn dispatch(&self, request: &AuthorizedRequest) -> Result<Value, SwitchboardError>;
}

// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use switchboard_core::{AgentIdentity, SessionGrant};

/// A bearer token and, when the server told us, when it stops working.
pub struct Credential {
    pub token: SecretString,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn new(token: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            token: SecretString::from(token.into()),
            expires_at,
        }
    }

    pub fn from_grant(grant: &SessionGrant, now: DateTime<Utc>) -> Self {
        let expires_at = grant
            .expires_in
            .filter(|secs| *secs > 0)
            .map(|secs| now + Duration::seconds(secs));
        Self::new(grant.token.clone(), expires_at)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    pub(crate) fn same_token(&self, other: &SecretString) -> bool {
        self.token.expose_secret() == other.expose_secret()
    }
}

impl Clone for Credential {
    fn clone(&self) -> Self {
        Self {
            token: self.token.clone(),
            expires_at: self.expires_at,
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"[redacted]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// On-disk form of a session.
#[derive(Serialize, Deserialize)]
pub(crate) struct StoredSession {
    pub token: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub agent: Option<AgentIdentity>,
}

impl StoredSession {
    pub fn new(credential: &Credential, agent: Option<AgentIdentity>) -> Self {
        Self {
            token: credential.token.expose_secret().to_string(),
            expires_at: credential.expires_at,
            agent,
        }
    }

    pub fn into_parts(self) -> (Credential, Option<AgentIdentity>) {
        (Credential::new(self.token, self.expires_at), self.agent)
    }
}

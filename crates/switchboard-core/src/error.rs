// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Switchboard sync core.

use thiserror::Error;

/// The primary error type used across the sync core and its adapter traits.
#[derive(Debug, Error)]
pub enum SwitchboardError {
    /// Push channel failures (connect refused, socket closed, frame encoding).
    #[error("transport error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An operation needed a credential and none is stored.
    #[error("no credential available")]
    NoCredential,

    /// The server rejected the credential as expired. Recoverable via refresh.
    #[error("credential expired")]
    CredentialExpired,

    /// The server rejected the credential outright. Forces logout.
    #[error("credential rejected: {0}")]
    CredentialInvalid(String),

    /// The shared refresh call failed; every waiter receives this.
    #[error("credential refresh failed: {0}")]
    RefreshFailed(String),

    /// Locally rejected before anything was sent.
    #[error("rejected: {0}")]
    ValidationRejected(String),

    /// A send was swallowed by the per-conversation debounce window.
    #[error("duplicate send suppressed for conversation {0}")]
    DuplicateSuppressed(String),

    /// Pull channel failures (HTTP status, body decoding, connection).
    #[error("pull request failed: {message}")]
    Pull {
        status: Option<u16>,
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration errors surfaced at runtime (bad URL, invalid header value).
    #[error("configuration error: {0}")]
    Config(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SwitchboardError {
    /// Shorthand for a transport error without an underlying cause.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a pull error without an underlying cause.
    pub fn pull(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Pull {
            status,
            message: message.into(),
            source: None,
        }
    }

    /// True for the 401-equivalent variants the credential coordinator reacts to.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::CredentialExpired | Self::CredentialInvalid(_))
    }

    /// True for outcomes that are expected local decisions rather than faults.
    pub fn is_informational(&self) -> bool {
        matches!(self, Self::DuplicateSuppressed(_))
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T, E = SwitchboardError> = std::result::Result<T, E>;

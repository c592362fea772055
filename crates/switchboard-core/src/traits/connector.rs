// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Push channel connector trait.

use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;
use futures_sink::Sink;

use crate::error::SwitchboardError;

/// Outgoing half of an open push connection. Accepts encoded text frames.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = SwitchboardError> + Send>>;

/// Incoming half of an open push connection. Ends when the peer closes.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, SwitchboardError>> + Send>>;

/// An open push connection split into its two halves.
pub struct PushSocket {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl std::fmt::Debug for PushSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushSocket").finish_non_exhaustive()
    }
}

/// Opens push connections. The URL already carries the credential.
#[async_trait]
pub trait PushConnector: Send + Sync {
    async fn open(&self, url: &str) -> Result<PushSocket, SwitchboardError>;
}

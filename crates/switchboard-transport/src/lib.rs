// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Push channel for the Switchboard sync core.
//!
//! [`TransportManager`] owns the socket: it connects with the current
//! credential, keeps the link alive with ping/pong, reconnects with linear
//! backoff, and buffers outbound frames while disconnected so nothing an
//! agent sends is lost across a reconnect.

mod debounce;
pub mod manager;
pub mod settings;
pub mod ws;

pub use manager::{SendOutcome, TransportManager};
pub use settings::TransportSettings;
pub use ws::WsConnector;

// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed event bus and current-value cells.
//!
//! [`EventBus`] fans events out to every live subscriber in emission order.
//! [`StateCell`] holds the latest value of something (connection state,
//! queue, active conversation) and lets observers wait for changes.

mod cell;
mod event_bus;

pub use cell::StateCell;
pub use event_bus::{EventBus, Subscription};

// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::time::Duration;

use switchboard_config::SwitchboardConfig;

/// Resolved push channel parameters.
#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub ws_url: String,
    pub heartbeat_interval: Duration,
    pub pong_timeout: Duration,
    pub reconnect_base: Duration,
    pub max_reconnect_attempts: u32,
    pub reconnect_delay: Duration,
    pub send_debounce: Duration,
    pub debounce_prune_threshold: usize,
    pub connect_timeout: Duration,
}

impl TransportSettings {
    pub fn from_config(config: &SwitchboardConfig) -> Self {
        let t = &config.transport;
        Self {
            ws_url: config.server.ws_url.clone(),
            heartbeat_interval: Duration::from_secs(t.heartbeat_interval_secs),
            pong_timeout: Duration::from_secs(t.pong_timeout_secs),
            reconnect_base: Duration::from_secs(t.reconnect_base_secs),
            max_reconnect_attempts: t.max_reconnect_attempts,
            reconnect_delay: Duration::from_millis(t.reconnect_delay_ms),
            send_debounce: Duration::from_millis(t.send_debounce_ms),
            debounce_prune_threshold: t.debounce_prune_threshold,
            connect_timeout: Duration::from_secs(t.connect_timeout_secs),
        }
    }

    /// Delay before automatic reconnect attempt `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.reconnect_base * attempt
    }
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self::from_config(&SwitchboardConfig::default())
    }
}

// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SwitchboardConfig {
    /// Process-level settings.
    #[serde(default)]
    pub console: ConsoleConfig,

    /// Server endpoints.
    #[serde(default)]
    pub server: ServerConfig,

    /// Push channel behavior.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Queue reconciliation tuning.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Session persistence.
    #[serde(default)]
    pub credentials: CredentialsConfig,
}

/// Process-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConsoleConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Server endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Base URL of the pull (HTTP) API.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// URL of the push (WebSocket) endpoint. The token is appended as a query parameter.
    #[serde(default = "default_ws_url")]
    pub ws_url: String,

    /// Per-request timeout for pull calls.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            ws_url: default_ws_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_api_url() -> String {
    "http://localhost:3000/api".to_string()
}

fn default_ws_url() -> String {
    "ws://localhost:3000/ws".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Push channel configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TransportConfig {
    /// Seconds between outbound pings.
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,

    /// Silence (no pong) tolerated before the link is declared dead.
    #[serde(default = "default_pong_timeout_secs")]
    pub pong_timeout_secs: u64,

    /// Reconnect delay unit; attempt N waits N times this.
    #[serde(default = "default_reconnect_base_secs")]
    pub reconnect_base_secs: u64,

    /// Automatic reconnect attempts before giving up.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Pause between tearing down and re-opening on a forced reconnect.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Per-conversation window in which a second `message:send` is suppressed.
    #[serde(default = "default_send_debounce_ms")]
    pub send_debounce_ms: u64,

    /// Debounce cache size that triggers pruning of stale entries.
    #[serde(default = "default_debounce_prune_threshold")]
    pub debounce_prune_threshold: usize,

    /// Upper bound on a single connection attempt.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            pong_timeout_secs: default_pong_timeout_secs(),
            reconnect_base_secs: default_reconnect_base_secs(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            send_debounce_ms: default_send_debounce_ms(),
            debounce_prune_threshold: default_debounce_prune_threshold(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

fn default_heartbeat_interval_secs() -> u64 {
    10
}

fn default_pong_timeout_secs() -> u64 {
    15
}

fn default_reconnect_base_secs() -> u64 {
    5
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_reconnect_delay_ms() -> u64 {
    500
}

fn default_send_debounce_ms() -> u64 {
    1000
}

fn default_debounce_prune_threshold() -> usize {
    100
}

fn default_connect_timeout_secs() -> u64 {
    10
}

/// Queue reconciliation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    /// Seconds between periodic dedup passes.
    #[serde(default = "default_dedup_interval_secs")]
    pub dedup_interval_secs: u64,

    /// Delay after a snapshot merge before the follow-up dedup pass.
    #[serde(default = "default_dedup_after_snapshot_ms")]
    pub dedup_after_snapshot_ms: u64,

    /// Size of the recent message id cache before it is cleared.
    #[serde(default = "default_recent_message_capacity")]
    pub recent_message_capacity: usize,

    /// Origin matches only merge when message counts differ by at most this.
    #[serde(default = "default_origin_message_delta")]
    pub origin_message_delta: usize,

    /// ...or when start times are within this many milliseconds.
    #[serde(default = "default_origin_start_window_ms")]
    pub origin_start_window_ms: i64,

    /// Priority assigned when the server omits one.
    #[serde(default = "default_priority")]
    pub default_priority: i64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            dedup_interval_secs: default_dedup_interval_secs(),
            dedup_after_snapshot_ms: default_dedup_after_snapshot_ms(),
            recent_message_capacity: default_recent_message_capacity(),
            origin_message_delta: default_origin_message_delta(),
            origin_start_window_ms: default_origin_start_window_ms(),
            default_priority: default_priority(),
        }
    }
}

fn default_dedup_interval_secs() -> u64 {
    30
}

fn default_dedup_after_snapshot_ms() -> u64 {
    500
}

fn default_recent_message_capacity() -> usize {
    100
}

fn default_origin_message_delta() -> usize {
    3
}

fn default_origin_start_window_ms() -> i64 {
    60_000
}

fn default_priority() -> i64 {
    2
}

/// Session persistence configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialsConfig {
    /// Directory holding the session blob.
    #[serde(default = "default_store_path")]
    pub store_path: String,

    /// Blob name; the file is `<store_path>/<blob_name>.json`.
    #[serde(default = "default_blob_name")]
    pub blob_name: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            blob_name: default_blob_name(),
        }
    }
}

fn default_store_path() -> String {
    dirs::data_local_dir()
        .map(|d| d.join("switchboard").display().to_string())
        .unwrap_or_else(|| ".switchboard".to_string())
}

fn default_blob_name() -> String {
    "session".to_string()
}

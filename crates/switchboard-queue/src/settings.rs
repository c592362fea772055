// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::time::Duration;

use switchboard_config::SwitchboardConfig;

use crate::matcher::MatchPolicy;

/// Resolved reconciliation parameters.
#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub dedup_interval: Duration,
    pub dedup_after_snapshot: Duration,
    pub recent_message_capacity: usize,
    pub match_policy: MatchPolicy,
    pub default_priority: i64,
}

impl QueueSettings {
    pub fn from_config(config: &SwitchboardConfig) -> Self {
        let q = &config.queue;
        Self {
            dedup_interval: Duration::from_secs(q.dedup_interval_secs),
            dedup_after_snapshot: Duration::from_millis(q.dedup_after_snapshot_ms),
            recent_message_capacity: q.recent_message_capacity,
            match_policy: MatchPolicy {
                message_delta: q.origin_message_delta,
                start_window_ms: q.origin_start_window_ms,
            },
            default_priority: q.default_priority,
        }
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self::from_config(&SwitchboardConfig::default())
    }
}

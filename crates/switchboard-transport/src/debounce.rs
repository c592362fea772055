// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-conversation send debounce.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

/// Remembers when each conversation last sent; refuses a repeat inside the window.
#[derive(Debug)]
pub(crate) struct SendDebounce {
    window: Duration,
    prune_threshold: usize,
    last_sent: HashMap<String, Instant>,
}

impl SendDebounce {
    pub fn new(window: Duration, prune_threshold: usize) -> Self {
        Self {
            window,
            prune_threshold,
            last_sent: HashMap::new(),
        }
    }

    /// Record a send for `conversation_id`. False if it falls inside the window.
    pub fn admit(&mut self, conversation_id: &str, now: Instant) -> bool {
        if let Some(last) = self.last_sent.get(conversation_id)
            && now.duration_since(*last) < self.window
        {
            return false;
        }
        self.last_sent.insert(conversation_id.to_string(), now);

        if self.last_sent.len() > self.prune_threshold {
            let horizon = self.window * 10;
            self.last_sent
                .retain(|_, at| now.duration_since(*at) < horizon);
        }
        true
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.last_sent.len()
    }
}

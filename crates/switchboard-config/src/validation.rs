// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.

use crate::diagnostic::ConfigError;
use crate::model::SwitchboardConfig;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every failure instead of stopping at the first.
pub fn validate_config(config: &SwitchboardConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if !LOG_LEVELS.contains(&config.console.log_level.as_str()) {
        errors.push(validation(format!(
            "console.log_level must be one of {}, got `{}`",
            LOG_LEVELS.join(", "),
            config.console.log_level
        )));
    }

    check_url(&mut errors, "server.api_url", &config.server.api_url, &["http", "https"]);
    check_url(&mut errors, "server.ws_url", &config.server.ws_url, &["ws", "wss"]);

    let positive = [
        ("server.request_timeout_secs", config.server.request_timeout_secs),
        ("transport.heartbeat_interval_secs", config.transport.heartbeat_interval_secs),
        ("transport.pong_timeout_secs", config.transport.pong_timeout_secs),
        ("transport.reconnect_base_secs", config.transport.reconnect_base_secs),
        ("transport.connect_timeout_secs", config.transport.connect_timeout_secs),
        ("queue.dedup_interval_secs", config.queue.dedup_interval_secs),
    ];
    for (key, value) in positive {
        if value == 0 {
            errors.push(validation(format!("{key} must be greater than zero")));
        }
    }

    if config.transport.pong_timeout_secs <= config.transport.heartbeat_interval_secs {
        errors.push(validation(format!(
            "transport.pong_timeout_secs ({}) must exceed transport.heartbeat_interval_secs ({})",
            config.transport.pong_timeout_secs, config.transport.heartbeat_interval_secs
        )));
    }

    if config.transport.max_reconnect_attempts == 0 {
        errors.push(validation(
            "transport.max_reconnect_attempts must be at least 1".to_string(),
        ));
    }

    if config.transport.debounce_prune_threshold == 0 {
        errors.push(validation(
            "transport.debounce_prune_threshold must be at least 1".to_string(),
        ));
    }

    if config.queue.recent_message_capacity == 0 {
        errors.push(validation(
            "queue.recent_message_capacity must be at least 1".to_string(),
        ));
    }

    if config.queue.origin_start_window_ms < 0 {
        errors.push(validation(format!(
            "queue.origin_start_window_ms must be non-negative, got {}",
            config.queue.origin_start_window_ms
        )));
    }

    if config.credentials.store_path.trim().is_empty() {
        errors.push(validation("credentials.store_path must not be empty".to_string()));
    }

    let blob = config.credentials.blob_name.trim();
    if blob.is_empty() || blob.contains(['/', '\\']) {
        errors.push(validation(format!(
            "credentials.blob_name must be a plain file stem, got `{}`",
            config.credentials.blob_name
        )));
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

fn validation(message: String) -> ConfigError {
    ConfigError::Validation { message }
}

fn check_url(errors: &mut Vec<ConfigError>, key: &str, value: &str, schemes: &[&str]) {
    match url::Url::parse(value) {
        Ok(parsed) if schemes.contains(&parsed.scheme()) => {}
        Ok(parsed) => errors.push(validation(format!(
            "{key} must use {} but uses `{}`",
            schemes.join(" or "),
            parsed.scheme()
        ))),
        Err(e) => errors.push(validation(format!("{key} `{value}` is not a valid URL: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&SwitchboardConfig::default()).is_ok());
    }

    #[test]
    fn collects_every_failure() {
        let mut config = SwitchboardConfig::default();
        config.server.ws_url = "http://wrong-scheme".into();
        config.transport.pong_timeout_secs = 5;
        config.transport.max_reconnect_attempts = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3, "{errors:?}");
    }

    #[test]
    fn rejects_unparseable_api_url() {
        let mut config = SwitchboardConfig::default();
        config.server.api_url = "not a url".into();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors[0].to_string().contains("server.api_url"));
    }
}

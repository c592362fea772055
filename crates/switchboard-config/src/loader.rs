// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered config loading with Figment.
//!
//! `./switchboard.toml` > `~/.config/switchboard/switchboard.toml` >
//! `/etc/switchboard/switchboard.toml`, then `SWITCHBOARD_*` env vars on top.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::SwitchboardConfig;

const SYSTEM_CONFIG: &str = "/etc/switchboard/switchboard.toml";
const LOCAL_CONFIG: &str = "switchboard.toml";

/// Config files in merge order, lowest precedence first.
pub(crate) fn config_files() -> Vec<PathBuf> {
    let mut files = vec![PathBuf::from(SYSTEM_CONFIG)];
    files.extend(dirs::config_dir().map(|d| d.join("switchboard/switchboard.toml")));
    files.push(PathBuf::from(LOCAL_CONFIG));
    files
}

/// Load configuration from the standard hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/switchboard/switchboard.toml`
/// 3. `~/.config/switchboard/switchboard.toml`
/// 4. `./switchboard.toml`
/// 5. `SWITCHBOARD_*` environment variables
pub fn load_config() -> Result<SwitchboardConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no files, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<SwitchboardConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(SwitchboardConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<SwitchboardConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(SwitchboardConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// The Figment used by [`load_config`], before extraction.
pub fn build_figment() -> Figment {
    config_files()
        .into_iter()
        .fold(
            Figment::new().merge(Serialized::defaults(SwitchboardConfig::default())),
            |figment, path| figment.merge(Toml::file(path)),
        )
        .merge(env_provider())
}

/// Env provider with explicit section mapping.
///
/// `Env::split("_")` would turn `SWITCHBOARD_TRANSPORT_PONG_TIMEOUT_SECS` into
/// `transport.pong.timeout.secs`; only the first segment names a section.
/// Variables outside the config sections (`SWITCHBOARD_PASSWORD`) are ignored.
pub(crate) fn env_provider() -> Env {
    Env::prefixed("SWITCHBOARD_")
        .filter(|key| map_env_key(key.as_str()).is_some())
        .map(|key| {
            map_env_key(key.as_str())
                .unwrap_or_else(|| key.as_str().to_ascii_lowercase())
                .into()
        })
}

pub(crate) fn map_env_key(key: &str) -> Option<String> {
    const SECTIONS: [&str; 5] = ["console", "server", "transport", "queue", "credentials"];
    let key = key.to_ascii_lowercase();
    SECTIONS.into_iter().find_map(|section| {
        key.strip_prefix(section)
            .and_then(|rest| rest.strip_prefix('_'))
            .filter(|rest| !rest.is_empty())
            .map(|rest| format!("{section}.{rest}"))
    })
}

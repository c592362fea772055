// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Settings for the Switchboard sync core.
//!
//! One [`SwitchboardConfig`] carries the `[console]`, `[server]`,
//! `[transport]`, `[queue]` and `[credentials]` sections. Every entry point
//! here returns either a config that passed [`validation`] or the full list
//! of problems as miette diagnostics, pointing into the TOML file that
//! caused them when one did.
//!
//! ```no_run
//! let config = switchboard_config::load_and_validate().expect("config errors");
//! println!("push endpoint: {}", config.server.ws_url);
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

use std::path::Path;

pub use diagnostic::{ConfigError, render_errors};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::SwitchboardConfig;

/// The file hierarchy plus `SWITCHBOARD_*` overrides.
pub fn load_and_validate() -> Result<SwitchboardConfig, Vec<ConfigError>> {
    checked(loader::load_config(), || {
        loader::config_files()
            .into_iter()
            .filter_map(|path| read_source(&path))
            .collect()
    })
}

/// Inline TOML only, no files and no environment.
pub fn load_and_validate_str(toml_content: &str) -> Result<SwitchboardConfig, Vec<ConfigError>> {
    checked(loader::load_config_from_str(toml_content), || {
        vec![("<inline>".to_string(), toml_content.to_string())]
    })
}

/// One explicit file plus `SWITCHBOARD_*` overrides.
pub fn load_and_validate_path(path: &Path) -> Result<SwitchboardConfig, Vec<ConfigError>> {
    checked(loader::load_config_from_path(path), || {
        read_source(path).into_iter().collect()
    })
}

/// Validate a loaded config, or turn the load error into diagnostics.
///
/// `sources` is only read on failure.
fn checked(
    loaded: Result<SwitchboardConfig, figment::Error>,
    sources: impl FnOnce() -> Vec<(String, String)>,
) -> Result<SwitchboardConfig, Vec<ConfigError>> {
    let config = loaded.map_err(|err| diagnostic::figment_to_config_errors(err, &sources()))?;
    validation::validate_config(&config)?;
    Ok(config)
}

fn read_source(path: &Path) -> Option<(String, String)> {
    let content = std::fs::read_to_string(path).ok()?;
    let shown = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    Some((shown.display().to_string(), content))
}

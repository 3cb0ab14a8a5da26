// SPDX-FileCopyrightText: 2026 Telesave Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration loading with Figment.
//!
//! Merge order (later overrides earlier):
//! 1. Compiled defaults
//! 2. `/etc/telesave/telesave.toml`
//! 3. `~/.config/telesave/telesave.toml`
//! 4. `./telesave.toml`
//! 5. `TELESAVE_*` environment variables
//! 6. `TELEGRAM_BOT_TOKEN`

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::TelesaveConfig;

/// Config sections reachable through `TELESAVE_<SECTION>_<KEY>`.
const SECTIONS: &[&str] = &["telegram", "storage", "sync", "log"];

/// Candidate config files in merge order.
pub fn config_file_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("/etc/telesave/telesave.toml")];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("telesave/telesave.toml"));
    }
    paths.push(PathBuf::from("telesave.toml"));
    paths
}

/// Load configuration from the file hierarchy with env var overrides.
pub fn load_config() -> Result<TelesaveConfig, figment::Error> {
    build_figment(None).extract()
}

/// Load configuration from one explicit file with env var overrides.
///
/// The file hierarchy is skipped entirely.
pub fn load_config_from_path(path: &Path) -> Result<TelesaveConfig, figment::Error> {
    build_figment(Some(path)).extract()
}

/// Load configuration from a TOML string only, without env overrides.
pub fn load_config_from_str(toml_content: &str) -> Result<TelesaveConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(TelesaveConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Build the Figment used for loading, before extraction.
pub fn build_figment(explicit: Option<&Path>) -> Figment {
    let mut figment = Figment::new().merge(Serialized::defaults(TelesaveConfig::default()));
    match explicit {
        Some(path) => figment = figment.merge(Toml::file(path)),
        None => {
            for path in config_file_paths() {
                figment = figment.merge(Toml::file(path));
            }
        }
    }
    figment.merge(env_provider()).merge(legacy_env_provider())
}

/// `TELESAVE_SYNC_PAGE_SIZE` -> `sync.page_size`.
///
/// Uses `Env::map()` instead of `Env::split("_")` because key names contain
/// underscores themselves.
fn env_provider() -> Env {
    Env::prefixed("TELESAVE_").map(|key| {
        let key_str = key.as_str();
        SECTIONS
            .iter()
            .find_map(|section| {
                key_str
                    .strip_prefix(section)
                    .and_then(|rest| rest.strip_prefix('_'))
                    .map(|rest| format!("{section}.{rest}"))
            })
            .unwrap_or_else(|| key_str.to_string())
            .into()
    })
}

/// The conventional token variable, honoured without the `TELESAVE_` prefix.
fn legacy_env_provider() -> Env {
    Env::raw()
        .only(&["TELEGRAM_BOT_TOKEN"])
        .map(|key| key.as_str().replacen("telegram_", "telegram.", 1).into())
}

// SPDX-FileCopyrightText: 2026 Telesave Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for telesave.
//!
//! TOML files and environment variables are merged with Figment, checked
//! with `deny_unknown_fields` plus semantic validation, and failures are
//! rendered as miette diagnostics with typo suggestions.
//!
//! ```no_run
//! use telesave_config::load_and_validate;
//!
//! let config = load_and_validate(None).expect("config errors");
//! println!("archiving into {}", config.storage.db_path);
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

use std::path::Path;

pub use diagnostic::{ConfigError, render_errors};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::{LogConfig, StorageConfig, SyncConfig, TelegramConfig, TelesaveConfig};
pub use validation::{require_credentials, validate_config};

/// Load configuration and validate it.
///
/// With `explicit` set only that file is read (plus env overrides);
/// otherwise the standard hierarchy is merged.
pub fn load_and_validate(explicit: Option<&Path>) -> Result<TelesaveConfig, Vec<ConfigError>> {
    let loaded = match explicit {
        Some(path) => loader::load_config_from_path(path),
        None => loader::load_config(),
    };
    match loaded {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => {
            let sources = collect_toml_sources(explicit);
            Err(diagnostic::figment_to_config_errors(err, &sources))
        }
    }
}

/// Load configuration from a TOML string and validate it.
pub fn load_and_validate_str(toml_content: &str) -> Result<TelesaveConfig, Vec<ConfigError>> {
    match loader::load_config_from_str(toml_content) {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => {
            let sources = vec![("<inline>".to_string(), toml_content.to_string())];
            Err(diagnostic::figment_to_config_errors(err, &sources))
        }
    }
}

/// Read the TOML files that took part in loading, for error spans.
fn collect_toml_sources(explicit: Option<&Path>) -> Vec<(String, String)> {
    let paths = match explicit {
        Some(path) => vec![path.to_path_buf()],
        None => loader::config_file_paths(),
    };
    paths
        .into_iter()
        .filter_map(|path| {
            let content = std::fs::read_to_string(&path).ok()?;
            let display = std::path::absolute(&path)
                .unwrap_or(path)
                .display()
                .to_string();
            Some((display, content))
        })
        .collect()
}

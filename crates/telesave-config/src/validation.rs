// SPDX-FileCopyrightText: 2026 Telesave Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Semantic checks that serde attributes cannot express.

use crate::diagnostic::ConfigError;
use crate::model::TelesaveConfig;

/// Largest page the service hands out in one history call.
pub const MAX_PAGE_SIZE: usize = 100;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration.
///
/// Collects every failure instead of stopping at the first one.
pub fn validate_config(config: &TelesaveConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if config.storage.db_path.trim().is_empty() {
        fail("storage.db_path must not be empty".to_string());
    }
    if config.storage.store_path.trim().is_empty() {
        fail("storage.store_path must not be empty".to_string());
    }
    if config.telegram.session.trim().is_empty() {
        fail("telegram.session must not be empty".to_string());
    }

    let sync = &config.sync;
    if !(1..=MAX_PAGE_SIZE).contains(&sync.page_size) {
        fail(format!(
            "sync.page_size must be between 1 and {MAX_PAGE_SIZE}, got {}",
            sync.page_size
        ));
    }
    if sync.max_concurrent_chats == 0 {
        fail("sync.max_concurrent_chats must be at least 1".to_string());
    }
    if sync.max_retries == 0 {
        fail("sync.max_retries must be at least 1".to_string());
    }
    if sync.base_delay_ms > sync.max_delay_ms {
        fail(format!(
            "sync.base_delay_ms ({}) must not exceed sync.max_delay_ms ({})",
            sync.base_delay_ms, sync.max_delay_ms
        ));
    }
    if sync.call_timeout_secs == 0 {
        fail("sync.call_timeout_secs must be at least 1".to_string());
    }
    if sync.live_buffer == 0 {
        fail("sync.live_buffer must be at least 1".to_string());
    }

    let level = config.log.level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        fail(format!(
            "log.level `{}` is not one of {}",
            config.log.level,
            LOG_LEVELS.join(", ")
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// The bot token, or a diagnostic explaining how to set it.
pub fn require_credentials(config: &TelesaveConfig) -> Result<String, ConfigError> {
    config
        .telegram
        .credentials()
        .map(str::to_string)
        .ok_or(ConfigError::MissingCredentials)
}

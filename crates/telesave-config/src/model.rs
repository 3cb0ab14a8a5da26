// SPDX-FileCopyrightText: 2026 Telesave Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs.
//!
//! All structs use `#[serde(deny_unknown_fields)]` so a misspelled key is
//! reported at startup instead of being silently ignored.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level telesave configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TelesaveConfig {
    /// Service credentials and session state.
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Record store and blob root locations.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Sync engine tuning.
    #[serde(default)]
    pub sync: SyncConfig,

    /// Logging.
    #[serde(default)]
    pub log: LogConfig,
}

/// Messaging service credentials.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TelegramConfig {
    /// Bot API token issued by @BotFather (`123456:ABC-DEF...`). Required to sync.
    #[serde(default)]
    pub bot_token: Option<String>,

    /// Where the persisted session state lives.
    #[serde(default = "default_session")]
    pub session: String,

    /// Archival destination for self-destructing messages.
    /// `None` forwards to the account's own saved messages.
    #[serde(default)]
    pub forward_chat_id: Option<i64>,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            session: default_session(),
            forward_chat_id: None,
        }
    }
}

impl TelegramConfig {
    /// The bot token, when present and non-blank.
    pub fn credentials(&self) -> Option<&str> {
        self.bot_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }
}

/// Storage locations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite record store.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Root directory of the content-addressed blob store.
    #[serde(default = "default_store_path")]
    pub store_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            store_path: default_store_path(),
            wal_mode: true,
        }
    }
}

/// Sync engine settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// Upper bound on chats backfilling at the same time.
    #[serde(default = "default_max_concurrent_chats")]
    pub max_concurrent_chats: usize,

    /// Messages per history page (the service caps this at 100).
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Attempts per page before a chat is marked failed.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Timeout applied to each individual service call.
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    /// Keep live subscriptions open once backfill finishes.
    #[serde(default = "default_true")]
    pub live: bool,

    /// Capacity of each chat's live event channel.
    #[serde(default = "default_live_buffer")]
    pub live_buffer: usize,

    /// Archive broadcast channels too.
    #[serde(default)]
    pub include_channels: bool,

    /// Archive chats the user archived on the service.
    #[serde(default)]
    pub include_archived: bool,

    /// Forward self-destructing messages to the archival destination.
    #[serde(default = "default_true")]
    pub save_self_destructing: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_concurrent_chats: default_max_concurrent_chats(),
            page_size: default_page_size(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            call_timeout_secs: default_call_timeout_secs(),
            live: true,
            live_buffer: default_live_buffer(),
            include_channels: false,
            include_archived: false,
            save_self_destructing: true,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|p| p.join("telesave"))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn default_session() -> String {
    data_dir()
        .join("telesave.session")
        .to_string_lossy()
        .into_owned()
}

fn default_db_path() -> String {
    data_dir().join("telesave.db").to_string_lossy().into_owned()
}

fn default_store_path() -> String {
    data_dir().join("store").to_string_lossy().into_owned()
}

fn default_true() -> bool {
    true
}

fn default_max_concurrent_chats() -> usize {
    4
}

fn default_page_size() -> usize {
    100
}

fn default_max_retries() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_call_timeout_secs() -> u64 {
    30
}

fn default_live_buffer() -> usize {
    256
}

fn default_log_level() -> String {
    "info".to_string()
}

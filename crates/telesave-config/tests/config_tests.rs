// SPDX-FileCopyrightText: 2026 Telesave Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the telesave configuration system.

use figment::Jail;
use telesave_config::diagnostic::ConfigError;
use telesave_config::loader::build_figment;
use telesave_config::model::TelesaveConfig;
use telesave_config::{load_and_validate_str, load_config_from_str};

#[test]
fn full_toml_deserializes() {
    let toml = r#"
[telegram]
bot_token = "123456:0123456789abcdef"
session = "/tmp/telesave.session"
forward_chat_id = -1001

[storage]
db_path = "/tmp/telesave.db"
store_path = "/tmp/store"
wal_mode = false

[sync]
max_concurrent_chats = 2
page_size = 50
max_retries = 3
base_delay_ms = 100
max_delay_ms = 1000
call_timeout_secs = 10
live = false
live_buffer = 16
include_channels = true
include_archived = true
save_self_destructing = false

[log]
level = "debug"
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.telegram.credentials(), Some("123456:0123456789abcdef"));
    assert_eq!(config.telegram.forward_chat_id, Some(-1001));
    assert_eq!(config.storage.store_path, "/tmp/store");
    assert!(!config.storage.wal_mode);
    assert_eq!(config.sync.page_size, 50);
    assert!(!config.sync.live);
    assert!(config.sync.include_channels);
    assert!(!config.sync.save_self_destructing);
    assert_eq!(config.log.level, "debug");
}

#[test]
fn empty_toml_uses_defaults() {
    let config = load_config_from_str("").expect("empty TOML is valid");
    let defaults = TelesaveConfig::default();
    assert_eq!(config.sync.page_size, defaults.sync.page_size);
    assert_eq!(config.storage.db_path, defaults.storage.db_path);
}

#[test]
fn unknown_sync_key_gets_suggestion() {
    let toml = r#"
[sync]
page_sise = 10
"#;

    let errors = load_and_validate_str(toml).expect_err("unknown key must be rejected");
    let suggestion = errors.iter().find_map(|e| match e {
        ConfigError::UnknownKey {
            key, suggestion, ..
        } if key == "page_sise" => suggestion.clone(),
        _ => None,
    });
    assert_eq!(suggestion.as_deref(), Some("page_size"));
}

#[test]
fn unknown_section_is_rejected() {
    let errors = load_and_validate_str("[agent]\nname = \"x\"\n").unwrap_err();
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::UnknownKey { key, .. } if key == "agent"))
    );
}

#[test]
fn wrong_type_is_reported() {
    let errors = load_and_validate_str("[telegram]\nforward_chat_id = \"abc\"\n").unwrap_err();
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::InvalidType { key, .. } if key.contains("forward_chat_id")))
    );
}

#[test]
fn validation_runs_after_parse() {
    let errors = load_and_validate_str("[sync]\npage_size = 500\n").unwrap_err();
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("page_size")))
    );
}

#[test]
fn prefixed_env_overrides_file() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "telesave.toml",
            "[sync]\npage_size = 20\nmax_concurrent_chats = 2\n",
        )?;
        jail.set_env("TELESAVE_SYNC_PAGE_SIZE", "40");
        jail.set_env("TELESAVE_LOG_LEVEL", "trace");

        let config: TelesaveConfig = build_figment(None).extract()?;
        assert_eq!(config.sync.page_size, 40);
        assert_eq!(config.sync.max_concurrent_chats, 2);
        assert_eq!(config.log.level, "trace");
        Ok(())
    });
}

#[test]
fn legacy_credential_env_is_honoured() {
    Jail::expect_with(|jail| {
        jail.set_env("TELEGRAM_BOT_TOKEN", "777:cafe");

        let config: TelesaveConfig = build_figment(None).extract()?;
        assert_eq!(config.telegram.credentials(), Some("777:cafe"));
        Ok(())
    });
}

#[test]
fn explicit_path_skips_local_file() {
    Jail::expect_with(|jail| {
        jail.create_file("telesave.toml", "[sync]\npage_size = 20\n")?;
        jail.create_file("other.toml", "[sync]\npage_size = 30\n")?;

        let config: TelesaveConfig =
            build_figment(Some(std::path::Path::new("other.toml"))).extract()?;
        assert_eq!(config.sync.page_size, 30);
        Ok(())
    });
}

// SPDX-FileCopyrightText: 2026 Telesave Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `telesave doctor` command implementation.
//!
//! Opens each adapter the sync would use and reports its identity and
//! health check, without archiving anything.

use std::io::IsTerminal;
use std::path::Path;
use std::time::{Duration, Instant};

use colored::Colorize;
use telesave_config::model::TelesaveConfig;
use telesave_core::{ArchiveStore, HealthStatus, PluginAdapter, TelesaveError};
use telesave_storage::SqliteArchive;
use telesave_telegram::TelegramService;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: &'static str,
    pub status: CheckStatus,
    pub message: String,
    pub duration: Duration,
}

impl CheckResult {
    fn new(name: &'static str, status: CheckStatus, message: String, start: Instant) -> Self {
        Self {
            name,
            status,
            message,
            duration: start.elapsed(),
        }
    }
}

/// Runs every check and prints one line per check.
pub async fn run_doctor(config: &TelesaveConfig) -> Result<(), TelesaveError> {
    let results = vec![
        check_archive(config).await,
        check_blob_store(&config.storage.store_path),
        check_telegram(config).await,
    ];

    let use_color = std::io::stdout().is_terminal();
    println!("telesave doctor");
    for result in &results {
        println!("  {}", format_line(result, use_color));
    }

    let issues = results
        .iter()
        .filter(|r| r.status != CheckStatus::Pass)
        .count();
    match issues {
        0 => println!("all checks passed"),
        1 => println!("1 issue found"),
        n => println!("{n} issues found"),
    }
    Ok(())
}

fn format_line(result: &CheckResult, use_color: bool) -> String {
    let tag = match (result.status, use_color) {
        (CheckStatus::Pass, true) => "ok".green().to_string(),
        (CheckStatus::Warn, true) => "warn".yellow().to_string(),
        (CheckStatus::Fail, true) => "fail".red().to_string(),
        (CheckStatus::Pass, false) => "ok".to_string(),
        (CheckStatus::Warn, false) => "warn".to_string(),
        (CheckStatus::Fail, false) => "fail".to_string(),
    };
    format!(
        "[{tag}] {:<10} {} ({}ms)",
        result.name,
        result.message,
        result.duration.as_millis()
    )
}

/// Reports an adapter's identity together with its health check.
async fn adapter_health(name: &'static str, adapter: &dyn PluginAdapter) -> CheckResult {
    let start = Instant::now();
    let identity = format!(
        "{} {} ({})",
        adapter.name(),
        adapter.version(),
        adapter.adapter_type()
    );
    match adapter.health_check().await {
        Ok(HealthStatus::Healthy) => CheckResult::new(name, CheckStatus::Pass, identity, start),
        Ok(HealthStatus::Unhealthy(reason)) => {
            CheckResult::new(name, CheckStatus::Fail, format!("{identity}: {reason}"), start)
        }
        Err(e) => CheckResult::new(name, CheckStatus::Fail, format!("{identity}: {e}"), start),
    }
}

async fn check_archive(config: &TelesaveConfig) -> CheckResult {
    let start = Instant::now();
    let db_path = &config.storage.db_path;
    if !Path::new(db_path).exists() {
        return CheckResult::new(
            "archive",
            CheckStatus::Warn,
            format!("{db_path} not found (created on first sync)"),
            start,
        );
    }

    let archive = SqliteArchive::new(config.storage.clone());
    if let Err(e) = archive.initialize().await {
        return CheckResult::new("archive", CheckStatus::Fail, e.to_string(), start);
    }
    let result = adapter_health("archive", &archive).await;
    if let Err(e) = archive.close().await {
        return CheckResult::new("archive", CheckStatus::Fail, e.to_string(), start);
    }
    result
}

fn check_blob_store(store_path: &str) -> CheckResult {
    let start = Instant::now();
    let path = Path::new(store_path);
    if path.is_dir() {
        CheckResult::new("blobs", CheckStatus::Pass, store_path.to_string(), start)
    } else if path.exists() {
        CheckResult::new(
            "blobs",
            CheckStatus::Fail,
            format!("{store_path} is not a directory"),
            start,
        )
    } else {
        CheckResult::new(
            "blobs",
            CheckStatus::Warn,
            format!("{store_path} not found (created on first download)"),
            start,
        )
    }
}

async fn check_telegram(config: &TelesaveConfig) -> CheckResult {
    let start = Instant::now();
    match TelegramService::new(&config.telegram, config.sync.live_buffer) {
        Ok(service) => adapter_health("telegram", &service).await,
        Err(e) => CheckResult::new("telegram", CheckStatus::Fail, e.to_string(), start),
    }
}

// SPDX-FileCopyrightText: 2026 Telesave Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Default command: wire storage, the Telegram adapter and the orchestrator
//! together and run one sync.

use std::sync::Arc;

use telesave_config::model::TelesaveConfig;
use telesave_core::{ArchiveStore, PluginAdapter, TelesaveError};
use telesave_storage::{BlobSink, SqliteArchive};
use telesave_sync::{
    RunFlags, SyncContext, SyncOptions, SyncOrchestrator, SyncReport, install_signal_handler,
};
use telesave_telegram::TelegramService;
use tracing::{info, warn};

/// Runs the sync until every chat settles or a shutdown signal arrives.
///
/// With `json`, the final report is printed as JSON for scripting.
pub async fn run_sync(
    config: &TelesaveConfig,
    flags: RunFlags,
    json: bool,
) -> Result<(), TelesaveError> {
    info!(?flags, "starting telesave");

    let store = SqliteArchive::new(config.storage.clone());
    store.initialize().await?;
    let store = Arc::new(store);
    let blobs = Arc::new(BlobSink::new(&config.storage.store_path));
    let service = Arc::new(TelegramService::new(
        &config.telegram,
        config.sync.live_buffer,
    )?);

    let options = SyncOptions::from_config(&config.sync, &config.telegram, flags);
    let ctx = SyncContext::new(service.clone(), store, blobs, options);
    let shutdown = install_signal_handler();

    let result = SyncOrchestrator::new(ctx, shutdown).run().await;

    if let Err(e) = service.shutdown().await {
        warn!(error = %e, "Telegram adapter shutdown failed");
    }

    let report = result?;
    print_report(&report, json)
}

fn print_report(report: &SyncReport, json: bool) -> Result<(), TelesaveError> {
    for chat in report.failed() {
        warn!(
            chat_id = %chat.chat_id,
            reason = chat.reason.as_deref().unwrap_or("unknown"),
            "chat failed"
        );
    }
    info!(
        chats = report.chats.len(),
        archived = report.total_archived(),
        "sync finished"
    );
    if json {
        println!("{}", render_json(report)?);
    } else {
        println!("{report}");
    }
    Ok(())
}

fn render_json(report: &SyncReport) -> Result<String, TelesaveError> {
    serde_json::to_string_pretty(report)
        .map_err(|e| TelesaveError::Internal(format!("failed to serialize report: {e}")))
}

/// Builds the log filter.
///
/// `RUST_LOG` wins; otherwise `--debug` raises telesave crates to debug and
/// the configured level applies.
pub fn filter_directive(config_level: &str, debug: bool) -> String {
    let level = if debug { "debug" } else { config_level };
    format!("telesave={level},warn")
}

/// Initializes the tracing subscriber.
pub fn init_tracing(config_level: &str, debug: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(config_level, debug)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}

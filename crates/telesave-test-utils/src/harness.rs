// SPDX-FileCopyrightText: 2026 Telesave Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end sync testing.
//!
//! `TestHarness` assembles a temp SQLite archive, a temp blob root and a
//! [`MockService`], and runs the real orchestrator over them.

use std::sync::Arc;

use telesave_config::model::{StorageConfig, SyncConfig, TelegramConfig};
use telesave_core::{
    ArchiveStore, Chat, ChatId, MessageId, MessageRecord, TelesaveError, Watermark,
};
use telesave_storage::{BlobSink, SqliteArchive};
use telesave_sync::{RunFlags, SyncContext, SyncOptions, SyncOrchestrator, SyncReport};
use tokio_util::sync::CancellationToken;

use crate::mock_service::MockService;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    service: MockService,
    flags: RunFlags,
    sync: SyncConfig,
    telegram: TelegramConfig,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            service: MockService::new(),
            // Backfill only unless a test opts into live mode.
            flags: RunFlags {
                once: true,
                ..RunFlags::default()
            },
            sync: SyncConfig {
                page_size: 2,
                base_delay_ms: 100,
                max_delay_ms: 1_000,
                ..SyncConfig::default()
            },
            telegram: TelegramConfig::default(),
        }
    }

    pub fn with_service(mut self, service: MockService) -> Self {
        self.service = service;
        self
    }

    pub fn with_flags(mut self, flags: RunFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Keep chats live after backfill.
    pub fn live(mut self) -> Self {
        self.flags.once = false;
        self
    }

    pub fn with_sync_config(mut self, sync: SyncConfig) -> Self {
        self.sync = sync;
        self
    }

    pub fn with_forward_chat(mut self, chat_id: i64) -> Self {
        self.telegram.forward_chat_id = Some(chat_id);
        self
    }

    /// Build the test harness and initialize its archive.
    pub async fn build(self) -> Result<TestHarness, TelesaveError> {
        let temp_dir = tempfile::TempDir::new().map_err(TelesaveError::storage)?;
        let storage_config = StorageConfig {
            db_path: temp_dir.path().join("test.db").to_string_lossy().to_string(),
            store_path: temp_dir.path().join("store").to_string_lossy().to_string(),
            wal_mode: true,
        };

        let store = SqliteArchive::new(storage_config.clone());
        store.initialize().await?;

        Ok(TestHarness {
            service: Arc::new(self.service),
            store: Arc::new(store),
            blobs: Arc::new(BlobSink::new(&storage_config.store_path)),
            storage_config,
            flags: self.flags,
            sync: self.sync,
            telegram: self.telegram,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete test environment with a mock service and temp storage.
pub struct TestHarness {
    pub service: Arc<MockService>,
    pub store: Arc<SqliteArchive>,
    pub blobs: Arc<BlobSink>,
    pub storage_config: StorageConfig,
    pub flags: RunFlags,
    sync: SyncConfig,
    telegram: TelegramConfig,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Options for a run with the harness flags, jitter disabled.
    pub fn options(&self) -> SyncOptions {
        let mut options = SyncOptions::from_config(&self.sync, &self.telegram, self.flags);
        options.retry = options.retry.clone().without_jitter();
        options
    }

    pub fn context(&self) -> SyncContext {
        self.context_with(self.options())
    }

    pub fn context_with(&self, options: SyncOptions) -> SyncContext {
        SyncContext::new(
            self.service.clone(),
            self.store.clone(),
            self.blobs.clone(),
            options,
        )
    }

    pub fn orchestrator(&self, shutdown: CancellationToken) -> SyncOrchestrator {
        SyncOrchestrator::new(self.context(), shutdown)
    }

    /// One full run that nobody cancels.
    pub async fn run(&self) -> Result<SyncReport, TelesaveError> {
        self.orchestrator(CancellationToken::new()).run().await
    }

    /// Replace the archive with a fresh connection to the same files, as a
    /// process restart would.
    pub async fn restart(&mut self) -> Result<(), TelesaveError> {
        let store = SqliteArchive::new(self.storage_config.clone());
        store.initialize().await?;
        self.store = Arc::new(store);
        self.blobs = Arc::new(BlobSink::new(&self.storage_config.store_path));
        Ok(())
    }

    /// Register `chat` and store `watermark` as if an earlier run had
    /// reached it.
    pub async fn seed_watermark(
        &self,
        chat: &Chat,
        watermark: Watermark,
    ) -> Result<(), TelesaveError> {
        self.store.upsert_chat(chat).await?;
        self.store.advance_watermark(&watermark).await
    }

    pub async fn watermark(&self, chat: ChatId) -> Result<Watermark, TelesaveError> {
        self.store.get_watermark(chat).await
    }

    pub async fn record(
        &self,
        chat: ChatId,
        id: i64,
    ) -> Result<Option<MessageRecord>, TelesaveError> {
        self.store.get_message(chat, MessageId(id)).await
    }

    /// Archived message ids of `chat`, ascending.
    pub async fn archived_ids(&self, chat: ChatId) -> Result<Vec<i64>, TelesaveError> {
        Ok(self
            .store
            .chat_messages(chat)
            .await?
            .iter()
            .map(|r| r.message_id.0)
            .collect())
    }

    /// Number of blob files on disk.
    pub fn blob_files(&self) -> usize {
        let root = self.blobs.root();
        let Ok(shards) = std::fs::read_dir(root) else {
            return 0;
        };
        shards
            .flatten()
            .filter(|shard| shard.path().is_dir())
            .filter_map(|shard| std::fs::read_dir(shard.path()).ok())
            .map(|files| {
                files
                    .flatten()
                    .filter(|f| !f.file_name().to_string_lossy().starts_with('.'))
                    .count()
            })
            .sum()
    }

    /// Poll until `chat` holds at least `count` records.
    pub async fn wait_for_records(&self, chat: ChatId, count: u64) -> Result<(), TelesaveError> {
        while self.store.count_messages(chat).await? < count {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        Ok(())
    }
}

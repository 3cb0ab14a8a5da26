// SPDX-FileCopyrightText: 2026 Telesave Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of [`ArchiveStore`].

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use telesave_config::model::StorageConfig;
use telesave_core::{
    AdapterType, ArchiveStore, BlobRef, Chat, ChatId, CommitOutcome, CommitRequest,
    HealthStatus, MessageEdit, MessageId, MessageRecord, PluginAdapter, TelesaveError,
    Watermark,
};

use crate::database::Database;
use crate::queries;

/// SQLite-backed archive store.
///
/// The database opens on [`ArchiveStore::initialize`]; every other call
/// fails until then.
pub struct SqliteArchive {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteArchive {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Every record of one chat in id order.
    pub async fn chat_messages(&self, chat_id: ChatId) -> Result<Vec<MessageRecord>, TelesaveError> {
        queries::messages::chat_messages(self.db()?, chat_id).await
    }

    fn db(&self) -> Result<&Database, TelesaveError> {
        self.db.get().ok_or_else(|| TelesaveError::Storage {
            source: "archive not initialized -- call initialize() first".into(),
        })
    }
}

#[async_trait]
impl PluginAdapter for SqliteArchive {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, TelesaveError> {
        self.db()?
            .connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), TelesaveError> {
        if let Some(db) = self.db.get() {
            db.checkpoint().await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl ArchiveStore for SqliteArchive {
    async fn initialize(&self) -> Result<(), TelesaveError> {
        let db = Database::open_with(&self.config.db_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| TelesaveError::Storage {
            source: "archive already initialized".into(),
        })?;
        debug!(path = %self.config.db_path, "archive initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), TelesaveError> {
        self.db()?.checkpoint().await?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    async fn upsert_chat(&self, chat: &Chat) -> Result<Chat, TelesaveError> {
        queries::chats::upsert_chat(self.db()?, chat).await
    }

    async fn list_chats(&self) -> Result<Vec<Chat>, TelesaveError> {
        queries::chats::list_chats(self.db()?).await
    }

    async fn get_watermark(&self, chat_id: ChatId) -> Result<Watermark, TelesaveError> {
        queries::watermarks::get_watermark(self.db()?, chat_id).await
    }

    async fn advance_watermark(&self, next: &Watermark) -> Result<(), TelesaveError> {
        queries::watermarks::advance_watermark(self.db()?, next).await
    }

    async fn get_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<Option<MessageRecord>, TelesaveError> {
        queries::messages::get_message(self.db()?, chat_id, message_id).await
    }

    async fn commit_message(
        &self,
        request: CommitRequest,
    ) -> Result<CommitOutcome, TelesaveError> {
        queries::messages::commit_message(self.db()?, request).await
    }

    async fn mark_forwarded(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<(), TelesaveError> {
        queries::messages::mark_forwarded(self.db()?, chat_id, message_id).await
    }

    async fn unforwarded_ephemeral(&self) -> Result<Vec<MessageRecord>, TelesaveError> {
        queries::messages::unforwarded_ephemeral(self.db()?).await
    }

    async fn recent_messages(&self, limit: usize) -> Result<Vec<MessageRecord>, TelesaveError> {
        queries::messages::recent_messages(self.db()?, limit).await
    }

    async fn count_messages(&self, chat_id: ChatId) -> Result<u64, TelesaveError> {
        queries::messages::count_messages(self.db()?, chat_id).await
    }

    async fn find_blob(&self, content_hash: &str) -> Result<Option<BlobRef>, TelesaveError> {
        queries::blobs::find_blob(self.db()?, content_hash).await
    }

    async fn blob_for_source(&self, source_key: &str) -> Result<Option<BlobRef>, TelesaveError> {
        queries::blobs::blob_for_source(self.db()?, source_key).await
    }

    async fn list_blob_paths(&self) -> Result<Vec<String>, TelesaveError> {
        queries::blobs::list_blob_paths(self.db()?).await
    }

    async fn record_edit(&self, edit: &MessageEdit) -> Result<(), TelesaveError> {
        queries::messages::record_edit(self.db()?, edit).await
    }

    async fn message_edits(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<Vec<MessageEdit>, TelesaveError> {
        queries::messages::message_edits(self.db()?, chat_id, message_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use telesave_core::{ChatKind, MessageExtra};
    use tempfile::tempdir;

    fn make_config(dir: &std::path::Path) -> StorageConfig {
        StorageConfig {
            db_path: dir.join("archive.db").to_string_lossy().into_owned(),
            store_path: dir.join("store").to_string_lossy().into_owned(),
            wal_mode: true,
        }
    }

    fn blob(byte: u8) -> BlobRef {
        let hash = format!("{byte:02x}").repeat(32);
        BlobRef {
            storage_path: crate::BlobSink::storage_path(&hash),
            content_hash: hash,
            mime_type: "image/png".into(),
            size: 3,
        }
    }

    fn record(chat: i64, id: i64, media: Vec<BlobRef>, ephemeral: bool) -> MessageRecord {
        MessageRecord {
            chat_id: ChatId(chat),
            message_id: MessageId(id),
            sender_id: Some(99),
            timestamp: chrono::DateTime::from_timestamp(1_700_000_000 + id, 0).unwrap(),
            text: Some(format!("message {id}")),
            media_refs: media,
            is_self_destructing: ephemeral,
            forwarded: false,
            extra: MessageExtra::default(),
        }
    }

    async fn open(dir: &std::path::Path) -> SqliteArchive {
        let archive = SqliteArchive::new(make_config(dir));
        archive.initialize().await.unwrap();
        for id in [1, 2] {
            archive
                .upsert_chat(&Chat::new(ChatId(id), format!("chat {id}"), ChatKind::User))
                .await
                .unwrap();
        }
        archive
    }

    #[tokio::test]
    async fn adapter_identity() {
        let dir = tempdir().unwrap();
        let archive = SqliteArchive::new(make_config(dir.path()));
        assert_eq!(archive.name(), "sqlite");
        assert_eq!(archive.adapter_type(), AdapterType::Storage);
        assert!(archive.health_check().await.is_err(), "not initialized yet");
    }

    #[tokio::test]
    async fn initialize_twice_returns_error() {
        let dir = tempdir().unwrap();
        let archive = open(dir.path()).await;
        assert!(archive.initialize().await.is_err());
        assert_eq!(archive.health_check().await.unwrap(), HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn commit_is_idempotent_and_advances_watermark() {
        let dir = tempdir().unwrap();
        let archive = open(dir.path()).await;

        let wm = Watermark::initial(ChatId(1)).after_commit(MessageId(1));
        let request = CommitRequest {
            record: record(1, 1, vec![blob(1), blob(2)], false),
            sources: vec![("remote-1".into(), blob(1).content_hash)],
            watermark: Some(wm),
        };
        let outcome = archive.commit_message(request.clone()).await.unwrap();
        assert!(outcome.is_created());
        assert_eq!(archive.get_watermark(ChatId(1)).await.unwrap(), wm);

        // Redelivery writes nothing, not even the (now stale) watermark.
        let again = archive.commit_message(request).await.unwrap();
        assert!(!again.is_created());
        assert_eq!(again.record().media_refs, vec![blob(1), blob(2)]);
        assert_eq!(archive.count_messages(ChatId(1)).await.unwrap(), 1);

        assert_eq!(
            archive.blob_for_source("remote-1").await.unwrap(),
            Some(blob(1))
        );
        assert_eq!(archive.list_blob_paths().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn stale_watermark_rolls_back_the_commit() {
        let dir = tempdir().unwrap();
        let archive = open(dir.path()).await;

        let ahead = Watermark::initial(ChatId(1)).after_commit(MessageId(10));
        archive.advance_watermark(&ahead).await.unwrap();

        let err = archive
            .commit_message(CommitRequest {
                record: record(1, 4, vec![blob(3)], false),
                sources: vec![],
                watermark: Some(Watermark::initial(ChatId(1)).after_commit(MessageId(4))),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, TelesaveError::StaleWatermark { .. }));
        assert!(archive.get_message(ChatId(1), MessageId(4)).await.unwrap().is_none());
        assert!(archive.find_blob(&blob(3).content_hash).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn shared_blob_is_indexed_once() {
        let dir = tempdir().unwrap();
        let archive = open(dir.path()).await;
        for chat in [1, 2] {
            archive
                .commit_message(CommitRequest {
                    record: record(chat, 5, vec![blob(9)], false),
                    sources: vec![],
                    watermark: None,
                })
                .await
                .unwrap();
        }
        assert_eq!(archive.list_blob_paths().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn forwarding_flag_and_pending_forwards() {
        let dir = tempdir().unwrap();
        let archive = open(dir.path()).await;
        for (id, ephemeral) in [(1, true), (2, false), (3, true)] {
            archive
                .commit_message(CommitRequest {
                    record: record(1, id, vec![], ephemeral),
                    sources: vec![],
                    watermark: None,
                })
                .await
                .unwrap();
        }

        let pending = archive.unforwarded_ephemeral().await.unwrap();
        assert_eq!(
            pending.iter().map(|r| r.message_id.0).collect::<Vec<_>>(),
            vec![1, 3]
        );

        archive.mark_forwarded(ChatId(1), MessageId(1)).await.unwrap();
        archive.mark_forwarded(ChatId(1), MessageId(1)).await.unwrap();
        assert!(archive.mark_forwarded(ChatId(1), MessageId(2)).await.is_err());

        let stored = archive.get_message(ChatId(1), MessageId(1)).await.unwrap().unwrap();
        assert!(stored.forwarded);
        assert_eq!(archive.unforwarded_ephemeral().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn recent_messages_and_edits() {
        let dir = tempdir().unwrap();
        let archive = open(dir.path()).await;
        let mut silent = record(2, 7, vec![], false);
        silent.extra.silent = true;
        silent.sender_id = None;
        for rec in [record(1, 1, vec![], false), silent.clone(), record(1, 3, vec![], false)] {
            archive
                .commit_message(CommitRequest {
                    record: rec,
                    sources: vec![],
                    watermark: None,
                })
                .await
                .unwrap();
        }

        let recent = archive.recent_messages(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0], silent, "newest first, extra and sender preserved");

        let edit = MessageEdit {
            chat_id: ChatId(1),
            message_id: MessageId(3),
            text: Some("fixed typo".into()),
            edit_date: chrono::DateTime::from_timestamp(1_800_000_000, 0).unwrap(),
        };
        archive.record_edit(&edit).await.unwrap();
        archive.record_edit(&edit).await.unwrap();
        assert_eq!(
            archive.message_edits(ChatId(1), MessageId(3)).await.unwrap(),
            vec![edit]
        );
        let original = archive.get_message(ChatId(1), MessageId(3)).await.unwrap().unwrap();
        assert_eq!(original.text.as_deref(), Some("message 3"));

        archive.close().await.unwrap();
    }
}

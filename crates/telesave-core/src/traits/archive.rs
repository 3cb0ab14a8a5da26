// SPDX-FileCopyrightText: 2026 Telesave Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Archive store trait: durable records, watermarks and blob index.

use async_trait::async_trait;

use crate::error::TelesaveError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    BlobRef, Chat, ChatId, CommitOutcome, CommitRequest, MessageEdit, MessageId, MessageRecord,
    Watermark,
};

/// Adapter for the local archive.
///
/// Every mutating call is atomic. A call that returns `Ok` is durable.
#[async_trait]
pub trait ArchiveStore: PluginAdapter {
    /// Opens the backing store and applies pending migrations.
    async fn initialize(&self) -> Result<(), TelesaveError>;

    /// Flushes pending writes and releases the connection.
    async fn close(&self) -> Result<(), TelesaveError>;

    /// Records a chat if unknown and returns the stored row. Existing rows
    /// are never modified.
    async fn upsert_chat(&self, chat: &Chat) -> Result<Chat, TelesaveError>;

    async fn list_chats(&self) -> Result<Vec<Chat>, TelesaveError>;

    /// Returns the stored watermark, or the initial one for an unseen chat.
    async fn get_watermark(&self, chat_id: ChatId) -> Result<Watermark, TelesaveError>;

    /// Persists `next` if it strictly progresses past the stored watermark,
    /// otherwise fails with [`TelesaveError::StaleWatermark`].
    async fn advance_watermark(&self, next: &Watermark) -> Result<(), TelesaveError>;

    async fn get_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<Option<MessageRecord>, TelesaveError>;

    /// Writes a message record, its media links, attachment sources and the
    /// optional watermark advance in one transaction.
    ///
    /// When the record already exists nothing is written and the stored
    /// record comes back as [`CommitOutcome::Existing`].
    async fn commit_message(&self, request: CommitRequest)
    -> Result<CommitOutcome, TelesaveError>;

    /// Sets `forwarded` on a self-destructing record. Idempotent.
    async fn mark_forwarded(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<(), TelesaveError>;

    /// Self-destructing records whose forward has not succeeded yet.
    async fn unforwarded_ephemeral(&self) -> Result<Vec<MessageRecord>, TelesaveError>;

    /// The newest `limit` records across all chats, newest first.
    async fn recent_messages(&self, limit: usize) -> Result<Vec<MessageRecord>, TelesaveError>;

    async fn count_messages(&self, chat_id: ChatId) -> Result<u64, TelesaveError>;

    /// Looks a blob up by content hash.
    async fn find_blob(&self, content_hash: &str) -> Result<Option<BlobRef>, TelesaveError>;

    /// Looks a blob up by the service-side identity of its source file.
    async fn blob_for_source(&self, source_key: &str) -> Result<Option<BlobRef>, TelesaveError>;

    /// Storage paths of every indexed blob.
    async fn list_blob_paths(&self) -> Result<Vec<String>, TelesaveError>;

    /// Appends an edit revision for an archived message.
    async fn record_edit(&self, edit: &MessageEdit) -> Result<(), TelesaveError>;

    /// Edit revisions of a message, oldest first.
    async fn message_edits(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<Vec<MessageEdit>, TelesaveError>;
}

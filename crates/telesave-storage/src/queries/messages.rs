// SPDX-FileCopyrightText: 2026 Telesave Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message records, their media links and edit history.

use rusqlite::{OptionalExtension, params};
use telesave_core::{
    ChatId, CommitOutcome, CommitRequest, MessageEdit, MessageExtra, MessageId, MessageRecord,
    TelesaveError,
};
use tracing::debug;

use crate::database::{Database, flatten_call_err, format_ts, map_tr_err, parse_ts};
use crate::queries::{blobs, watermarks};

const MESSAGE_COLUMNS: &str =
    "chat_id, message_id, sender_id, sent_at, text, is_self_destructing, forwarded, extra";

fn record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRecord> {
    let sent_at: String = row.get(3)?;
    let extra: Option<String> = row.get(7)?;
    let extra = match extra {
        Some(json) => serde_json::from_str(&json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
        })?,
        None => MessageExtra::default(),
    };
    Ok(MessageRecord {
        chat_id: ChatId(row.get(0)?),
        message_id: MessageId(row.get(1)?),
        sender_id: row.get(2)?,
        timestamp: parse_ts(3, &sent_at)?,
        text: row.get(4)?,
        media_refs: Vec::new(),
        is_self_destructing: row.get(5)?,
        forwarded: row.get(6)?,
        extra,
    })
}

/// Fill `media_refs` in stored order.
fn attach_media(conn: &rusqlite::Connection, record: &mut MessageRecord) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare_cached(
        "SELECT b.content_hash, b.mime_type, b.byte_len, b.storage_path
         FROM message_media m JOIN blobs b ON b.content_hash = m.content_hash
         WHERE m.chat_id = ?1 AND m.message_id = ?2
         ORDER BY m.position",
    )?;
    let rows = stmt.query_map(params![record.chat_id.0, record.message_id.0], |row| {
        blobs::blob_from_row(row, 0)
    })?;
    record.media_refs = rows.collect::<rusqlite::Result<_>>()?;
    Ok(())
}

fn query_records(
    conn: &rusqlite::Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> rusqlite::Result<Vec<MessageRecord>> {
    let mut stmt = conn.prepare(sql)?;
    let mut records = stmt
        .query_map(params, record_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    for record in &mut records {
        attach_media(conn, record)?;
    }
    Ok(records)
}

pub(crate) fn load_in(
    conn: &rusqlite::Connection,
    chat_id: ChatId,
    message_id: MessageId,
) -> rusqlite::Result<Option<MessageRecord>> {
    let record = conn
        .query_row(
            &format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages WHERE chat_id = ?1 AND message_id = ?2"
            ),
            params![chat_id.0, message_id.0],
            record_from_row,
        )
        .optional()?;
    match record {
        Some(mut record) => {
            attach_media(conn, &mut record)?;
            Ok(Some(record))
        }
        None => Ok(None),
    }
}

/// Look a record up by key.
pub async fn get_message(
    db: &Database,
    chat_id: ChatId,
    message_id: MessageId,
) -> Result<Option<MessageRecord>, TelesaveError> {
    db.connection()
        .call(move |conn| load_in(conn, chat_id, message_id))
        .await
        .map_err(map_tr_err)
}

/// Persist a record, its blobs, source mappings and watermark in one transaction.
///
/// An already archived `(chat_id, message_id)` short-circuits with the stored
/// record and writes nothing. A stale watermark rolls the whole unit back.
pub async fn commit_message(
    db: &Database,
    request: CommitRequest,
) -> Result<CommitOutcome, TelesaveError> {
    db.connection()
        .call(move |conn| -> Result<CommitOutcome, TelesaveError> {
            let CommitRequest {
                record,
                sources,
                watermark,
            } = request;
            let tx = conn.transaction().map_err(TelesaveError::storage)?;

            if let Some(existing) =
                load_in(&tx, record.chat_id, record.message_id).map_err(TelesaveError::storage)?
            {
                return Ok(CommitOutcome::Existing(existing));
            }

            for blob in &record.media_refs {
                blobs::insert_in(&tx, blob).map_err(TelesaveError::storage)?;
            }
            for (source_key, content_hash) in &sources {
                blobs::link_source_in(&tx, source_key, content_hash)
                    .map_err(TelesaveError::storage)?;
            }

            let extra = if record.extra.is_empty() {
                None
            } else {
                Some(serde_json::to_string(&record.extra).map_err(TelesaveError::storage)?)
            };
            tx.execute(
                "INSERT INTO messages
                     (chat_id, message_id, sender_id, sent_at, text, is_self_destructing, forwarded, extra)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.chat_id.0,
                    record.message_id.0,
                    record.sender_id,
                    format_ts(&record.timestamp),
                    record.text,
                    record.is_self_destructing,
                    record.forwarded,
                    extra
                ],
            )
            .map_err(TelesaveError::storage)?;

            for (position, blob) in record.media_refs.iter().enumerate() {
                tx.execute(
                    "INSERT INTO message_media (chat_id, message_id, position, content_hash)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        record.chat_id.0,
                        record.message_id.0,
                        position as i64,
                        blob.content_hash
                    ],
                )
                .map_err(TelesaveError::storage)?;
            }

            if let Some(watermark) = &watermark {
                watermarks::advance_in(&tx, watermark)?;
            }

            tx.commit().map_err(TelesaveError::storage)?;
            debug!(
                chat_id = %record.chat_id,
                message_id = %record.message_id,
                media = record.media_refs.len(),
                "message committed"
            );
            Ok(CommitOutcome::Created(record))
        })
        .await
        .map_err(flatten_call_err)
}

/// Set `forwarded` on a self-destructing record. Calling it again is a no-op.
pub async fn mark_forwarded(
    db: &Database,
    chat_id: ChatId,
    message_id: MessageId,
) -> Result<(), TelesaveError> {
    let updated = db
        .connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE messages SET forwarded = 1
                 WHERE chat_id = ?1 AND message_id = ?2 AND is_self_destructing = 1",
                params![chat_id.0, message_id.0],
            )
        })
        .await
        .map_err(map_tr_err)?;
    if updated == 0 {
        return Err(TelesaveError::Internal(format!(
            "no self-destructing message {message_id} in chat {chat_id}"
        )));
    }
    Ok(())
}

/// Self-destructing records whose forward has not succeeded yet.
pub async fn unforwarded_ephemeral(db: &Database) -> Result<Vec<MessageRecord>, TelesaveError> {
    db.connection()
        .call(|conn| {
            query_records(
                conn,
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages
                     WHERE is_self_destructing = 1 AND forwarded = 0
                     ORDER BY chat_id, message_id"
                ),
                [],
            )
        })
        .await
        .map_err(map_tr_err)
}

/// The newest `limit` records across all chats, newest first.
pub async fn recent_messages(
    db: &Database,
    limit: usize,
) -> Result<Vec<MessageRecord>, TelesaveError> {
    let limit = limit as i64;
    db.connection()
        .call(move |conn| {
            query_records(
                conn,
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages
                     ORDER BY sent_at DESC, message_id DESC LIMIT ?1"
                ),
                params![limit],
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Records of one chat in id order.
pub async fn chat_messages(
    db: &Database,
    chat_id: ChatId,
) -> Result<Vec<MessageRecord>, TelesaveError> {
    db.connection()
        .call(move |conn| {
            query_records(
                conn,
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages WHERE chat_id = ?1 ORDER BY message_id"
                ),
                params![chat_id.0],
            )
        })
        .await
        .map_err(map_tr_err)
}

pub async fn count_messages(db: &Database, chat_id: ChatId) -> Result<u64, TelesaveError> {
    let count: i64 = db
        .connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE chat_id = ?1",
                params![chat_id.0],
                |row| row.get(0),
            )
        })
        .await
        .map_err(map_tr_err)?;
    Ok(count.max(0) as u64)
}

/// Append an edit revision. A redelivered revision is ignored.
pub async fn record_edit(db: &Database, edit: &MessageEdit) -> Result<(), TelesaveError> {
    let edit = edit.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO message_edits (chat_id, message_id, text, edit_date)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    edit.chat_id.0,
                    edit.message_id.0,
                    edit.text,
                    format_ts(&edit.edit_date)
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Edit revisions of a message, oldest first.
pub async fn message_edits(
    db: &Database,
    chat_id: ChatId,
    message_id: MessageId,
) -> Result<Vec<MessageEdit>, TelesaveError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT text, edit_date FROM message_edits
                 WHERE chat_id = ?1 AND message_id = ?2 ORDER BY edit_date, id",
            )?;
            let rows = stmt.query_map(params![chat_id.0, message_id.0], |row| {
                let edit_date: String = row.get(1)?;
                Ok(MessageEdit {
                    chat_id,
                    message_id,
                    text: row.get(0)?,
                    edit_date: parse_ts(1, &edit_date)?,
                })
            })?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

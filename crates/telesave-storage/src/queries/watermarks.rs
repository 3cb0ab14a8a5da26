// SPDX-FileCopyrightText: 2026 Telesave Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-chat watermarks.

use rusqlite::{OptionalExtension, params};
use telesave_core::{ChatId, MessageId, TelesaveError, WalkState, Watermark};
use tracing::debug;

use crate::database::{Database, flatten_call_err, map_tr_err};

pub(crate) fn load_in(
    conn: &rusqlite::Connection,
    chat_id: ChatId,
) -> rusqlite::Result<Option<Watermark>> {
    conn.query_row(
        "SELECT last_synced_message_id, walk_direction, walk_cursor, full_history_complete,
                replay_epoch
         FROM watermarks WHERE chat_id = ?1",
        params![chat_id.0],
        |row| {
            let direction: String = row.get(1)?;
            let walk_state = WalkState::from_parts(&direction, row.get(2)?).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    1,
                    rusqlite::types::Type::Text,
                    format!("unknown walk direction `{direction}`").into(),
                )
            })?;
            Ok(Watermark {
                chat_id,
                last_synced_message_id: MessageId(row.get(0)?),
                walk_state,
                full_history_complete: row.get(3)?,
                replay_epoch: row.get(4)?,
            })
        },
    )
    .optional()
}

/// Advance inside an open transaction.
///
/// Fails with [`TelesaveError::StaleWatermark`] unless `next` strictly
/// progresses past the stored value.
pub(crate) fn advance_in(
    conn: &rusqlite::Connection,
    next: &Watermark,
) -> Result<(), TelesaveError> {
    let stored = load_in(conn, next.chat_id)
        .map_err(TelesaveError::storage)?
        .unwrap_or_else(|| Watermark::initial(next.chat_id));
    if !next.progresses_past(&stored) {
        return Err(TelesaveError::StaleWatermark {
            chat_id: next.chat_id,
            stored: stored.to_string(),
            attempted: next.to_string(),
        });
    }
    let cursor = match next.walk_state {
        WalkState::Incremental => next.last_synced_message_id.0,
        WalkState::Replay { cursor } => cursor.0,
    };
    conn.execute(
        "INSERT INTO watermarks
             (chat_id, last_synced_message_id, walk_direction, walk_cursor,
              full_history_complete, replay_epoch)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(chat_id) DO UPDATE SET
             last_synced_message_id = excluded.last_synced_message_id,
             walk_direction = excluded.walk_direction,
             walk_cursor = excluded.walk_cursor,
             full_history_complete = excluded.full_history_complete,
             replay_epoch = excluded.replay_epoch,
             updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
        params![
            next.chat_id.0,
            next.last_synced_message_id.0,
            next.walk_state.as_str(),
            cursor,
            next.full_history_complete,
            next.replay_epoch
        ],
    )
    .map_err(TelesaveError::storage)?;
    debug!(chat_id = %next.chat_id, watermark = %next, "watermark advanced");
    Ok(())
}

/// The stored watermark, or the initial one for a chat never synced.
pub async fn get_watermark(db: &Database, chat_id: ChatId) -> Result<Watermark, TelesaveError> {
    let stored = db
        .connection()
        .call(move |conn| load_in(conn, chat_id))
        .await
        .map_err(map_tr_err)?;
    Ok(stored.unwrap_or_else(|| Watermark::initial(chat_id)))
}

/// Durably advance a watermark on its own.
pub async fn advance_watermark(db: &Database, next: &Watermark) -> Result<(), TelesaveError> {
    let next = *next;
    db.connection()
        .call(move |conn| -> Result<(), TelesaveError> {
            let tx = conn.transaction().map_err(TelesaveError::storage)?;
            advance_in(&tx, &next)?;
            tx.commit().map_err(TelesaveError::storage)
        })
        .await
        .map_err(flatten_call_err)
}

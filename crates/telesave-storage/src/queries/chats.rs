// SPDX-FileCopyrightText: 2026 Telesave Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat registry.

use std::str::FromStr;

use rusqlite::{OptionalExtension, params};
use telesave_core::{Chat, ChatId, ChatKind, TelesaveError};

use crate::database::{Database, map_tr_err};

const CHAT_COLUMNS: &str = "chat_id, name, folder, kind, archived";

fn chat_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chat> {
    let kind: String = row.get(3)?;
    let kind = ChatKind::from_str(&kind).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Chat {
        id: ChatId(row.get(0)?),
        name: row.get(1)?,
        folder: row.get(2)?,
        kind,
        archived: row.get(4)?,
    })
}

/// Record a chat on first encounter and return the stored row.
///
/// Chats are immutable once discovered, so a renamed chat keeps its
/// original metadata.
pub async fn upsert_chat(db: &Database, chat: &Chat) -> Result<Chat, TelesaveError> {
    let chat = chat.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO chats (chat_id, name, folder, kind, archived)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    chat.id.0,
                    chat.name,
                    chat.folder,
                    chat.kind.to_string(),
                    chat.archived
                ],
            )?;
            conn.query_row(
                &format!("SELECT {CHAT_COLUMNS} FROM chats WHERE chat_id = ?1"),
                params![chat.id.0],
                chat_from_row,
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Look a chat up by id.
pub async fn get_chat(db: &Database, chat_id: ChatId) -> Result<Option<Chat>, TelesaveError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {CHAT_COLUMNS} FROM chats WHERE chat_id = ?1"),
                params![chat_id.0],
                chat_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// All known chats, ordered by id.
pub async fn list_chats(db: &Database) -> Result<Vec<Chat>, TelesaveError> {
    db.connection()
        .call(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {CHAT_COLUMNS} FROM chats ORDER BY chat_id"))?;
            let rows = stmt.query_map([], chat_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

// SPDX-FileCopyrightText: 2026 Telesave Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Blob index and attachment-source mapping.

use rusqlite::{OptionalExtension, params};
use telesave_core::{BlobRef, TelesaveError};

use crate::database::{Database, map_tr_err};

pub(crate) fn blob_from_row(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<BlobRef> {
    let size: i64 = row.get(offset + 2)?;
    Ok(BlobRef {
        content_hash: row.get(offset)?,
        mime_type: row.get(offset + 1)?,
        size: size.max(0) as u64,
        storage_path: row.get(offset + 3)?,
    })
}

/// Register a blob. A hash that is already indexed is left untouched.
pub(crate) fn insert_in(conn: &rusqlite::Connection, blob: &BlobRef) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO blobs (content_hash, mime_type, byte_len, storage_path)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            blob.content_hash,
            blob.mime_type,
            blob.size as i64,
            blob.storage_path
        ],
    )?;
    Ok(())
}

pub(crate) fn link_source_in(
    conn: &rusqlite::Connection,
    source_key: &str,
    content_hash: &str,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO attachment_sources (source_key, content_hash) VALUES (?1, ?2)",
        params![source_key, content_hash],
    )?;
    Ok(())
}

/// Look a blob up by content hash.
pub async fn find_blob(db: &Database, content_hash: &str) -> Result<Option<BlobRef>, TelesaveError> {
    let hash = content_hash.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT content_hash, mime_type, byte_len, storage_path
                 FROM blobs WHERE content_hash = ?1",
                params![hash],
                |row| blob_from_row(row, 0),
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Look a blob up by the service-side identity of the file it came from.
pub async fn blob_for_source(
    db: &Database,
    source_key: &str,
) -> Result<Option<BlobRef>, TelesaveError> {
    let key = source_key.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT b.content_hash, b.mime_type, b.byte_len, b.storage_path
                 FROM attachment_sources s JOIN blobs b ON b.content_hash = s.content_hash
                 WHERE s.source_key = ?1",
                params![key],
                |row| blob_from_row(row, 0),
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Storage paths of every indexed blob.
pub async fn list_blob_paths(db: &Database) -> Result<Vec<String>, TelesaveError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare("SELECT storage_path FROM blobs ORDER BY storage_path")?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

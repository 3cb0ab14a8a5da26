// SPDX-FileCopyrightText: 2026 Telesave Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connection management, PRAGMA setup and lifecycle.
//!
//! Every statement runs on tokio-rusqlite's single background thread, which
//! serialises all transactions. Do not open a second connection for writes.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use telesave_core::TelesaveError;
use tokio_rusqlite::Connection;
use tracing::debug;

use crate::migrations::run_migrations;

/// Handle to the archive database.
#[derive(Clone)]
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens (creating if needed) the database in WAL mode and migrates it.
    pub async fn open(path: &str) -> Result<Self, TelesaveError> {
        Self::open_with(path, true).await
    }

    /// Opens the database, choosing the journal mode.
    pub async fn open_with(path: &str, wal_mode: bool) -> Result<Self, TelesaveError> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(TelesaveError::storage)?;
        }

        let conn = Connection::open(path)
            .await
            .map_err(|e| TelesaveError::Storage {
                source: Box::new(e),
            })?;

        conn.call(move |conn| -> Result<(), TelesaveError> {
            let journal = if wal_mode { "WAL" } else { "DELETE" };
            let mode: String = conn
                .pragma_update_and_check(None, "journal_mode", journal, |row| row.get(0))
                .map_err(TelesaveError::storage)?;
            debug!(journal_mode = %mode, "journal mode set");
            conn.execute_batch(
                "PRAGMA synchronous = FULL;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;",
            )
            .map_err(TelesaveError::storage)?;
            run_migrations(conn)
        })
        .await
        .map_err(flatten_call_err)?;

        debug!(path, "database opened");
        Ok(Self { conn })
    }

    /// The underlying single-writer connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Checkpoints the WAL into the main file.
    pub async fn checkpoint(&self) -> Result<(), TelesaveError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.query_row("PRAGMA wal_checkpoint(TRUNCATE);", [], |_| Ok(()))?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Checkpoints and closes the connection.
    pub async fn close(self) -> Result<(), TelesaveError> {
        self.checkpoint().await?;
        self.conn
            .close()
            .await
            .map_err(|e| TelesaveError::Storage {
                source: e.to_string().into(),
            })?;
        debug!("database closed");
        Ok(())
    }
}

/// Convert a tokio-rusqlite error into `TelesaveError::Storage`.
pub fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> TelesaveError {
    TelesaveError::Storage {
        source: Box::new(e),
    }
}

/// Unwrap an error raised inside a call closure that already speaks
/// `TelesaveError`; connection-level failures become storage errors.
pub(crate) fn flatten_call_err(e: tokio_rusqlite::Error<TelesaveError>) -> TelesaveError {
    match e {
        tokio_rusqlite::Error::Error(inner) => inner,
        other => TelesaveError::Storage {
            source: other.to_string().into(),
        },
    }
}

/// Timestamps are stored as RFC 3339 UTC text with millisecond precision.
pub(crate) fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_ts(idx: usize, raw: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn open_creates_schema() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/archive.db");
        let db = Database::open(path.to_str().unwrap()).await.unwrap();

        let tables: Vec<String> = db
            .connection()
            .call(|conn| -> Result<Vec<String>, rusqlite::Error> {
                let mut stmt = conn.prepare(
                    "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
                     ORDER BY name",
                )?;
                let rows = stmt.query_map([], |row| row.get(0))?;
                rows.collect()
            })
            .await
            .unwrap();

        for expected in [
            "attachment_sources",
            "blobs",
            "chats",
            "message_edits",
            "message_media",
            "messages",
            "watermarks",
        ] {
            assert!(tables.iter().any(|t| t == expected), "missing {expected}");
        }
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn reopen_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("archive.db");
        let db = Database::open(path.to_str().unwrap()).await.unwrap();
        db.close().await.unwrap();
        let db = Database::open(path.to_str().unwrap()).await.unwrap();
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn pragmas_are_applied() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("p.db").to_str().unwrap())
            .await
            .unwrap();
        let (mode, fk, sync): (String, i64, i64) = db
            .connection()
            .call(|conn| -> Result<_, rusqlite::Error> {
                let mode = conn.query_row("PRAGMA journal_mode", [], |r| r.get(0))?;
                let fk = conn.query_row("PRAGMA foreign_keys", [], |r| r.get(0))?;
                let sync = conn.query_row("PRAGMA synchronous", [], |r| r.get(0))?;
                Ok((mode, fk, sync))
            })
            .await
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
        assert_eq!(fk, 1);
        assert_eq!(sync, 2, "synchronous = FULL");
        db.close().await.unwrap();
    }

    #[test]
    fn timestamps_round_trip_through_text() {
        let ts = DateTime::parse_from_rfc3339("2026-03-01T12:30:45.123Z")
            .unwrap()
            .with_timezone(&Utc);
        let text = format_ts(&ts);
        assert_eq!(text, "2026-03-01T12:30:45.123Z");
        assert_eq!(parse_ts(0, &text).unwrap(), ts);
    }
}

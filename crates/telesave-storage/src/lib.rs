// SPDX-FileCopyrightText: 2026 Telesave Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence for telesave.
//!
//! A WAL-mode SQLite database holds chats, message records, the blob index
//! and per-chat watermarks behind a single `tokio-rusqlite` writer. Media
//! bytes live in a content-addressed [`BlobSink`] next to it.

pub mod adapter;
pub mod blobs;
pub mod database;
pub mod migrations;
pub mod queries;

pub use adapter::SqliteArchive;
pub use blobs::BlobSink;
pub use database::Database;

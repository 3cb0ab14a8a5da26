// SPDX-FileCopyrightText: 2026 Telesave Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed queries over the archive tables.
//!
//! Each public function takes a [`Database`](crate::Database) and runs on its
//! single writer thread. The `*_in` helpers take a borrowed connection or
//! transaction so they can be composed inside one commit.

pub mod blobs;
pub mod chats;
pub mod messages;
pub mod watermarks;

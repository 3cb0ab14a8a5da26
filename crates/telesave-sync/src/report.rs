// SPDX-FileCopyrightText: 2026 Telesave Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Summary report printed when a sync run ends.

use std::fmt;

use serde::Serialize;
use telesave_core::{ChatId, Watermark};

use crate::state::ChatState;

/// Final state and counters for one chat.
#[derive(Debug, Clone, Serialize)]
pub struct ChatReport {
    pub chat_id: ChatId,
    pub name: String,
    pub state: ChatState,
    /// Why the chat stopped short of `Live`, if it did.
    pub reason: Option<String>,
    /// Records created during this run.
    pub archived: u64,
    /// Messages that were already archived when delivered.
    pub duplicates: u64,
    pub downloads: u64,
    pub forwarded: u64,
    pub forward_failures: u64,
    pub edits: u64,
    pub watermark: Option<Watermark>,
}

impl ChatReport {
    pub fn new(chat_id: ChatId, name: impl Into<String>) -> Self {
        Self {
            chat_id,
            name: name.into(),
            state: ChatState::Idle,
            reason: None,
            archived: 0,
            duplicates: 0,
            downloads: 0,
            forwarded: 0,
            forward_failures: 0,
            edits: 0,
            watermark: None,
        }
    }
}

/// Per-chat reports plus the run-level forward retry counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    /// Sorted by chat id.
    pub chats: Vec<ChatReport>,
    /// Pending forwards from earlier runs that went through.
    pub pending_forwards_retried: u64,
    /// Pending forwards from earlier runs that failed again.
    pub pending_forward_failures: u64,
}

impl SyncReport {
    pub fn chat(&self, chat_id: ChatId) -> Option<&ChatReport> {
        self.chats.iter().find(|c| c.chat_id == chat_id)
    }

    pub fn failed(&self) -> impl Iterator<Item = &ChatReport> {
        self.chats.iter().filter(|c| c.state == ChatState::Failed)
    }

    pub fn total_archived(&self) -> u64 {
        self.chats.iter().map(|c| c.archived).sum()
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .chats
            .iter()
            .map(|c| c.name.chars().count())
            .max()
            .unwrap_or(4)
            .clamp(4, 40);

        writeln!(
            f,
            "{:>14}  {:<width$}  {:<11}  {:>8}  {:>5}  {:>9}",
            "chat", "name", "state", "archived", "dupes", "forwarded"
        )?;
        for chat in &self.chats {
            let name: String = chat.name.chars().take(width).collect();
            write!(
                f,
                "{:>14}  {:<width$}  {:<11}  {:>8}  {:>5}  {:>9}",
                chat.chat_id.to_string(),
                name,
                chat.state.to_string(),
                chat.archived,
                chat.duplicates,
                chat.forwarded
            )?;
            if chat.forward_failures > 0 {
                write!(f, "  ({} forward failures)", chat.forward_failures)?;
            }
            if let Some(reason) = &chat.reason {
                write!(f, "  {reason}")?;
            }
            writeln!(f)?;
        }
        if self.pending_forwards_retried + self.pending_forward_failures > 0 {
            writeln!(
                f,
                "pending forwards: {} sent, {} failed",
                self.pending_forwards_retried, self.pending_forward_failures
            )?;
        }
        write!(f, "{} chats, {} new messages", self.chats.len(), self.total_archived())
    }
}

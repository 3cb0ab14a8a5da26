// SPDX-FileCopyrightText: 2026 Telesave Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared by the service adapters, the archive store and the
//! sync engine.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Identifier of a chat on the messaging service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a message within a chat. Never reused by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId(pub i64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the role of an adapter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Service,
    Storage,
}

// --- Chats ---

/// The kind of conversation a chat represents.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    /// One-to-one conversation with a user or bot.
    User,
    /// Group or supergroup.
    Group,
    /// Broadcast channel.
    Channel,
}

/// A conversation discovered on the service. Immutable once archived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: ChatId,
    pub name: String,
    /// Filesystem-safe slug of the name, kept for display and exports.
    pub folder: String,
    pub kind: ChatKind,
    pub archived: bool,
}

impl Chat {
    /// Builds a chat and derives its folder slug from the display name.
    pub fn new(id: ChatId, name: impl Into<String>, kind: ChatKind) -> Self {
        let name = name.into();
        let mut folder = slugify(&name);
        if folder.is_empty() {
            folder = format!("chat-{id}");
        }
        Self {
            id,
            name,
            folder,
            kind,
            archived: false,
        }
    }

    /// Marks the chat as archived on the service side.
    pub fn archived(mut self, archived: bool) -> Self {
        self.archived = archived;
        self
    }
}

/// Reduces a display name to characters that are safe in a directory name.
///
/// Keeps ASCII letters, digits, and `-_.() `; everything else is dropped.
pub fn slugify(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '(' | ')' | ' '))
        .collect::<String>()
        .trim()
        .to_string()
}

// --- Watermarks ---

/// Page direction when requesting history from the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum WalkDirection {
    /// Oldest to newest: ids strictly greater than the cursor, ascending.
    Forward,
    /// Newest to oldest: ids strictly smaller than the cursor, descending.
    Backward,
}

/// Which history a walk covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WalkMode {
    /// Everything newer than the stored watermark.
    #[default]
    Incremental,
    /// The whole history from the absolute start (`--all`).
    FullHistory,
}

/// Persisted direction state of a chat's walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalkState {
    /// Walking forward from `last_synced_message_id`.
    Incremental,
    /// Replaying from the absolute start; `cursor` is the last replayed id.
    Replay { cursor: MessageId },
}

impl WalkState {
    /// Name stored in the `walk_direction` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            WalkState::Incremental => "incremental",
            WalkState::Replay { .. } => "replay",
        }
    }

    /// Rebuilds the state from its stored column pair.
    pub fn from_parts(direction: &str, cursor: i64) -> Option<Self> {
        match direction {
            "incremental" => Some(WalkState::Incremental),
            "replay" => Some(WalkState::Replay {
                cursor: MessageId(cursor),
            }),
            _ => None,
        }
    }
}

/// Durable per-chat sync cursor.
///
/// A value of `MessageId(0)` means nothing has been synced yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watermark {
    pub chat_id: ChatId,
    pub last_synced_message_id: MessageId,
    pub walk_state: WalkState,
    /// Whether the current full walk has reached the end of history.
    pub full_history_complete: bool,
    /// Number of full-history replays started for this chat.
    pub replay_epoch: u32,
}

impl Watermark {
    /// The watermark of a chat that has never been synced.
    pub fn initial(chat_id: ChatId) -> Self {
        Self {
            chat_id,
            last_synced_message_id: MessageId(0),
            walk_state: WalkState::Incremental,
            full_history_complete: false,
            replay_epoch: 0,
        }
    }

    /// The exclusive id bound the next forward page starts from.
    pub fn cursor(&self) -> MessageId {
        match self.walk_state {
            WalkState::Incremental => self.last_synced_message_id,
            WalkState::Replay { cursor } => cursor,
        }
    }

    /// Ordering key used to decide whether one watermark progresses past another.
    ///
    /// The replay epoch dominates, so a new replay is accepted on top of a
    /// completed watermark. Within an epoch completion comes next, then the
    /// highest synced id, then replay progress. Entering a replay ranks above
    /// the incremental state it started from, so a replay can commit ids
    /// below `last_synced_message_id`.
    pub fn position(&self) -> (u32, bool, i64, i64) {
        let replay_rank = match self.walk_state {
            WalkState::Incremental => 0,
            WalkState::Replay { cursor } => cursor.0.saturating_add(1),
        };
        (
            self.replay_epoch,
            self.full_history_complete,
            self.last_synced_message_id.0,
            replay_rank,
        )
    }

    /// True when `self` is strictly ahead of `stored`.
    pub fn progresses_past(&self, stored: &Watermark) -> bool {
        self.position() > stored.position()
    }

    /// The watermark after committing `message_id` in walk order.
    pub fn after_commit(&self, message_id: MessageId) -> Watermark {
        let last = self.last_synced_message_id.max(message_id);
        let walk_state = match self.walk_state {
            WalkState::Incremental => WalkState::Incremental,
            WalkState::Replay { cursor } => WalkState::Replay {
                cursor: cursor.max(message_id),
            },
        };
        Watermark {
            last_synced_message_id: last,
            walk_state,
            ..*self
        }
    }

    /// Starts (or keeps) a replay from the absolute beginning of history.
    ///
    /// A new replay opens the next epoch and clears completion until the
    /// replay reaches the end again. A replay already in progress is kept.
    pub fn begin_replay(&self) -> Watermark {
        match self.walk_state {
            WalkState::Replay { .. } => *self,
            WalkState::Incremental => Watermark {
                walk_state: WalkState::Replay {
                    cursor: MessageId(0),
                },
                full_history_complete: false,
                replay_epoch: self.replay_epoch.saturating_add(1),
                ..*self
            },
        }
    }

    /// Whether a replay is in progress.
    pub fn is_replaying(&self) -> bool {
        matches!(self.walk_state, WalkState::Replay { .. })
    }

    /// The watermark once the walk reached the end of history.
    pub fn completed(&self) -> Watermark {
        Watermark {
            walk_state: WalkState::Incremental,
            full_history_complete: true,
            ..*self
        }
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "last={} {}@{} complete={} epoch={}",
            self.last_synced_message_id,
            self.walk_state.as_str(),
            self.cursor(),
            self.full_history_complete,
            self.replay_epoch
        )
    }
}

// --- Blobs and messages ---

/// Reference to a content-addressed blob. Keyed by `content_hash`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobRef {
    /// Lowercase hex SHA-256 of the blob bytes.
    pub content_hash: String,
    pub mime_type: String,
    pub size: u64,
    /// Path relative to the blob root.
    pub storage_path: String,
}

/// Metadata the service attaches to a message beyond the core fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageExtra {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub silent: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub from_scheduled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edit_date: Option<DateTime<Utc>>,
    /// Seconds until the service destroys the message, when ephemeral.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_destruct_ttl: Option<u32>,
}

impl MessageExtra {
    pub fn is_empty(&self) -> bool {
        *self == MessageExtra::default()
    }
}

/// An archived message. Keyed by `(chat_id, message_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    /// `None` for messages sent by the archiving account itself.
    pub sender_id: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub text: Option<String>,
    pub media_refs: Vec<BlobRef>,
    pub is_self_destructing: bool,
    /// Only field mutated after creation, and only false to true.
    pub forwarded: bool,
    pub extra: MessageExtra,
}

/// Attachment descriptor as delivered by the service, before download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAttachment {
    /// Handle used to download the bytes. May change between sessions.
    pub remote_ref: String,
    /// Stable identity of the remote file, used to skip known downloads.
    pub source_key: String,
    /// Content hash when the service advertises one.
    pub content_hash: Option<String>,
    pub mime_type: String,
    pub size: Option<u64>,
}

/// A message exactly as the service delivered it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub sender_id: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub text: Option<String>,
    pub attachments: Vec<RawAttachment>,
    /// Service-provided self-destruct flag.
    pub ephemeral: bool,
    pub extra: MessageExtra,
}

/// One page of chat history.
#[derive(Debug, Clone, Default)]
pub struct HistoryPage {
    pub messages: Vec<RawMessage>,
    /// Cursor for the next page in the same direction.
    pub next_cursor: Option<MessageId>,
    pub has_more: bool,
}

/// Event pushed by a live subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveEvent {
    NewMessage(RawMessage),
    /// A message the service announced as self-destructing.
    SelfDestruct(RawMessage),
    MessageEdited(MessageEdit),
}

impl LiveEvent {
    pub fn chat_id(&self) -> ChatId {
        match self {
            LiveEvent::NewMessage(m) | LiveEvent::SelfDestruct(m) => m.chat_id,
            LiveEvent::MessageEdited(e) => e.chat_id,
        }
    }
}

/// A text revision observed after a message was archived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEdit {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub text: Option<String>,
    pub edit_date: DateTime<Utc>,
}

/// The account the service session is authenticated as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInfo {
    pub user_id: i64,
    pub display_name: String,
}

/// Where self-destructing messages are forwarded to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardDestination {
    /// The archiving account's own "saved messages".
    SavedMessages,
    Chat(ChatId),
}

/// A file to upload as part of an outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFile {
    pub path: PathBuf,
    pub mime_type: String,
}

/// Content of an outbound message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboundContent {
    pub text: Option<String>,
    pub files: Vec<OutboundFile>,
}

// --- Record store commits ---

/// Everything the record store persists for one ingested message.
#[derive(Debug, Clone)]
pub struct CommitRequest {
    pub record: MessageRecord,
    /// `(source_key, content_hash)` pairs to remember for future downloads.
    pub sources: Vec<(String, String)>,
    /// Watermark to advance in the same transaction, if the commit progresses it.
    pub watermark: Option<Watermark>,
}

/// Result of [`ArchiveStore::commit_message`](crate::ArchiveStore::commit_message).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The record was created by this commit.
    Created(MessageRecord),
    /// A record with the same key already existed; nothing was written.
    Existing(MessageRecord),
}

impl CommitOutcome {
    pub fn record(&self) -> &MessageRecord {
        match self {
            CommitOutcome::Created(r) | CommitOutcome::Existing(r) => r,
        }
    }

    pub fn into_record(self) -> MessageRecord {
        match self {
            CommitOutcome::Created(r) | CommitOutcome::Existing(r) => r,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, CommitOutcome::Created(_))
    }
}

// SPDX-FileCopyrightText: 2026 Telesave Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversion of Bot API updates into telesave's raw message model.

use std::collections::BTreeMap;

use telesave_core::{
    Chat, ChatId, ChatKind, HistoryPage, MessageEdit, MessageExtra, MessageId, RawMessage,
    WalkDirection,
};
use teloxide::prelude::*;
use teloxide::types::Chat as TgChat;

use crate::media;

/// Display name of a Telegram chat: title, full name or username.
pub fn display_name(chat: &TgChat) -> String {
    if let Some(title) = chat.title() {
        return title.to_string();
    }
    let full: Vec<&str> = [chat.first_name(), chat.last_name()]
        .into_iter()
        .flatten()
        .collect();
    if !full.is_empty() {
        return full.join(" ");
    }
    chat.username()
        .map(|u| format!("@{u}"))
        .unwrap_or_else(|| format!("chat {}", chat.id.0))
}

/// Maps a Telegram chat onto a telesave chat.
///
/// The Bot API has no notion of archived chats, so `archived` is always false.
pub fn chat_of(chat: &TgChat) -> Chat {
    let kind = if chat.is_channel() {
        ChatKind::Channel
    } else if chat.is_group() || chat.is_supergroup() {
        ChatKind::Group
    } else {
        ChatKind::User
    };
    Chat::new(ChatId(chat.id.0), display_name(chat), kind)
}

/// Converts a Telegram message into a [`RawMessage`].
///
/// The sender is left empty for messages sent by the session's own account.
/// Bot API updates carry no self-destruct timer, so `ephemeral` is false.
pub fn to_raw_message(msg: &Message, own_id: Option<UserId>) -> RawMessage {
    let sender_id = msg
        .from
        .as_ref()
        .filter(|user| Some(user.id) != own_id)
        .map(|user| user.id.0 as i64);

    RawMessage {
        id: MessageId(i64::from(msg.id.0)),
        chat_id: ChatId(msg.chat.id.0),
        sender_id,
        timestamp: msg.date,
        text: msg.text().or_else(|| msg.caption()).map(str::to_string),
        attachments: media::attachments_of(msg),
        ephemeral: false,
        extra: MessageExtra {
            edit_date: msg.edit_date().copied(),
            ..MessageExtra::default()
        },
    }
}

/// Converts an edited-message update into an edit revision.
pub fn to_edit(msg: &Message) -> MessageEdit {
    MessageEdit {
        chat_id: ChatId(msg.chat.id.0),
        message_id: MessageId(i64::from(msg.id.0)),
        text: msg.text().or_else(|| msg.caption()).map(str::to_string),
        edit_date: msg.edit_date().copied().unwrap_or(msg.date),
    }
}

/// One history page out of the messages observed for a chat.
///
/// `cursor` is exclusive: forward pages ascend from above it, backward
/// pages descend from below it (`None` means the newest message).
pub fn page_of(
    history: &BTreeMap<i64, RawMessage>,
    cursor: Option<MessageId>,
    direction: WalkDirection,
    page_size: usize,
) -> HistoryPage {
    let mut candidates: Box<dyn Iterator<Item = &RawMessage>> = match direction {
        WalkDirection::Forward => {
            let after = cursor.map_or(i64::MIN, |c| c.0);
            Box::new(
                history
                    .range((std::ops::Bound::Excluded(after), std::ops::Bound::Unbounded))
                    .map(|(_, m)| m),
            )
        }
        WalkDirection::Backward => {
            let before = cursor.map_or(i64::MAX, |c| c.0);
            Box::new(history.range(..before).rev().map(|(_, m)| m))
        }
    };

    let messages: Vec<RawMessage> = candidates.by_ref().take(page_size).cloned().collect();
    let has_more = candidates.next().is_some();
    HistoryPage {
        next_cursor: messages.last().map(|m| m.id),
        messages,
        has_more,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a mock private chat message from JSON, matching Telegram Bot API structure.
    fn make_private_message(user_id: u64, message_id: i32, text: &str) -> Message {
        let json = serde_json::json!({
            "message_id": message_id,
            "date": 1700000000i64,
            "chat": {
                "id": user_id as i64,
                "type": "private",
                "first_name": "Test",
                "last_name": "User",
            },
            "from": {
                "id": user_id,
                "is_bot": false,
                "first_name": "Test",
            },
            "text": text,
        });

        serde_json::from_value(json).expect("failed to deserialize mock message")
    }

    /// Build a mock group photo message with a caption.
    fn make_group_photo() -> Message {
        let json = serde_json::json!({
            "message_id": 7,
            "date": 1700000000i64,
            "chat": {
                "id": -100123i64,
                "type": "supergroup",
                "title": "Test Group",
            },
            "from": {
                "id": 555u64,
                "is_bot": false,
                "first_name": "Test",
            },
            "caption": "holiday",
            "photo": [
                {"file_id": "small", "file_unique_id": "u-small", "width": 90, "height": 90, "file_size": 100},
                {"file_id": "large", "file_unique_id": "u-large", "width": 900, "height": 900, "file_size": 9000},
            ],
        });

        serde_json::from_value(json).expect("failed to deserialize mock group message")
    }

    fn raw(id: i64) -> RawMessage {
        RawMessage {
            id: MessageId(id),
            chat_id: ChatId(1),
            sender_id: None,
            timestamp: chrono::DateTime::from_timestamp(1_700_000_000 + id, 0).unwrap(),
            text: None,
            attachments: vec![],
            ephemeral: false,
            extra: MessageExtra::default(),
        }
    }

    #[test]
    fn private_chat_maps_to_user_with_full_name() {
        let msg = make_private_message(12345, 1, "hello");
        let chat = chat_of(&msg.chat);
        assert_eq!(chat.id, ChatId(12345));
        assert_eq!(chat.kind, ChatKind::User);
        assert_eq!(chat.name, "Test User");
        assert_eq!(chat.folder, "Test User");
        assert!(!chat.archived);
    }

    #[test]
    fn text_message_maps_fields() {
        let msg = make_private_message(12345, 3, "hello");
        let raw = to_raw_message(&msg, None);
        assert_eq!(raw.id, MessageId(3));
        assert_eq!(raw.chat_id, ChatId(12345));
        assert_eq!(raw.sender_id, Some(12345));
        assert_eq!(raw.text.as_deref(), Some("hello"));
        assert!(raw.attachments.is_empty());
        assert!(!raw.ephemeral);
        assert_eq!(raw.timestamp.timestamp(), 1_700_000_000);
    }

    #[test]
    fn own_messages_have_no_sender() {
        let msg = make_private_message(12345, 3, "note to self");
        let raw = to_raw_message(&msg, Some(UserId(12345)));
        assert_eq!(raw.sender_id, None);
    }

    #[test]
    fn photo_keeps_largest_size_and_caption() {
        let msg = make_group_photo();
        let chat = chat_of(&msg.chat);
        assert_eq!(chat.kind, ChatKind::Group);
        assert_eq!(chat.name, "Test Group");

        let raw = to_raw_message(&msg, None);
        assert_eq!(raw.text.as_deref(), Some("holiday"));
        assert_eq!(raw.attachments.len(), 1);
        let photo = &raw.attachments[0];
        assert_eq!(photo.remote_ref, "large");
        assert_eq!(photo.source_key, "u-large");
        assert_eq!(photo.size, Some(9000));
        assert_eq!(photo.mime_type, "image/jpeg");
    }

    #[test]
    fn pages_respect_exclusive_cursor() {
        let history: BTreeMap<i64, RawMessage> = (1..=5).map(|id| (id, raw(id))).collect();

        let forward = page_of(&history, Some(MessageId(2)), WalkDirection::Forward, 2);
        let ids: Vec<i64> = forward.messages.iter().map(|m| m.id.0).collect();
        assert_eq!(ids, vec![3, 4]);
        assert!(forward.has_more);
        assert_eq!(forward.next_cursor, Some(MessageId(4)));

        let newest = page_of(&history, None, WalkDirection::Backward, 1);
        assert_eq!(newest.messages[0].id, MessageId(5));
        assert!(newest.has_more);

        let tail = page_of(&history, Some(MessageId(4)), WalkDirection::Forward, 10);
        assert_eq!(tail.messages.len(), 1);
        assert!(!tail.has_more);

        let empty = page_of(&BTreeMap::new(), None, WalkDirection::Forward, 10);
        assert!(empty.messages.is_empty());
        assert_eq!(empty.next_cursor, None);
    }
}

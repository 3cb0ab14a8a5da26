// SPDX-FileCopyrightText: 2026 Telesave Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `telesave log` command implementation.

use std::collections::HashMap;

use colored::Colorize;
use telesave_config::model::TelesaveConfig;
use telesave_core::{ArchiveStore, ChatId, MessageRecord, TelesaveError};
use telesave_storage::SqliteArchive;

/// Prints the last `count` archived messages, oldest first.
pub async fn run_log(config: &TelesaveConfig, count: usize) -> Result<(), TelesaveError> {
    let store = SqliteArchive::new(config.storage.clone());
    store.initialize().await?;

    let names: HashMap<ChatId, String> = store
        .list_chats()
        .await?
        .into_iter()
        .map(|chat| (chat.id, chat.name))
        .collect();

    let mut records = store.recent_messages(count).await?;
    records.reverse();

    for record in &records {
        let chat = names
            .get(&record.chat_id)
            .map(String::as_str)
            .unwrap_or("?");
        println!("{} {}", format!("[{chat}]").cyan(), format_record(record));
    }
    if records.is_empty() {
        println!("{}", "no archived messages".dimmed());
    }

    store.close().await
}

/// `datetime - sender - text|media [silent] [scheduled] [edited]`
pub fn format_record(record: &MessageRecord) -> String {
    let sender = record
        .sender_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "me".to_string());

    let body = match (&record.text, record.media_refs.as_slice()) {
        (Some(text), []) => text.clone(),
        (Some(text), media) => format!("{text} <{} media>", media.len()),
        (None, [single]) => format!("<{}>", single.mime_type),
        (None, []) => "<empty>".to_string(),
        (None, media) => format!("<{} media>", media.len()),
    };

    let mut line = format!(
        "{} - {sender} - {body}",
        record.timestamp.format("%Y-%m-%d %H:%M:%S")
    );
    if record.extra.silent {
        line.push_str(" [silent]");
    }
    if record.extra.from_scheduled {
        line.push_str(" [scheduled]");
    }
    if record.extra.edit_date.is_some() {
        line.push_str(" [edited]");
    }
    if record.is_self_destructing {
        line.push_str(" [self-destructing]");
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use telesave_core::{BlobRef, MessageExtra, MessageId};

    fn record(text: Option<&str>) -> MessageRecord {
        MessageRecord {
            chat_id: ChatId(1),
            message_id: MessageId(7),
            sender_id: Some(42),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap(),
            text: text.map(str::to_string),
            media_refs: vec![],
            is_self_destructing: false,
            forwarded: false,
            extra: MessageExtra::default(),
        }
    }

    fn photo() -> BlobRef {
        BlobRef {
            content_hash: "ab".repeat(32),
            mime_type: "image/jpeg".into(),
            size: 10,
            storage_path: format!("ab/{}", "ab".repeat(32)),
        }
    }

    #[test]
    fn plain_text_line() {
        assert_eq!(
            format_record(&record(Some("hello"))),
            "2024-03-01 12:30:05 - 42 - hello"
        );
    }

    #[test]
    fn own_messages_and_media() {
        let mut r = record(None);
        r.sender_id = None;
        r.media_refs = vec![photo()];
        assert_eq!(format_record(&r), "2024-03-01 12:30:05 - me - <image/jpeg>");

        r.text = Some("look".into());
        r.media_refs.push(photo());
        assert!(format_record(&r).ends_with("look <2 media>"));
    }

    #[test]
    fn flags_are_appended_in_order() {
        let mut r = record(Some("x"));
        r.extra.silent = true;
        r.extra.from_scheduled = true;
        r.extra.edit_date = Some(Utc::now());
        assert!(format_record(&r).ends_with("x [silent] [scheduled] [edited]"));
    }
}

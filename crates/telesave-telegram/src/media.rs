// SPDX-FileCopyrightText: 2026 Telesave Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Attachment descriptors and downloads for Telegram messages.
//!
//! Each supported media kind becomes a [`RawAttachment`] keyed by the
//! file's `unique_id`, which Telegram keeps stable across bots and chats.

use telesave_core::{RawAttachment, TelesaveError};
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{FileId, FileMeta};
use tracing::debug;

/// Describes a file without downloading it.
pub fn attachment(file: &FileMeta, mime_type: impl Into<String>) -> RawAttachment {
    RawAttachment {
        remote_ref: file.id.to_string(),
        source_key: file.unique_id.0.clone(),
        content_hash: None,
        mime_type: mime_type.into(),
        size: Some(u64::from(file.size)),
    }
}

/// All attachments carried by `msg`, in a stable order.
///
/// For photos only the largest size (last in the array) is archived.
pub fn attachments_of(msg: &Message) -> Vec<RawAttachment> {
    let mut found = Vec::new();

    if let Some(largest) = msg.photo().and_then(|sizes| sizes.last()) {
        found.push(attachment(&largest.file, "image/jpeg"));
    }
    if let Some(doc) = msg.document() {
        found.push(attachment(
            &doc.file,
            mime_or(doc.mime_type.as_ref(), "application/octet-stream"),
        ));
    }
    if let Some(video) = msg.video() {
        found.push(attachment(
            &video.file,
            mime_or(video.mime_type.as_ref(), "video/mp4"),
        ));
    }
    if let Some(audio) = msg.audio() {
        found.push(attachment(
            &audio.file,
            mime_or(audio.mime_type.as_ref(), "audio/mpeg"),
        ));
    }
    if let Some(voice) = msg.voice() {
        found.push(attachment(
            &voice.file,
            mime_or(voice.mime_type.as_ref(), "audio/ogg"),
        ));
    }
    if let Some(animation) = msg.animation() {
        found.push(attachment(
            &animation.file,
            mime_or(animation.mime_type.as_ref(), "video/mp4"),
        ));
    }
    if let Some(note) = msg.video_note() {
        found.push(attachment(&note.file, "video/mp4"));
    }
    if let Some(sticker) = msg.sticker() {
        found.push(attachment(&sticker.file, "image/webp"));
    }

    found
}

fn mime_or<M: ToString>(mime: Option<&M>, fallback: &str) -> String {
    mime.map(|m| m.to_string())
        .unwrap_or_else(|| fallback.to_string())
}

/// Downloads a file from Telegram servers by its file id.
///
/// Uses the Bot API's `getFile` to resolve the file path, then downloads
/// the file content as bytes.
pub async fn download(bot: &Bot, attachment: &RawAttachment) -> Result<Vec<u8>, TelesaveError> {
    let file = bot
        .get_file(FileId(attachment.remote_ref.clone()))
        .await
        .map_err(crate::map_request_error)?;

    let mut buf = Vec::new();
    bot.download_file(&file.path, &mut buf)
        .await
        .map_err(|e| TelesaveError::TransientNetwork {
            message: format!("failed to download file: {e}"),
        })?;

    debug!(
        file_id = %attachment.remote_ref,
        size = buf.len(),
        "downloaded file from Telegram"
    );
    Ok(buf)
}

// SPDX-FileCopyrightText: 2026 Telesave Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ingestion pipeline: one raw message in, one durable record out.
//!
//! Backfill and live delivery both go through [`ingest`], so redelivery of
//! a message is always a no-op apart from watermark bookkeeping.

use telesave_core::{
    BlobRef, ChatId, CommitRequest, MessageEdit, MessageRecord, RawAttachment, RawMessage,
    TelesaveError, Watermark,
};
use telesave_storage::BlobSink;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::context::SyncContext;
use crate::interceptor::ForwardOutcome;
use crate::retry::call_with_retry;

/// Result of ingesting one message.
#[derive(Debug)]
pub struct Ingested {
    pub record: MessageRecord,
    /// False when the record was already archived.
    pub created: bool,
    /// The chat's watermark after this message.
    pub watermark: Watermark,
    /// Attachments fetched from the service for this message.
    pub downloads: usize,
    /// True when this call forwarded the record.
    pub forwarded_now: bool,
    /// Recoverable forward failure; the record is archived regardless.
    pub forward_error: Option<TelesaveError>,
    /// True when a re-fetched archived message carried new text.
    pub edited: bool,
}

/// Persist `raw` exactly once and advance the chat's watermark past it.
///
/// `watermark` is the caller's current view of the chat's stored watermark.
/// The record, its blob references and the watermark advance are committed
/// together; forwarding of self-destructing messages happens after commit.
pub async fn ingest(
    ctx: &SyncContext,
    raw: RawMessage,
    watermark: &Watermark,
    cancel: &CancellationToken,
) -> Result<Ingested, TelesaveError> {
    let chat_id = raw.chat_id;
    let message_id = raw.id;
    let next = watermark.after_commit(message_id);
    let advance = next.progresses_past(watermark).then_some(next);

    if let Some(existing) = ctx.store.get_message(chat_id, message_id).await? {
        debug!(%chat_id, %message_id, "already archived");
        let edited = record_changed_text(ctx, &existing, &raw).await?;
        let mut ingested = finish_existing(ctx, existing, watermark, advance, cancel).await?;
        ingested.edited = edited;
        return Ok(ingested);
    }

    let mut media_refs = Vec::with_capacity(raw.attachments.len());
    let mut sources = Vec::with_capacity(raw.attachments.len());
    let mut downloads = 0;
    for attachment in &raw.attachments {
        let (blob, downloaded) = resolve_attachment(ctx, chat_id, attachment, cancel).await?;
        if downloaded {
            downloads += 1;
        }
        sources.push((attachment.source_key.clone(), blob.content_hash.clone()));
        media_refs.push(blob);
    }

    let record = MessageRecord {
        chat_id,
        message_id,
        sender_id: raw.sender_id,
        timestamp: raw.timestamp,
        text: raw.text,
        media_refs,
        is_self_destructing: raw.ephemeral,
        forwarded: false,
        extra: raw.extra,
    };

    let outcome = ctx
        .store
        .commit_message(CommitRequest {
            record,
            sources,
            watermark: advance,
        })
        .await?;

    if !outcome.is_created() {
        // Lost a race with another delivery of the same message.
        return finish_existing(ctx, outcome.into_record(), watermark, advance, cancel).await;
    }

    let mut record = outcome.into_record();
    debug!(%chat_id, %message_id, ephemeral = record.is_self_destructing, "committed");
    let (forwarded_now, forward_error) = forward_if_needed(ctx, &mut record, cancel).await?;

    Ok(Ingested {
        record,
        created: true,
        watermark: advance.unwrap_or(*watermark),
        downloads,
        forwarded_now,
        forward_error,
        edited: false,
    })
}

async fn finish_existing(
    ctx: &SyncContext,
    mut record: MessageRecord,
    watermark: &Watermark,
    advance: Option<Watermark>,
    cancel: &CancellationToken,
) -> Result<Ingested, TelesaveError> {
    if let Some(next) = advance {
        ctx.store.advance_watermark(&next).await?;
    }
    let (forwarded_now, forward_error) = forward_if_needed(ctx, &mut record, cancel).await?;
    Ok(Ingested {
        record,
        created: false,
        watermark: advance.unwrap_or(*watermark),
        downloads: 0,
        forwarded_now,
        forward_error,
        edited: false,
    })
}

/// Append an edit revision when a re-fetched message no longer matches the
/// latest text known for it. The archived record itself is never rewritten.
async fn record_changed_text(
    ctx: &SyncContext,
    existing: &MessageRecord,
    raw: &RawMessage,
) -> Result<bool, TelesaveError> {
    let edits = ctx
        .store
        .message_edits(existing.chat_id, existing.message_id)
        .await?;
    let latest = edits
        .last()
        .map_or(existing.text.as_deref(), |edit| edit.text.as_deref());
    if latest == raw.text.as_deref() {
        return Ok(false);
    }

    let edit = MessageEdit {
        chat_id: existing.chat_id,
        message_id: existing.message_id,
        text: raw.text.clone(),
        edit_date: raw.extra.edit_date.unwrap_or_else(chrono::Utc::now),
    };
    ctx.store.record_edit(&edit).await?;
    debug!(chat_id = %edit.chat_id, message_id = %edit.message_id, "changed text recorded as edit");
    Ok(true)
}

/// Forward a self-destructing record that has not been forwarded yet.
///
/// Returns whether a forward was sent, plus the recoverable failure if one
/// occurred. Authentication failures and cancellation are returned as errors.
pub(crate) async fn forward_if_needed(
    ctx: &SyncContext,
    record: &mut MessageRecord,
    cancel: &CancellationToken,
) -> Result<(bool, Option<TelesaveError>), TelesaveError> {
    if !record.is_self_destructing || record.forwarded || !ctx.interceptor.is_enabled() {
        return Ok((false, None));
    }

    let options = &ctx.options;
    let outcome = ctx
        .interceptor
        .forward(
            ctx.service.as_ref(),
            &ctx.blobs,
            record,
            &options.retry,
            options.call_timeout,
            cancel,
        )
        .await;

    match outcome {
        Ok(ForwardOutcome::Sent(_)) => {
            ctx.store
                .mark_forwarded(record.chat_id, record.message_id)
                .await?;
            record.forwarded = true;
            Ok((true, None))
        }
        Ok(ForwardOutcome::Disabled) => Ok((false, None)),
        Err(e @ TelesaveError::ForwardFailure { .. }) => {
            warn!(
                chat_id = %record.chat_id,
                message_id = %record.message_id,
                error = %e,
                "forward failed, message kept for a later retry"
            );
            Ok((false, Some(e)))
        }
        Err(e) => Err(e),
    }
}

/// Find or fetch the blob for one attachment. The flag reports a download.
async fn resolve_attachment(
    ctx: &SyncContext,
    chat_id: ChatId,
    attachment: &RawAttachment,
    cancel: &CancellationToken,
) -> Result<(BlobRef, bool), TelesaveError> {
    if let Some(hash) = attachment.content_hash.as_deref()
        && let Some(blob) = ctx.store.find_blob(hash).await?
    {
        debug!(%chat_id, hash, "attachment known by hash");
        return Ok((blob, false));
    }
    if let Some(blob) = ctx.store.blob_for_source(&attachment.source_key).await? {
        debug!(%chat_id, source = %attachment.source_key, "attachment known by source");
        return Ok((blob, false));
    }

    let options = &ctx.options;
    let service = ctx.service.as_ref();
    let bytes = call_with_retry(
        &options.retry,
        options.call_timeout,
        cancel,
        chat_id,
        "download",
        || service.download_attachment(attachment),
    )
    .await?;

    let hash = BlobSink::content_hash(&bytes);
    let guard = ctx.blobs.lock(&hash).await;
    let stored = match ctx.store.find_blob(&hash).await {
        Ok(Some(blob)) => Ok(blob),
        Ok(None) => ctx.blobs.store(&hash, &bytes, &attachment.mime_type).await,
        Err(e) => Err(e),
    };
    drop(guard);
    ctx.blobs.release(&hash);

    Ok((stored?, true))
}

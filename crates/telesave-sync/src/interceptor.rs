// SPDX-FileCopyrightText: 2026 Telesave Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Forwarding of self-destructing messages to an archival destination.

use std::time::Duration;

use telesave_core::{
    ForwardDestination, MessageId, MessageRecord, MessagingService, OutboundContent, OutboundFile,
    TelesaveError,
};
use telesave_storage::BlobSink;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::retry::{RetryPolicy, call_with_retry};

/// What a forward attempt did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardOutcome {
    /// The service accepted the forward under this id.
    Sent(MessageId),
    /// Forwarding is switched off; nothing was sent.
    Disabled,
}

/// Stateless forwarder. Callers check `forwarded` before invoking it.
#[derive(Debug, Clone, Copy)]
pub struct SelfDestructInterceptor {
    enabled: bool,
    destination: ForwardDestination,
}

impl SelfDestructInterceptor {
    pub fn new(enabled: bool, destination: ForwardDestination) -> Self {
        Self {
            enabled,
            destination,
        }
    }

    pub fn disabled() -> Self {
        Self::new(false, ForwardDestination::SavedMessages)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn destination(&self) -> ForwardDestination {
        self.destination
    }

    /// The message sent to the destination for `record`.
    pub fn content_for(&self, record: &MessageRecord, blobs: &BlobSink) -> OutboundContent {
        let mut text = format!(
            "self-destructing message {} from chat {} ({})",
            record.message_id,
            record.chat_id,
            record.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
        );
        if let Some(body) = record.text.as_deref().filter(|t| !t.is_empty()) {
            text.push_str("\n\n");
            text.push_str(body);
        }
        OutboundContent {
            text: Some(text),
            files: record
                .media_refs
                .iter()
                .map(|blob| OutboundFile {
                    path: blobs.absolute_path(&blob.storage_path),
                    mime_type: blob.mime_type.clone(),
                })
                .collect(),
        }
    }

    /// Forward `record` to the archival destination.
    ///
    /// Service failures come back as [`TelesaveError::ForwardFailure`];
    /// authentication failures and cancellation pass through unchanged.
    pub async fn forward(
        &self,
        service: &dyn MessagingService,
        blobs: &BlobSink,
        record: &MessageRecord,
        retry: &RetryPolicy,
        call_timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ForwardOutcome, TelesaveError> {
        if !self.enabled {
            return Ok(ForwardOutcome::Disabled);
        }

        let content = self.content_for(record, blobs);
        let sent = call_with_retry(
            retry,
            call_timeout,
            cancel,
            record.chat_id,
            "forward",
            || service.send_message(&self.destination, content.clone()),
        )
        .await;

        match sent {
            Ok(id) => {
                info!(
                    chat_id = %record.chat_id,
                    message_id = %record.message_id,
                    forwarded_as = %id,
                    "self-destructing message forwarded"
                );
                Ok(ForwardOutcome::Sent(id))
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(TelesaveError::Cancelled) => Err(TelesaveError::Cancelled),
            Err(e) => Err(TelesaveError::ForwardFailure {
                chat_id: record.chat_id,
                message_id: record.message_id,
                reason: e.to_string(),
            }),
        }
    }
}

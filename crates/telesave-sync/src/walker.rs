// SPDX-FileCopyrightText: 2026 Telesave Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Paginated, restartable walk over one chat's history.
//!
//! The walker pages forward from an exclusive id cursor and yields messages
//! in ascending id order. Re-creating it with the same cursor reproduces the
//! same remaining sequence, which is what makes crash-resume safe.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use telesave_core::{
    Chat, HistoryPage, MessageId, MessagingService, RawMessage, TelesaveError, WalkDirection,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::retry::{RetryPolicy, call_with_retry};

/// Lazy ascending sequence of a chat's messages after a cursor.
pub struct HistoryWalker {
    service: Arc<dyn MessagingService>,
    chat: Chat,
    cursor: MessageId,
    buffer: VecDeque<RawMessage>,
    exhausted: bool,
    latest_known: Option<MessageId>,
    page_size: usize,
    call_timeout: Duration,
    retry: RetryPolicy,
    cancel: CancellationToken,
    pages_fetched: u64,
}

impl HistoryWalker {
    pub fn new(
        service: Arc<dyn MessagingService>,
        chat: Chat,
        cursor: MessageId,
        page_size: usize,
        call_timeout: Duration,
        retry: RetryPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            service,
            chat,
            cursor,
            buffer: VecDeque::new(),
            exhausted: false,
            latest_known: None,
            page_size: page_size.max(1),
            call_timeout,
            retry,
            cancel,
            pages_fetched: 0,
        }
    }

    /// Ask the service for the newest message id with a one-message
    /// backward page.
    pub async fn probe_latest(&mut self) -> Result<Option<MessageId>, TelesaveError> {
        let page = self.fetch(None, WalkDirection::Backward, 1).await?;
        let newest = page.messages.iter().map(|m| m.id).max();
        self.note_latest(newest);
        debug!(chat_id = %self.chat.id, latest = ?self.latest_known, "probed newest message");
        Ok(self.latest_known)
    }

    /// The next message, or `None` once the history is exhausted.
    pub async fn next(&mut self) -> Result<Option<RawMessage>, TelesaveError> {
        loop {
            if let Some(message) = self.buffer.pop_front() {
                return Ok(Some(message));
            }
            if self.exhausted {
                return Ok(None);
            }
            let page = self
                .fetch(Some(self.cursor), WalkDirection::Forward, self.page_size)
                .await?;
            self.absorb(page);
        }
    }

    /// Highest message id the service reported during this walk.
    pub fn latest_known(&self) -> Option<MessageId> {
        self.latest_known
    }

    /// Exclusive bound of the next page request.
    pub fn cursor(&self) -> MessageId {
        self.cursor
    }

    pub fn pages_fetched(&self) -> u64 {
        self.pages_fetched
    }

    fn note_latest(&mut self, id: Option<MessageId>) {
        if let Some(id) = id {
            self.latest_known = Some(self.latest_known.map_or(id, |known| known.max(id)));
        }
    }

    fn absorb(&mut self, page: HistoryPage) {
        let HistoryPage {
            mut messages,
            next_cursor,
            has_more,
        } = page;

        // Anything at or below the cursor was already yielded.
        let cursor = self.cursor;
        messages.retain(|m| m.id > cursor);
        messages.sort_by_key(|m| m.id);
        messages.dedup_by_key(|m| m.id);

        let last = messages.last().map(|m| m.id);
        self.note_latest(last);
        trace!(chat_id = %self.chat.id, count = messages.len(), has_more, "page absorbed");

        let next = next_cursor.into_iter().chain(last).max();
        match next {
            Some(next) if has_more && next > cursor => self.cursor = next,
            Some(next) => {
                self.cursor = self.cursor.max(next);
                self.exhausted = true;
            }
            None => self.exhausted = true,
        }
        self.buffer.extend(messages);
    }

    async fn fetch(
        &mut self,
        cursor: Option<MessageId>,
        direction: WalkDirection,
        page_size: usize,
    ) -> Result<HistoryPage, TelesaveError> {
        let service = self.service.clone();
        let chat = &self.chat;
        let page = call_with_retry(
            &self.retry,
            self.call_timeout,
            &self.cancel,
            chat.id,
            "history page",
            || service.fetch_history_page(chat, cursor, direction, page_size),
        )
        .await?;
        self.pages_fetched += 1;
        Ok(page)
    }
}

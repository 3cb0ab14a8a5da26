// SPDX-FileCopyrightText: 2026 Telesave Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Messaging service trait: the only boundary to the remote service.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::TelesaveError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    AccountInfo, Chat, ForwardDestination, HistoryPage, LiveEvent, MessageId, OutboundContent,
    RawAttachment, WalkDirection,
};

/// Adapter for the messaging service being archived.
///
/// Implementations report rate limiting as [`TelesaveError::RateLimited`],
/// retryable network trouble as [`TelesaveError::TransientNetwork`], and
/// rejected credentials as [`TelesaveError::Authentication`].
#[async_trait]
pub trait MessagingService: PluginAdapter {
    /// Establishes the authenticated session.
    async fn authenticate(&self) -> Result<AccountInfo, TelesaveError>;

    /// Lists every chat visible to the session, including channels and
    /// archived chats. Filtering is the caller's job.
    async fn list_chats(&self) -> Result<Vec<Chat>, TelesaveError>;

    /// Fetches one page of history.
    ///
    /// `cursor` is an exclusive bound: a forward page holds ids strictly
    /// greater than it in ascending order, a backward page ids strictly
    /// smaller in descending order. `None` starts from the oldest message
    /// (forward) or the newest one (backward).
    async fn fetch_history_page(
        &self,
        chat: &Chat,
        cursor: Option<MessageId>,
        direction: WalkDirection,
        page_size: usize,
    ) -> Result<HistoryPage, TelesaveError>;

    /// Downloads the bytes of an attachment.
    async fn download_attachment(
        &self,
        attachment: &RawAttachment,
    ) -> Result<Vec<u8>, TelesaveError>;

    /// Subscribes to new, self-destructing and edited messages of `chat`.
    ///
    /// The returned channel closes when the subscription drops.
    async fn subscribe_live(
        &self,
        chat: &Chat,
    ) -> Result<mpsc::Receiver<LiveEvent>, TelesaveError>;

    /// Sends a message and returns the id the service assigned to it.
    async fn send_message(
        &self,
        destination: &ForwardDestination,
        content: OutboundContent,
    ) -> Result<MessageId, TelesaveError>;
}

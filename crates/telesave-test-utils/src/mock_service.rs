// SPDX-FileCopyrightText: 2026 Telesave Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted messaging service for deterministic testing.
//!
//! `MockService` implements `MessagingService` over in-memory chat
//! histories. Failures can be injected by call number, live events pushed
//! into open subscriptions, and every forward is captured for assertions.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::{Mutex, mpsc};

use telesave_core::{
    AccountInfo, AdapterType, Chat, ChatId, ForwardDestination, HealthStatus, HistoryPage,
    LiveEvent, MessageExtra, MessageId, MessagingService, OutboundContent, PluginAdapter,
    RawAttachment, RawMessage, TelesaveError, WalkDirection,
};

/// Capacity of each live subscription channel.
const LIVE_BUFFER: usize = 64;

/// A failure injected into one service call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    RateLimited(Duration),
    Transient,
    Timeout,
    Authentication,
    /// A non-retryable service error.
    Fatal(String),
    /// The call panics instead of returning.
    Panic(String),
}

impl Failure {
    fn to_error(&self) -> TelesaveError {
        match self {
            Failure::RateLimited(retry_after) => TelesaveError::RateLimited {
                retry_after: *retry_after,
            },
            Failure::Transient => TelesaveError::TransientNetwork {
                message: "connection reset by mock".into(),
            },
            Failure::Timeout => TelesaveError::Timeout {
                duration: Duration::from_secs(30),
            },
            Failure::Authentication => TelesaveError::Authentication("mock session revoked".into()),
            Failure::Fatal(message) => TelesaveError::Service {
                message: message.clone(),
                source: None,
            },
            Failure::Panic(message) => panic!("{message}"),
        }
    }
}

/// A captured `send_message` call.
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub id: MessageId,
    pub destination: ForwardDestination,
    pub content: OutboundContent,
}

#[derive(Default)]
struct MockState {
    chats: Vec<Chat>,
    /// Ascending by id.
    histories: HashMap<ChatId, Vec<RawMessage>>,
    attachments: HashMap<String, Vec<u8>>,
    auth_failure: Option<String>,
    page_failures: HashMap<(ChatId, u32), Failure>,
    page_calls: HashMap<ChatId, u32>,
    /// Keyed by the global download call number.
    download_failures: HashMap<u32, Failure>,
    download_calls: u32,
    downloads_by_ref: HashMap<String, u32>,
    forward_failures: u32,
    sent: Vec<SentMessage>,
    live: HashMap<ChatId, mpsc::Sender<LiveEvent>>,
    subscriptions: HashMap<ChatId, u32>,
}

/// A mock messaging service for testing.
pub struct MockService {
    account: AccountInfo,
    state: Mutex<MockState>,
}

impl MockService {
    pub fn new() -> Self {
        Self {
            account: AccountInfo {
                user_id: 1000,
                display_name: "mock user".into(),
            },
            state: Mutex::new(MockState::default()),
        }
    }

    /// Add a chat with its history. Messages are sorted by id.
    pub fn with_chat(mut self, chat: Chat, mut messages: Vec<RawMessage>) -> Self {
        messages.sort_by_key(|m| m.id);
        let state = self.state.get_mut();
        state.histories.insert(chat.id, messages);
        state.chats.push(chat);
        self
    }

    /// Register the bytes served for an attachment's `remote_ref`.
    pub fn with_attachment(mut self, remote_ref: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.state.get_mut().attachments.insert(remote_ref.into(), bytes);
        self
    }

    /// Make `authenticate` fail.
    pub fn with_auth_failure(mut self, reason: impl Into<String>) -> Self {
        self.state.get_mut().auth_failure = Some(reason.into());
        self
    }

    /// Fail the `call`-th history page request for `chat` (1-based,
    /// probes included).
    pub fn fail_page(mut self, chat: ChatId, call: u32, failure: Failure) -> Self {
        self.state.get_mut().page_failures.insert((chat, call), failure);
        self
    }

    /// Fail the `call`-th download across all chats (1-based).
    pub fn fail_download(mut self, call: u32, failure: Failure) -> Self {
        self.state.get_mut().download_failures.insert(call, failure);
        self
    }

    /// Reject the next `count` forwards with a non-retryable error.
    pub fn fail_forwards(mut self, count: u32) -> Self {
        self.state.get_mut().forward_failures = count;
        self
    }

    /// Append a message to a chat's history while a run is in progress.
    pub async fn append_message(&self, message: RawMessage) {
        let mut state = self.state.lock().await;
        let history = state.histories.entry(message.chat_id).or_default();
        history.push(message);
        history.sort_by_key(|m| m.id);
    }

    /// Change the text of a message already in a chat's history, as an
    /// edit on the service would.
    pub async fn edit_message(&self, chat: ChatId, id: i64, text: &str) {
        let mut state = self.state.lock().await;
        if let Some(message) = state
            .histories
            .get_mut(&chat)
            .and_then(|history| history.iter_mut().find(|m| m.id == MessageId(id)))
        {
            message.text = Some(text.to_string());
            message.extra.edit_date = Some(timestamp_for(id) + chrono::Duration::hours(1));
        }
    }

    /// Push an event into the chat's open live subscription.
    ///
    /// Returns false when no subscription is open.
    pub async fn inject_live(&self, event: LiveEvent) -> bool {
        let sender = self.state.lock().await.live.get(&event.chat_id()).cloned();
        match sender {
            Some(sender) => sender.send(event).await.is_ok(),
            None => false,
        }
    }

    /// Drop the chat's live subscription, as a reconnect would.
    pub async fn close_live(&self, chat: ChatId) {
        self.state.lock().await.live.remove(&chat);
    }

    /// Wait until `chat` has been subscribed at least `count` times.
    pub async fn wait_for_subscription(&self, chat: ChatId, count: u32) {
        loop {
            if self.subscriptions(chat).await >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    pub async fn subscriptions(&self, chat: ChatId) -> u32 {
        self.state
            .lock()
            .await
            .subscriptions
            .get(&chat)
            .copied()
            .unwrap_or(0)
    }

    /// History page requests made for `chat`, probes included.
    pub async fn page_requests(&self, chat: ChatId) -> u32 {
        self.state
            .lock()
            .await
            .page_calls
            .get(&chat)
            .copied()
            .unwrap_or(0)
    }

    /// Successful downloads, all attachments.
    pub async fn download_count(&self) -> u32 {
        self.state.lock().await.downloads_by_ref.values().sum()
    }

    /// Successful downloads of one attachment.
    pub async fn downloads_of(&self, remote_ref: &str) -> u32 {
        self.state
            .lock()
            .await
            .downloads_by_ref
            .get(remote_ref)
            .copied()
            .unwrap_or(0)
    }

    /// Every message passed to `send_message` that the mock accepted.
    pub async fn sent_messages(&self) -> Vec<SentMessage> {
        self.state.lock().await.sent.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.state.lock().await.sent.len()
    }
}

impl Default for MockService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockService {
    fn name(&self) -> &str {
        "mock-service"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Service
    }

    async fn health_check(&self) -> Result<HealthStatus, TelesaveError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), TelesaveError> {
        self.state.lock().await.live.clear();
        Ok(())
    }
}

#[async_trait]
impl MessagingService for MockService {
    async fn authenticate(&self) -> Result<AccountInfo, TelesaveError> {
        match &self.state.lock().await.auth_failure {
            Some(reason) => Err(TelesaveError::Authentication(reason.clone())),
            None => Ok(self.account.clone()),
        }
    }

    async fn list_chats(&self) -> Result<Vec<Chat>, TelesaveError> {
        Ok(self.state.lock().await.chats.clone())
    }

    async fn fetch_history_page(
        &self,
        chat: &Chat,
        cursor: Option<MessageId>,
        direction: WalkDirection,
        page_size: usize,
    ) -> Result<HistoryPage, TelesaveError> {
        let mut state = self.state.lock().await;
        let call = {
            let calls = state.page_calls.entry(chat.id).or_insert(0);
            *calls += 1;
            *calls
        };
        if let Some(failure) = state.page_failures.remove(&(chat.id, call)) {
            return Err(failure.to_error());
        }

        let history = state.histories.get(&chat.id).cloned().unwrap_or_default();
        let candidates: Vec<RawMessage> = match direction {
            WalkDirection::Forward => {
                let after = cursor.unwrap_or(MessageId(0));
                history.into_iter().filter(|m| m.id > after).collect()
            }
            WalkDirection::Backward => history
                .into_iter()
                .rev()
                .filter(|m| cursor.is_none_or(|before| m.id < before))
                .collect(),
        };

        let has_more = candidates.len() > page_size;
        let messages: Vec<RawMessage> = candidates.into_iter().take(page_size).collect();
        let next_cursor = messages.last().map(|m| m.id);
        Ok(HistoryPage {
            messages,
            next_cursor,
            has_more,
        })
    }

    async fn download_attachment(
        &self,
        attachment: &RawAttachment,
    ) -> Result<Vec<u8>, TelesaveError> {
        let mut state = self.state.lock().await;
        state.download_calls += 1;
        let call = state.download_calls;
        if let Some(failure) = state.download_failures.remove(&call) {
            return Err(failure.to_error());
        }
        let bytes = state
            .attachments
            .get(&attachment.remote_ref)
            .cloned()
            .ok_or_else(|| TelesaveError::Service {
                message: format!("unknown attachment {}", attachment.remote_ref),
                source: None,
            })?;
        *state
            .downloads_by_ref
            .entry(attachment.remote_ref.clone())
            .or_insert(0) += 1;
        Ok(bytes)
    }

    async fn subscribe_live(
        &self,
        chat: &Chat,
    ) -> Result<mpsc::Receiver<LiveEvent>, TelesaveError> {
        let (tx, rx) = mpsc::channel(LIVE_BUFFER);
        let mut state = self.state.lock().await;
        state.live.insert(chat.id, tx);
        *state.subscriptions.entry(chat.id).or_insert(0) += 1;
        Ok(rx)
    }

    async fn send_message(
        &self,
        destination: &ForwardDestination,
        content: OutboundContent,
    ) -> Result<MessageId, TelesaveError> {
        let mut state = self.state.lock().await;
        if state.forward_failures > 0 {
            state.forward_failures -= 1;
            return Err(TelesaveError::Service {
                message: "mock forward rejected".into(),
                source: None,
            });
        }
        let id = MessageId(900_000 + state.sent.len() as i64);
        state.sent.push(SentMessage {
            id,
            destination: *destination,
            content,
        });
        Ok(id)
    }
}

/// Deterministic timestamp for message `id`: one minute apart from a fixed epoch.
pub fn timestamp_for(id: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
        + chrono::Duration::minutes(id)
}

/// A plain text message from user 42.
pub fn text_message(chat: ChatId, id: i64, text: &str) -> RawMessage {
    RawMessage {
        id: MessageId(id),
        chat_id: chat,
        sender_id: Some(42),
        timestamp: timestamp_for(id),
        text: Some(text.to_string()),
        attachments: Vec::new(),
        ephemeral: false,
        extra: MessageExtra::default(),
    }
}

/// A self-destructing text message.
pub fn ephemeral_message(chat: ChatId, id: i64, text: &str) -> RawMessage {
    RawMessage {
        ephemeral: true,
        extra: MessageExtra {
            self_destruct_ttl: Some(10),
            ..MessageExtra::default()
        },
        ..text_message(chat, id, text)
    }
}

/// Attach a photo known to the service as `remote_ref`.
pub fn with_photo(mut message: RawMessage, remote_ref: &str) -> RawMessage {
    message.attachments.push(RawAttachment {
        remote_ref: remote_ref.to_string(),
        source_key: format!("unique-{remote_ref}"),
        content_hash: None,
        mime_type: "image/jpeg".to_string(),
        size: None,
    });
    message
}

/// `count` plain messages with ids `1..=count`.
pub fn history(chat: ChatId, count: i64) -> Vec<RawMessage> {
    (1..=count)
        .map(|id| text_message(chat, id, &format!("message {id}")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use telesave_core::ChatKind;

    fn chat() -> Chat {
        Chat::new(ChatId(7), "mock chat", ChatKind::Group)
    }

    #[tokio::test]
    async fn forward_pages_are_ascending_after_cursor() {
        let service = MockService::new().with_chat(chat(), history(ChatId(7), 5));
        let page = service
            .fetch_history_page(&chat(), Some(MessageId(2)), WalkDirection::Forward, 2)
            .await
            .unwrap();
        let ids: Vec<i64> = page.messages.iter().map(|m| m.id.0).collect();
        assert_eq!(ids, vec![3, 4]);
        assert!(page.has_more);
        assert_eq!(page.next_cursor, Some(MessageId(4)));
    }

    #[tokio::test]
    async fn backward_page_without_cursor_starts_at_newest() {
        let service = MockService::new().with_chat(chat(), history(ChatId(7), 5));
        let page = service
            .fetch_history_page(&chat(), None, WalkDirection::Backward, 1)
            .await
            .unwrap();
        assert_eq!(page.messages[0].id, MessageId(5));
        assert!(page.has_more);
    }

    #[tokio::test]
    async fn injected_page_failure_fires_once() {
        let service = MockService::new()
            .with_chat(chat(), history(ChatId(7), 1))
            .fail_page(ChatId(7), 1, Failure::RateLimited(Duration::from_secs(3)));
        let first = service
            .fetch_history_page(&chat(), None, WalkDirection::Forward, 10)
            .await;
        assert!(matches!(first, Err(TelesaveError::RateLimited { .. })));
        let second = service
            .fetch_history_page(&chat(), None, WalkDirection::Forward, 10)
            .await
            .unwrap();
        assert_eq!(second.messages.len(), 1);
        assert_eq!(service.page_requests(ChatId(7)).await, 2);
    }

    #[tokio::test]
    async fn sends_are_captured_until_failures_injected() {
        let service = MockService::new().fail_forwards(1);
        let content = OutboundContent {
            text: Some("hi".into()),
            files: vec![],
        };
        assert!(
            service
                .send_message(&ForwardDestination::SavedMessages, content.clone())
                .await
                .is_err()
        );
        service
            .send_message(&ForwardDestination::SavedMessages, content)
            .await
            .unwrap();
        assert_eq!(service.sent_count().await, 1);
    }

    #[tokio::test]
    async fn live_injection_requires_subscription() {
        let service = MockService::new().with_chat(chat(), vec![]);
        let event = LiveEvent::NewMessage(text_message(ChatId(7), 1, "hi"));
        assert!(!service.inject_live(event.clone()).await);

        let mut rx = service.subscribe_live(&chat()).await.unwrap();
        assert!(service.inject_live(event.clone()).await);
        assert_eq!(rx.recv().await, Some(event));

        service.close_live(ChatId(7)).await;
        assert_eq!(rx.recv().await, None);
    }
}

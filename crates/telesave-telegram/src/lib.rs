// SPDX-FileCopyrightText: 2026 Telesave Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Telegram messaging-service adapter for telesave.
//!
//! Implements [`MessagingService`] over the Telegram Bot API via teloxide.
//! The Bot API cannot read chat history, so history pages are served from
//! the updates this session has observed: the pending backlog drained at
//! authentication plus everything long polling delivers afterwards. Chats
//! seen in updates are remembered in the session file across runs.
//!
//! Bots are never shown self-destruct timers, so every message this adapter
//! produces has `ephemeral = false` and the self-destruct forwarder stays
//! idle behind it.

pub mod convert;
pub mod media;
pub mod session;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use telesave_config::model::TelegramConfig;
use telesave_core::{
    AccountInfo, AdapterType, Chat, ForwardDestination, HealthStatus, HistoryPage, LiveEvent,
    MessageId, MessagingService, OutboundContent, PluginAdapter, RawAttachment, RawMessage,
    TelesaveError, WalkDirection,
};
use teloxide::prelude::*;
use teloxide::types::{ChatId as TgChatId, InputFile, UpdateKind};
use teloxide::{ApiError, RequestError};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

use crate::session::{SessionFile, SessionState};

/// Longest text the Bot API accepts in one message.
const MAX_TEXT_CHARS: usize = 4096;

/// State shared with the polling task.
#[derive(Default)]
struct Observed {
    own_id: Option<UserId>,
    chats: BTreeMap<i64, Chat>,
    history: HashMap<i64, BTreeMap<i64, RawMessage>>,
    subscribers: HashMap<i64, mpsc::Sender<LiveEvent>>,
}

impl Observed {
    fn observe(&mut self, msg: &Message) -> RawMessage {
        self.chats
            .entry(msg.chat.id.0)
            .or_insert_with(|| convert::chat_of(&msg.chat));
        let raw = convert::to_raw_message(msg, self.own_id);
        self.history
            .entry(msg.chat.id.0)
            .or_default()
            .insert(raw.id.0, raw.clone());
        raw
    }
}

/// Telegram adapter implementing [`MessagingService`].
pub struct TelegramService {
    bot: Bot,
    session: SessionFile,
    live_buffer: usize,
    observed: Arc<Mutex<Observed>>,
    polling_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl TelegramService {
    /// Creates a new Telegram service adapter.
    ///
    /// Requires `telegram.bot_token`.
    pub fn new(config: &TelegramConfig, live_buffer: usize) -> Result<Self, TelesaveError> {
        let token = config.credentials().ok_or_else(|| {
            TelesaveError::Config("telegram.bot_token is required for the Telegram adapter".into())
        })?;

        Ok(Self {
            bot: Bot::new(token),
            session: SessionFile::new(&config.session),
            live_buffer: live_buffer.max(1),
            observed: Arc::new(Mutex::new(Observed::default())),
            polling_handle: Mutex::new(None),
        })
    }

    /// Returns a reference to the underlying teloxide Bot.
    pub fn bot(&self) -> &Bot {
        &self.bot
    }

    /// Pulls every pending update so the backlog is visible before the
    /// first `list_chats`.
    async fn drain_pending(&self) -> Result<usize, TelesaveError> {
        let mut offset = 0;
        let mut drained = 0;
        loop {
            let updates = self
                .bot
                .get_updates()
                .offset(offset)
                .timeout(0)
                .await
                .map_err(map_request_error)?;
            if updates.is_empty() {
                break;
            }

            let mut observed = self.observed.lock().await;
            for update in updates {
                offset = update.id.as_offset();
                match update.kind {
                    UpdateKind::Message(msg)
                    | UpdateKind::ChannelPost(msg)
                    | UpdateKind::EditedMessage(msg)
                    | UpdateKind::EditedChannelPost(msg) => {
                        observed.observe(&msg);
                        drained += 1;
                    }
                    _ => {}
                }
            }
        }
        Ok(drained)
    }

    async fn save_session(&self) {
        let state = {
            let observed = self.observed.lock().await;
            SessionState {
                user_id: observed.own_id.map(|id| id.0 as i64),
                chats: observed.chats.clone(),
            }
        };
        if let Err(e) = self.session.save(&state).await {
            warn!(path = %self.session.path().display(), error = %e, "failed to save session");
        }
    }

    async fn start_polling(&self) {
        let mut handle_slot = self.polling_handle.lock().await;
        if handle_slot.is_some() {
            return; // Already polling
        }

        let bot = self.bot.clone();
        let on_message = self.observed.clone();
        let on_post = self.observed.clone();
        let on_edit = self.observed.clone();

        info!("starting Telegram long polling");

        let handle = tokio::spawn(async move {
            let handler = teloxide::dptree::entry()
                .branch(Update::filter_message().endpoint(move |msg: Message| {
                    let observed = on_message.clone();
                    async move {
                        deliver_message(&observed, &msg).await;
                        respond(())
                    }
                }))
                .branch(Update::filter_channel_post().endpoint(move |msg: Message| {
                    let observed = on_post.clone();
                    async move {
                        deliver_message(&observed, &msg).await;
                        respond(())
                    }
                }))
                .branch(Update::filter_edited_message().endpoint(move |msg: Message| {
                    let observed = on_edit.clone();
                    async move {
                        deliver_edit(&observed, &msg).await;
                        respond(())
                    }
                }));

            Dispatcher::builder(bot, handler)
                .default_handler(|_| async {}) // Silently ignore other update kinds
                .build()
                .dispatch()
                .await;
        });

        *handle_slot = Some(handle);
    }
}

/// Records a new message and routes it to the chat's live subscriber.
async fn deliver_message(observed: &Mutex<Observed>, msg: &Message) {
    let chat_id = msg.chat.id.0;
    let (raw, subscriber) = {
        let mut observed = observed.lock().await;
        let raw = observed.observe(msg);
        (raw, observed.subscribers.get(&chat_id).cloned())
    };
    debug!(chat_id, message_id = raw.id.0, "update received");

    if let Some(tx) = subscriber
        && tx.send(LiveEvent::NewMessage(raw)).await.is_err()
    {
        debug!(chat_id, "live subscriber gone");
        observed.lock().await.subscribers.remove(&chat_id);
    }
}

async fn deliver_edit(observed: &Mutex<Observed>, msg: &Message) {
    let chat_id = msg.chat.id.0;
    let subscriber = observed.lock().await.subscribers.get(&chat_id).cloned();
    if let Some(tx) = subscriber
        && tx
            .send(LiveEvent::MessageEdited(convert::to_edit(msg)))
            .await
            .is_err()
    {
        observed.lock().await.subscribers.remove(&chat_id);
    }
}

/// Maps a Bot API failure onto the retry taxonomy.
pub(crate) fn map_request_error(e: RequestError) -> TelesaveError {
    match e {
        RequestError::RetryAfter(secs) => TelesaveError::RateLimited {
            retry_after: Duration::from_secs(u64::from(secs.seconds())),
        },
        RequestError::Network(e) => TelesaveError::TransientNetwork {
            message: e.to_string(),
        },
        RequestError::Io(e) => TelesaveError::TransientNetwork {
            message: e.to_string(),
        },
        RequestError::Api(ApiError::InvalidToken) => {
            TelesaveError::Authentication("Telegram rejected the credentials".into())
        }
        other => TelesaveError::Service {
            message: other.to_string(),
            source: Some(Box::new(other)),
        },
    }
}

fn truncate_text(text: &str) -> String {
    text.chars().take(MAX_TEXT_CHARS).collect()
}

#[async_trait]
impl PluginAdapter for TelegramService {
    fn name(&self) -> &str {
        "telegram"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Service
    }

    async fn health_check(&self) -> Result<HealthStatus, TelesaveError> {
        // Check if the credentials are valid by calling getMe.
        match self.bot.get_me().await {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(format!(
                "Telegram unreachable: {e}"
            ))),
        }
    }

    async fn shutdown(&self) -> Result<(), TelesaveError> {
        debug!("Telegram service shutting down");
        if let Some(handle) = self.polling_handle.lock().await.take() {
            handle.abort();
        }
        self.observed.lock().await.subscribers.clear();
        self.save_session().await;
        Ok(())
    }
}

#[async_trait]
impl MessagingService for TelegramService {
    async fn authenticate(&self) -> Result<AccountInfo, TelesaveError> {
        let me = self.bot.get_me().await.map_err(map_request_error)?;
        let own_id = me.user.id;

        let saved = self.session.load().await;
        {
            let mut observed = self.observed.lock().await;
            observed.own_id = Some(own_id);
            if saved.user_id == Some(own_id.0 as i64) {
                observed.chats.extend(saved.chats);
            }
        }

        let drained = self.drain_pending().await?;
        debug!(drained, "pending updates drained");
        self.save_session().await;
        self.start_polling().await;

        Ok(AccountInfo {
            user_id: own_id.0 as i64,
            display_name: me.user.full_name(),
        })
    }

    async fn list_chats(&self) -> Result<Vec<Chat>, TelesaveError> {
        Ok(self.observed.lock().await.chats.values().cloned().collect())
    }

    async fn fetch_history_page(
        &self,
        chat: &Chat,
        cursor: Option<MessageId>,
        direction: WalkDirection,
        page_size: usize,
    ) -> Result<HistoryPage, TelesaveError> {
        let observed = self.observed.lock().await;
        Ok(observed
            .history
            .get(&chat.id.0)
            .map(|history| convert::page_of(history, cursor, direction, page_size))
            .unwrap_or_default())
    }

    async fn download_attachment(
        &self,
        attachment: &RawAttachment,
    ) -> Result<Vec<u8>, TelesaveError> {
        media::download(&self.bot, attachment).await
    }

    async fn subscribe_live(
        &self,
        chat: &Chat,
    ) -> Result<mpsc::Receiver<LiveEvent>, TelesaveError> {
        let (tx, rx) = mpsc::channel(self.live_buffer);
        self.observed
            .lock()
            .await
            .subscribers
            .insert(chat.id.0, tx);
        Ok(rx)
    }

    async fn send_message(
        &self,
        destination: &ForwardDestination,
        content: OutboundContent,
    ) -> Result<MessageId, TelesaveError> {
        let target = match destination {
            ForwardDestination::Chat(id) => TgChatId(id.0),
            ForwardDestination::SavedMessages => {
                return Err(TelesaveError::Service {
                    message: "bot sessions have no saved messages; set telegram.forward_chat_id"
                        .into(),
                    source: None,
                });
            }
        };

        let mut first = None;
        if let Some(text) = content.text.as_deref().filter(|t| !t.is_empty()) {
            let sent = self
                .bot
                .send_message(target, truncate_text(text))
                .await
                .map_err(map_request_error)?;
            first.get_or_insert(sent.id);
        }
        for file in &content.files {
            let sent = self
                .bot
                .send_document(target, InputFile::file(file.path.clone()))
                .await
                .map_err(map_request_error)?;
            first.get_or_insert(sent.id);
        }

        first
            .map(|id| MessageId(i64::from(id.0)))
            .ok_or_else(|| TelesaveError::Internal("nothing to send".into()))
    }
}

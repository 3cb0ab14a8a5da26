// SPDX-FileCopyrightText: 2026 Telesave Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The explicit context threaded through orchestrator, walker and pipeline.

use std::sync::Arc;
use std::time::Duration;

use telesave_config::model::{SyncConfig, TelegramConfig};
use telesave_core::{
    ArchiveStore, Chat, ChatId, ChatKind, ForwardDestination, MessagingService, WalkMode,
};
use telesave_storage::BlobSink;

use crate::interceptor::SelfDestructInterceptor;
use crate::retry::RetryPolicy;

/// Command-line switches that shape one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunFlags {
    /// Replay full history (`--all`).
    pub all: bool,
    /// Archive self-destructing messages without forwarding them.
    pub dont_save_self_destructing: bool,
    /// Stop after backfill instead of staying live.
    pub once: bool,
}

/// Tunables for one sync run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub mode: WalkMode,
    pub page_size: usize,
    pub max_concurrent_chats: usize,
    pub call_timeout: Duration,
    pub retry: RetryPolicy,
    /// Keep live subscriptions after backfill.
    pub live: bool,
    /// Walk passes per chat before it is reported as not caught up.
    pub max_walk_passes: u32,
    pub include_channels: bool,
    pub include_archived: bool,
    pub forward_enabled: bool,
    pub forward_destination: ForwardDestination,
}

impl SyncOptions {
    pub fn from_config(sync: &SyncConfig, telegram: &TelegramConfig, flags: RunFlags) -> Self {
        Self {
            mode: if flags.all {
                WalkMode::FullHistory
            } else {
                WalkMode::Incremental
            },
            page_size: sync.page_size,
            max_concurrent_chats: sync.max_concurrent_chats.max(1),
            call_timeout: Duration::from_secs(sync.call_timeout_secs),
            retry: RetryPolicy::new(
                sync.max_retries,
                Duration::from_millis(sync.base_delay_ms),
                Duration::from_millis(sync.max_delay_ms),
            ),
            live: sync.live && !flags.once,
            max_walk_passes: 3,
            include_channels: sync.include_channels,
            include_archived: sync.include_archived,
            forward_enabled: sync.save_self_destructing && !flags.dont_save_self_destructing,
            forward_destination: telegram
                .forward_chat_id
                .map(|id| ForwardDestination::Chat(ChatId(id)))
                .unwrap_or(ForwardDestination::SavedMessages),
        }
    }

    /// Whether a discovered chat is archived on this run.
    pub fn wants(&self, chat: &Chat) -> bool {
        (self.include_channels || chat.kind != ChatKind::Channel)
            && (self.include_archived || !chat.archived)
    }
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::from_config(
            &SyncConfig::default(),
            &TelegramConfig::default(),
            RunFlags::default(),
        )
    }
}

/// Everything a sync worker needs, passed explicitly instead of living in
/// global session state.
pub struct SyncContext {
    pub service: Arc<dyn MessagingService>,
    pub store: Arc<dyn ArchiveStore>,
    pub blobs: Arc<BlobSink>,
    pub interceptor: SelfDestructInterceptor,
    pub options: SyncOptions,
}

impl SyncContext {
    pub fn new(
        service: Arc<dyn MessagingService>,
        store: Arc<dyn ArchiveStore>,
        blobs: Arc<BlobSink>,
        options: SyncOptions,
    ) -> Self {
        let interceptor =
            SelfDestructInterceptor::new(options.forward_enabled, options.forward_destination);
        Self {
            service,
            store,
            blobs,
            interceptor,
            options,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config() {
        let sync = SyncConfig::default();
        let telegram = TelegramConfig {
            forward_chat_id: Some(-500),
            ..TelegramConfig::default()
        };
        let options = SyncOptions::from_config(
            &sync,
            &telegram,
            RunFlags {
                all: true,
                dont_save_self_destructing: true,
                once: true,
            },
        );
        assert_eq!(options.mode, WalkMode::FullHistory);
        assert!(!options.forward_enabled);
        assert!(!options.live);
        assert_eq!(options.forward_destination, ForwardDestination::Chat(ChatId(-500)));
    }

    #[test]
    fn default_options_skip_channels_and_archived() {
        let options = SyncOptions::default();
        assert_eq!(options.mode, WalkMode::Incremental);
        assert!(options.forward_enabled);
        assert_eq!(options.forward_destination, ForwardDestination::SavedMessages);

        let group = Chat::new(ChatId(1), "g", ChatKind::Group);
        let channel = Chat::new(ChatId(2), "news", ChatKind::Channel);
        let archived = Chat::new(ChatId(3), "old", ChatKind::User).archived(true);
        assert!(options.wants(&group));
        assert!(!options.wants(&channel));
        assert!(!options.wants(&archived));
    }
}

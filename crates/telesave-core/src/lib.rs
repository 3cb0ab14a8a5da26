// SPDX-FileCopyrightText: 2026 Telesave Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for telesave.
//!
//! Holds the adapter traits, the shared error type and the domain types
//! used by every other crate in the workspace.

pub mod error;
pub mod traits;
pub mod types;

pub use error::TelesaveError;
pub use types::{
    AccountInfo, AdapterType, BlobRef, Chat, ChatId, ChatKind, CommitOutcome, CommitRequest,
    ForwardDestination, HealthStatus, HistoryPage, LiveEvent, MessageEdit, MessageExtra,
    MessageId, MessageRecord, OutboundContent, OutboundFile, RawAttachment, RawMessage,
    WalkDirection, WalkMode, WalkState, Watermark,
};

pub use traits::{ArchiveStore, MessagingService, PluginAdapter};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_type_round_trips() {
        use std::str::FromStr;

        for variant in [AdapterType::Service, AdapterType::Storage] {
            let parsed = AdapterType::from_str(&variant.to_string()).expect("should parse back");
            assert_eq!(variant, parsed);
        }
        let json = serde_json::to_string(&AdapterType::Storage).expect("should serialize");
        assert_eq!(json, "\"Storage\"");
    }

    #[test]
    fn chat_kind_is_lowercase() {
        assert_eq!(ChatKind::Channel.to_string(), "channel");
        assert_eq!("group".parse::<ChatKind>().unwrap(), ChatKind::Group);
    }

    #[test]
    fn health_status_variants() {
        let healthy = HealthStatus::Healthy;
        assert_ne!(HealthStatus::Unhealthy("down".into()), healthy);
    }

    #[test]
    fn commit_outcome_exposes_record() {
        let record = MessageRecord {
            chat_id: ChatId(1),
            message_id: MessageId(2),
            sender_id: None,
            timestamp: chrono::Utc::now(),
            text: Some("hi".into()),
            media_refs: vec![],
            is_self_destructing: false,
            forwarded: false,
            extra: MessageExtra::default(),
        };
        let created = CommitOutcome::Created(record.clone());
        assert!(created.is_created());
        assert_eq!(created.record(), &record);
        assert!(!CommitOutcome::Existing(record.clone()).is_created());
    }

    #[test]
    fn all_traits_are_exported() {
        fn _assert_plugin_adapter<T: PluginAdapter>() {}
        fn _assert_service<T: MessagingService>() {}
        fn _assert_archive<T: ArchiveStore>() {}
    }
}

// SPDX-FileCopyrightText: 2026 Telesave Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types shared by every telesave crate.

use std::time::Duration;

use thiserror::Error;

use crate::types::{ChatId, MessageId};

/// The primary error type used across adapter traits and the sync engine.
///
/// Variants fall into three groups:
/// - retryable service conditions ([`TransientNetwork`](Self::TransientNetwork),
///   [`RateLimited`](Self::RateLimited), [`Timeout`](Self::Timeout)),
/// - per-chat failures that never abort other chats
///   ([`StaleWatermark`](Self::StaleWatermark), [`WalkerExhausted`](Self::WalkerExhausted),
///   [`ForwardFailure`](Self::ForwardFailure)),
/// - process-fatal conditions ([`Authentication`](Self::Authentication)).
#[derive(Debug, Error)]
pub enum TelesaveError {
    /// Configuration errors (invalid TOML, missing credentials, bad values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, blob I/O).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Non-retryable messaging-service errors (bad request, unsupported call).
    #[error("service error: {message}")]
    Service {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Network-level failure that is worth retrying with backoff.
    #[error("transient network error: {message}")]
    TransientNetwork { message: String },

    /// The service asked us to slow down for `retry_after`.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// Credentials were rejected. Aborts the whole process.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// A watermark advance did not strictly progress past the stored value.
    #[error("stale watermark for chat {chat_id}: stored {stored}, attempted {attempted}")]
    StaleWatermark {
        chat_id: ChatId,
        stored: String,
        attempted: String,
    },

    /// The walker gave up on a chat after its retry budget ran out.
    #[error("history walk for chat {chat_id} exhausted after {attempts} attempts: {last_error}")]
    WalkerExhausted {
        chat_id: ChatId,
        attempts: u32,
        last_error: String,
    },

    /// Forwarding a self-destructing message failed. The message stays archived.
    #[error("forward of message {message_id} in chat {chat_id} failed: {reason}")]
    ForwardFailure {
        chat_id: ChatId,
        message_id: MessageId,
        reason: String,
    },

    /// A single service call exceeded its timeout.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// Work stopped because shutdown was requested.
    #[error("operation cancelled by shutdown")]
    Cancelled,

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl TelesaveError {
    /// Wraps any error as a storage error.
    pub fn storage<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        TelesaveError::Storage {
            source: Box::new(err),
        }
    }

    /// True for failures the walker retries with exponential backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TelesaveError::TransientNetwork { .. } | TelesaveError::Timeout { .. }
        )
    }

    /// True for failures that must abort the whole process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TelesaveError::Authentication(_))
    }

    /// The pause requested by the service, if this is a rate-limit signal.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            TelesaveError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

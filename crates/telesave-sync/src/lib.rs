// SPDX-FileCopyrightText: 2026 Telesave Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Incremental, resumable synchronization engine for telesave.
//!
//! The [`SyncOrchestrator`] is the central coordinator that:
//! - Authenticates and enumerates the chats to archive
//! - Runs one [`HistoryWalker`] plus the ingestion pipeline per chat under a bounded pool
//! - Forwards self-destructing messages through the [`SelfDestructInterceptor`]
//! - Keeps caught-up chats live on their push subscriptions
//! - Stops cooperatively on shutdown and reports every chat's final state

pub mod context;
pub mod interceptor;
pub mod orchestrator;
pub mod pipeline;
pub mod report;
pub mod retry;
pub mod shutdown;
pub mod state;
pub mod walker;

pub use context::{RunFlags, SyncContext, SyncOptions};
pub use interceptor::{ForwardOutcome, SelfDestructInterceptor};
pub use orchestrator::SyncOrchestrator;
pub use pipeline::{Ingested, ingest};
pub use report::{ChatReport, SyncReport};
pub use retry::{RetryPolicy, call_with_retry};
pub use shutdown::install_signal_handler;
pub use state::ChatState;
pub use walker::HistoryWalker;

// SPDX-FileCopyrightText: 2026 Telesave Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for telesave integration tests.
//!
//! Provides a scripted messaging service and test harness infrastructure
//! for fast, deterministic, CI-runnable tests without a network.
//!
//! # Components
//!
//! - [`MockService`] - Scripted histories, failure injection, live events and forward capture
//! - [`TestHarness`] - Temp archive plus blob root wired to the real orchestrator

pub mod harness;
pub mod mock_service;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_service::{
    Failure, MockService, SentMessage, ephemeral_message, history, text_message, timestamp_for,
    with_photo,
};

// SPDX-FileCopyrightText: 2026 Telesave Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Base adapter trait shared by the messaging service and the archive store.

use async_trait::async_trait;

use crate::error::TelesaveError;
use crate::types::{AdapterType, HealthStatus};

/// Identity, health and lifecycle common to every telesave adapter.
#[async_trait]
pub trait PluginAdapter: Send + Sync + 'static {
    /// Returns the human-readable name of this adapter instance.
    fn name(&self) -> &str;

    /// Returns the semantic version of this adapter.
    fn version(&self) -> semver::Version;

    /// Returns the role this adapter plays.
    fn adapter_type(&self) -> AdapterType;

    /// Performs a health check and returns the adapter's current status.
    async fn health_check(&self) -> Result<HealthStatus, TelesaveError>;

    /// Releases any held resources.
    async fn shutdown(&self) -> Result<(), TelesaveError>;
}

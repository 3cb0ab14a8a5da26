// SPDX-FileCopyrightText: 2026 Telesave Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persisted session state.
//!
//! Bot API sessions cannot enumerate dialogs, so the chats seen in updates
//! are remembered in the session file and offered again on the next run.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use telesave_core::{Chat, TelesaveError};
use tracing::{debug, warn};

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SessionState {
    /// Account the session belongs to. A mismatch discards known chats.
    pub user_id: Option<i64>,
    pub chats: BTreeMap<i64, Chat>,
}

/// Session state stored as JSON at a fixed path.
#[derive(Debug, Clone)]
pub struct SessionFile {
    path: PathBuf,
}

impl SessionFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the state. A missing or unreadable file yields an empty state.
    pub async fn load(&self) -> SessionState {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "no session state loaded");
                return SessionState::default();
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(state) => state,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "session file corrupt, starting fresh");
                SessionState::default()
            }
        }
    }

    /// Writes the state through a temp file and rename.
    pub async fn save(&self, state: &SessionState) -> Result<(), TelesaveError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(TelesaveError::storage)?;
        }
        let json = serde_json::to_vec_pretty(state).map_err(TelesaveError::storage)?;
        let temp = self.path.with_extension("tmp");
        tokio::fs::write(&temp, json)
            .await
            .map_err(TelesaveError::storage)?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(TelesaveError::storage)?;
        debug!(path = %self.path.display(), chats = state.chats.len(), "session saved");
        Ok(())
    }
}

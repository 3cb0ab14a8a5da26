// SPDX-FileCopyrightText: 2026 Telesave Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-chat sync state machine.

use serde::Serialize;

/// Where a chat is in its sync lifecycle.
///
/// `Idle → Backfilling → Live → Backfilling (on a reconnect gap) → Live`.
/// `Failed` is terminal and only reached once the retry budget runs out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatState {
    /// Discovered, no work started.
    Idle,
    /// Walking history towards the latest known message.
    Backfilling,
    /// Caught up and consuming live events.
    Live,
    /// Gave up for the rest of this run.
    Failed,
}

impl ChatState {
    pub fn can_transition_to(self, next: ChatState) -> bool {
        use ChatState::*;
        matches!(
            (self, next),
            (Idle, Backfilling)
                | (Backfilling, Live)
                | (Backfilling, Failed)
                | (Live, Backfilling)
                | (Live, Failed)
        )
    }
}

impl std::fmt::Display for ChatState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatState::Idle => write!(f, "idle"),
            ChatState::Backfilling => write!(f, "backfilling"),
            ChatState::Live => write!(f, "live"),
            ChatState::Failed => write!(f, "failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowed_transitions() {
        assert!(ChatState::Idle.can_transition_to(ChatState::Backfilling));
        assert!(ChatState::Backfilling.can_transition_to(ChatState::Live));
        assert!(ChatState::Live.can_transition_to(ChatState::Backfilling));
        assert!(!ChatState::Idle.can_transition_to(ChatState::Live));
        assert!(!ChatState::Failed.can_transition_to(ChatState::Backfilling));
    }

    #[test]
    fn display_is_lowercase() {
        assert_eq!(ChatState::Backfilling.to_string(), "backfilling");
        assert_eq!(ChatState::Failed.to_string(), "failed");
    }
}

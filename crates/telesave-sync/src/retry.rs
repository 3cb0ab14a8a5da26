// SPDX-FileCopyrightText: 2026 Telesave Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Explicit retry policy for service calls.
//!
//! Rate-limit signals pause for the duration the service asks for and never
//! consume the retry budget. Transient failures back off exponentially with
//! jitter until `max_attempts` calls have failed.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use telesave_core::{ChatId, TelesaveError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Maps a computed backoff delay to the delay actually slept.
pub type JitterFn = Arc<dyn Fn(Duration) -> Duration + Send + Sync>;

/// Backoff parameters injected into the walker and pipeline.
#[derive(Clone)]
pub struct RetryPolicy {
    /// Total calls allowed for one page or download before giving up.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    jitter: JitterFn,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            jitter: Arc::new(proportional_jitter),
        }
    }

    /// Replace the jitter function.
    pub fn with_jitter(
        mut self,
        jitter: impl Fn(Duration) -> Duration + Send + Sync + 'static,
    ) -> Self {
        self.jitter = Arc::new(jitter);
        self
    }

    /// Deterministic delays, for tests.
    pub fn without_jitter(self) -> Self {
        self.with_jitter(|delay| delay)
    }

    /// Delay before retrying after the `failures`-th consecutive failure.
    pub fn delay_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(31);
        let raw = self
            .base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay);
        (self.jitter)(raw).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_millis(500), Duration::from_secs(30))
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish_non_exhaustive()
    }
}

/// Scales a delay by a random factor in `[0.75, 1.25]`.
pub fn proportional_jitter(delay: Duration) -> Duration {
    let factor = rand::thread_rng().gen_range(0.75..=1.25);
    delay.mul_f64(factor)
}

/// Sleep unless shutdown is requested first.
pub async fn pause(duration: Duration, cancel: &CancellationToken) -> Result<(), TelesaveError> {
    tokio::select! {
        _ = tokio::time::sleep(duration) => Ok(()),
        _ = cancel.cancelled() => Err(TelesaveError::Cancelled),
    }
}

/// Run one service call under a timeout, retrying per `policy`.
///
/// Exhausting the budget yields [`TelesaveError::WalkerExhausted`] for
/// `chat_id`. Non-retryable errors are returned as they are.
pub async fn call_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    call_timeout: Duration,
    cancel: &CancellationToken,
    chat_id: ChatId,
    what: &'static str,
    mut op: F,
) -> Result<T, TelesaveError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TelesaveError>>,
{
    let mut failures = 0u32;
    loop {
        if cancel.is_cancelled() {
            return Err(TelesaveError::Cancelled);
        }
        let result = match tokio::time::timeout(call_timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(TelesaveError::Timeout {
                duration: call_timeout,
            }),
        };
        let err = match result {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if let Some(retry_after) = err.retry_after() {
            warn!(%chat_id, call = what, ?retry_after, "rate limited, pausing");
            pause(retry_after, cancel).await?;
            continue;
        }
        if !err.is_retryable() {
            return Err(err);
        }

        failures += 1;
        if failures >= policy.max_attempts {
            return Err(TelesaveError::WalkerExhausted {
                chat_id,
                attempts: failures,
                last_error: err.to_string(),
            });
        }
        let delay = policy.delay_for(failures);
        debug!(%chat_id, call = what, failures, ?delay, error = %err, "retrying after backoff");
        pause(delay, cancel).await?;
    }
}

// src/retry.rs
//
// Bounded, fixed-delay retry around a single storage operation.
//
// Every failure counts as retryable; only exhaustion surfaces, wrapping the
// last underlying error.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::constants::{DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_DELAY};
use crate::error::UploadError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of calls, including the first one. Always >= 1.
    pub max_attempts: u32,
    /// Pause between a failed attempt and the next one.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Call `op` until it succeeds or `max_attempts` calls have failed.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, UploadError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation, attempt, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if attempt < attempts => {
                    warn!(operation, attempt, max_attempts = attempts, "retrying after error: {err:#}");
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    return Err(UploadError::RetriesExhausted {
                        operation: operation.to_string(),
                        attempts,
                        source: err,
                    });
                }
            }
        }
    }
}

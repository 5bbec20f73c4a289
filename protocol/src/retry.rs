//! Bounded retry for directory calls.
//!
//! Only storage faults that report
//! [`is_transient`](crate::storage::DirectoryError::is_transient) are
//! retried. Everything else (a missing group, a duplicate join, a lost
//! transfer race) is an answer and comes back on the first attempt.

use rand::Rng;
use std::time::Duration;

use crate::config::{RETRY_BASE_BACKOFF, RETRY_JITTER, RETRY_MAX_ATTEMPTS, RETRY_MAX_BACKOFF};
use crate::storage::DirResult;

/// Retry schedule: exponential backoff from `base_backoff`, capped at
/// `max_backoff`, plus up to `jitter` of random delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: RETRY_MAX_ATTEMPTS,
            base_backoff: RETRY_BASE_BACKOFF,
            max_backoff: RETRY_MAX_BACKOFF,
            jitter: RETRY_JITTER,
        }
    }
}

impl RetryPolicy {
    /// Try exactly once.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let exponential = self.base_backoff.saturating_mul(1u32 << exponent);
        let capped = exponential.min(self.max_backoff);

        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms > 0 {
            Duration::from_millis(rand::thread_rng().gen_range(0..jitter_ms))
        } else {
            Duration::ZERO
        };
        capped.saturating_add(jitter)
    }

    /// Runs `op` until it succeeds, fails with a non-transient error, or
    /// `max_attempts` is used up. Blocks the calling thread between tries.
    pub fn run<T, F>(&self, op_name: &'static str, mut op: F) -> DirResult<T>
    where
        F: FnMut() -> DirResult<T>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    let wait = self.backoff(attempt);
                    tracing::warn!(
                        op = op_name,
                        attempt,
                        wait_ms = wait.as_millis() as u64,
                        error = %err,
                        "directory call failed, retrying"
                    );
                    std::thread::sleep(wait);
                }
                Err(err) => {
                    if err.is_transient() {
                        tracing::error!(
                            op = op_name,
                            attempts = attempt,
                            error = %err,
                            "directory unavailable, giving up"
                        );
                    }
                    return Err(err);
                }
            }
        }
    }
}

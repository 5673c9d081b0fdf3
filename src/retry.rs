// src/retry.rs
// Retry policy for transmission jobs.
//
// The policy is a pure function of the attempt counter and the outcome of the
// attempt that just finished. It never touches the broker or the store; the
// worker acts on the `Decision` it returns.

use std::time::Duration;

use crate::transmit::Outcome;
use crate::utils::constants::{BASE_RETRY_DELAY_SECS, MAX_RETRIES};

/// What to do with a job after one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Transmitted. Terminal.
    Succeeded,
    /// Refused by policy. Terminal, never retried and never recorded.
    Rejected(String),
    /// Re-enqueue the job after `delay` with its counter set to `next_attempt`.
    Retry { delay: Duration, next_attempt: u32 },
    /// Transient failures ran past the ceiling. Terminal for the worker; the
    /// lineage's exhaustion hook decides whether the job is recorded.
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    /// Delay unit; the n-th retry waits `base_delay * max(n - 1, 1)`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            base_delay: Duration::from_secs(BASE_RETRY_DELAY_SECS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Delay before retrying a job that has already been retried
    /// `attempt_count` times. Linear in the counter and never zero-length
    /// unless `base_delay` is.
    #[must_use]
    pub fn backoff(&self, attempt_count: u32) -> Duration {
        self.base_delay.saturating_mul(attempt_count.max(1))
    }

    #[must_use]
    pub const fn should_retry(&self, attempt_count: u32) -> bool {
        attempt_count < self.max_retries
    }

    #[must_use]
    pub const fn remaining_retries(&self, attempt_count: u32) -> u32 {
        self.max_retries.saturating_sub(attempt_count)
    }

    pub fn decide(&self, attempt_count: u32, outcome: &Outcome) -> Decision {
        match outcome {
            Outcome::Success => Decision::Succeeded,
            Outcome::PermanentReject(reason) => Decision::Rejected(reason.clone()),
            Outcome::TransientFailure(_) if self.should_retry(attempt_count) => Decision::Retry {
                delay: self.backoff(attempt_count),
                next_attempt: attempt_count + 1,
            },
            Outcome::TransientFailure(_) => Decision::Exhausted,
        }
    }
}

//! Retry policy: decides how many times and how long to wait between send attempts.

use std::time::Duration;

use crate::domain::SendError;

/// Retry policy for notification delivery.
///
/// Linear backoff: the wait after attempt `n` is `n × base_delay`.
///
/// Example with base_delay=1s, max_attempts=3:
/// - attempt 1 fails → wait 1s
/// - attempt 2 fails → wait 2s
/// - attempt 3 fails → exhausted (no wait)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,

    /// Backoff unit.
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Delay to wait after `attempt` (1-indexed) has failed.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    /// Sum of all waits an always-failing entry goes through.
    pub fn total_delay(&self) -> Duration {
        (1..self.max_attempts)
            .map(|attempt| self.next_delay(attempt))
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

/// Per-entry retry bookkeeping, held only in worker memory while the entry is processed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryState {
    attempt: u32,
    last_error: Option<SendError>,
}

impl RetryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of attempts started so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn last_error(&self) -> Option<&SendError> {
        self.last_error.as_ref()
    }

    pub fn start_attempt(&mut self) {
        self.attempt += 1;
    }

    pub fn record_failure(&mut self, error: SendError) {
        self.last_error = Some(error);
    }

    pub fn is_exhausted(&self, policy: &RetryPolicy) -> bool {
        self.attempt >= policy.max_attempts
    }
}

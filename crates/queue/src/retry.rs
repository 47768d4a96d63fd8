//! Retry policy for failed jobs.

use std::time::Duration;

/// What the queue does with a job whose attempt just failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Make the job available again after the delay.
    Retry(Duration),
    /// Attempts are exhausted; the job is terminally failed.
    GiveUp,
}

/// Exponential backoff: `initial_interval * backoff_coefficient^(attempt - 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Coefficient to multiply initial_interval with for every past attempt.
    backoff_coefficient: u32,
    /// The backoff interval for the first retry.
    initial_interval: Duration,
    /// The maximum possible backoff between retries.
    maximum_interval: Option<Duration>,
    /// Total attempts a job gets, the first one included.
    max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(
        backoff_coefficient: u32,
        initial_interval: Duration,
        maximum_interval: Option<Duration>,
        max_attempts: u32,
    ) -> Self {
        Self {
            backoff_coefficient,
            initial_interval,
            maximum_interval,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the retry that follows the given (1-based) attempt.
    pub fn retry_interval(&self, attempt: u32) -> Duration {
        let factor = self
            .backoff_coefficient
            .saturating_pow(attempt.saturating_sub(1));
        let candidate = self.initial_interval.saturating_mul(factor);

        match self.maximum_interval {
            Some(max_interval) => candidate.min(max_interval),
            None => candidate,
        }
    }

    /// Decides the fate of a job that failed on `attempt` out of `max_attempts`.
    pub fn decide(&self, attempt: u32, max_attempts: u32) -> RetryDecision {
        if attempt < max_attempts {
            RetryDecision::Retry(self.retry_interval(attempt))
        } else {
            RetryDecision::GiveUp
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff_coefficient: 2,
            initial_interval: Duration::from_secs(1),
            maximum_interval: None,
            max_attempts: 3,
        }
    }
}

//! Attempt budget and backoff for background sync jobs.

use std::time::Duration;

use run_types::NetworkError;

/// Default number of attempts before a job fails permanently.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default delay before the first retry.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(2);

/// Upper bound for any single backoff delay.
pub const DEFAULT_BACKOFF_CAP: Duration = Duration::from_secs(5 * 60 * 60);

/// Result of one job attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Done; the job can be dropped.
    Success,
    /// Try again after a backoff.
    Retry,
    /// Give up; the pending entry is kept.
    Failure,
}

impl JobOutcome {
    /// Classify a failed remote call.
    pub fn from_network_error(error: NetworkError) -> Self {
        if error.is_retryable() {
            Self::Retry
        } else {
            Self::Failure
        }
    }
}

/// Attempt budget plus exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts allowed before giving up.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub base_delay: Duration,
    /// Longest delay between attempts.
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Whether a job that already ran `attempts_made` times may run again.
    pub fn is_exhausted(&self, attempts_made: u32) -> bool {
        attempts_made >= self.max_attempts
    }

    /// Delay after the `attempt`-th failed attempt (1-based):
    /// `base * 2^(attempt - 1)`, capped at `max_delay`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BACKOFF_BASE,
            max_delay: DEFAULT_BACKOFF_CAP,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_from_base() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
        assert_eq!(policy.backoff(4), Duration::from_secs(16));
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(20), DEFAULT_BACKOFF_CAP);
        assert_eq!(policy.backoff(u32::MAX), DEFAULT_BACKOFF_CAP);
    }

    #[test]
    fn budget_of_five_attempts() {
        let policy = RetryPolicy::default();
        assert!(!policy.is_exhausted(0));
        assert!(!policy.is_exhausted(4));
        assert!(policy.is_exhausted(5));
    }

    #[test]
    fn network_errors_map_to_outcomes() {
        assert_eq!(
            JobOutcome::from_network_error(NetworkError::TooManyRequests),
            JobOutcome::Retry
        );
        assert_eq!(
            JobOutcome::from_network_error(NetworkError::Unauthorized),
            JobOutcome::Retry
        );
        assert_eq!(
            JobOutcome::from_network_error(NetworkError::PayloadTooLarge),
            JobOutcome::Failure
        );
    }
}

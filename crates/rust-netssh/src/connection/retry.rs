//! Retry policy for direct dials.

use std::time::Duration;

use crate::error::{ErrorKind, NetsshError};

/// Default pause between direct dial attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Fixed-delay retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum attempts, including the first.
    pub max_attempts: u32,
    /// Pause between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(DEFAULT_RETRY_DELAY, 3)
    }
}

impl RetryPolicy {
    /// Fixed delay, at least one attempt.
    #[must_use]
    pub const fn fixed(delay: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts: if max_attempts == 0 { 1 } else { max_attempts },
            delay,
        }
    }

    /// Delay before attempt `attempt` (0-indexed), if that attempt is allowed.
    #[must_use]
    pub const fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 {
            Some(Duration::ZERO)
        } else if attempt < self.max_attempts {
            Some(self.delay)
        } else {
            None
        }
    }

    /// Whether a failed attempt with `error` may be retried.
    ///
    /// Configuration mistakes and authentication rejections fail the same
    /// way every time.
    #[must_use]
    pub fn is_retryable(error: &NetsshError) -> bool {
        !matches!(error.kind(), ErrorKind::Config | ErrorKind::Auth)
    }
}

/// Retry state tracker.
#[derive(Debug)]
pub struct RetryState {
    /// Attempts made so far.
    attempt: u32,
    /// Policy in use.
    policy: RetryPolicy,
    /// Total delay accumulated.
    total_delay: Duration,
}

impl RetryState {
    /// Create new state.
    #[must_use]
    pub const fn new(policy: RetryPolicy) -> Self {
        Self {
            attempt: 0,
            policy,
            total_delay: Duration::ZERO,
        }
    }

    /// Attempts made so far.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay to wait before the next attempt, or `None` when exhausted.
    #[must_use]
    pub const fn next_delay(&self) -> Option<Duration> {
        self.policy.delay_for_attempt(self.attempt)
    }

    /// Record an attempt.
    pub fn record_attempt(&mut self) {
        if let Some(delay) = self.next_delay() {
            self.total_delay += delay;
        }
        self.attempt += 1;
    }

    /// Total delay so far.
    #[must_use]
    pub const fn total_delay(&self) -> Duration {
        self.total_delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_policy() {
        let policy = RetryPolicy::fixed(Duration::from_millis(100), 3);

        assert_eq!(policy.delay_for_attempt(0), Some(Duration::ZERO));
        assert_eq!(policy.delay_for_attempt(2), Some(Duration::from_millis(100)));
        assert_eq!(policy.delay_for_attempt(3), None);
    }

    #[test]
    fn zero_attempts_clamped() {
        let policy = RetryPolicy::fixed(Duration::from_secs(1), 0);
        assert_eq!(policy.max_attempts, 1);
        assert!(policy.delay_for_attempt(1).is_none());
    }

    #[test]
    fn retry_state() {
        let mut state = RetryState::new(RetryPolicy::fixed(Duration::from_millis(100), 2));

        assert!(state.next_delay().is_some());
        state.record_attempt();
        assert!(state.next_delay().is_some());
        state.record_attempt();
        assert!(state.next_delay().is_none());
        assert_eq!(state.attempt(), 2);
        assert_eq!(state.total_delay(), Duration::from_millis(100));
    }

    #[test]
    fn auth_is_not_retryable() {
        assert!(!RetryPolicy::is_retryable(&NetsshError::auth("u", "denied")));
        assert!(RetryPolicy::is_retryable(&NetsshError::dial("u@h:22", "refused")));
    }
}

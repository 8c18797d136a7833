//! Retry delay state

use std::time::Duration;

/// Delay before the next retry: 0 before the first failure, then 1s,
/// doubling on every further failure. No ceiling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackoffState {
    delay_secs: u64,
}

impl BackoffState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delay_secs(&self) -> u64 {
        self.delay_secs
    }

    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }

    /// Advance after a failed attempt.
    pub fn record_failure(&mut self) {
        self.delay_secs = match self.delay_secs {
            0 => 1,
            d => d.saturating_mul(2),
        };
    }

    /// Back to zero after any successful fetch.
    pub fn reset(&mut self) {
        self.delay_secs = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consecutive_failures_double_from_one() {
        let mut backoff = BackoffState::new();
        let mut seen = Vec::new();
        for _ in 0..6 {
            seen.push(backoff.delay_secs());
            backoff.record_failure();
        }
        assert_eq!(seen, vec![0, 1, 2, 4, 8, 16]);
    }

    #[test]
    fn success_resets_to_zero() {
        let mut backoff = BackoffState::new();
        backoff.record_failure();
        backoff.record_failure();
        backoff.reset();
        assert_eq!(backoff.delay(), Duration::ZERO);
        backoff.record_failure();
        assert_eq!(backoff.delay_secs(), 1);
    }

    #[test]
    fn growth_saturates_instead_of_overflowing() {
        let mut backoff = BackoffState::new();
        for _ in 0..100 {
            backoff.record_failure();
        }
        assert_eq!(backoff.delay_secs(), u64::MAX);
    }
}

//! Reconnect backoff.

use std::time::Duration;

/// How a client retries a lost connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first attempt; doubled for each following one.
    pub base_delay: Duration,
    /// Attempts before giving up.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { base_delay: Duration::from_millis(1000), max_attempts: 5 }
    }
}

/// Attempt counter for one connection.
///
/// Yields `base_delay * 2^(attempt - 1)` for attempts `1..=max_attempts`,
/// then `None`, which is the terminal give-up signal. No jitter.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    attempts: u32,
}

impl Backoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, attempts: 0 }
    }

    /// Delay before the next attempt, or `None` once attempts are exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.policy.max_attempts {
            return None;
        }
        self.attempts += 1;
        let factor = 1u32.checked_shl(self.attempts - 1).unwrap_or(u32::MAX);
        Some(self.policy.base_delay.saturating_mul(factor))
    }

    /// Call after a successful (re)connection.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.policy.max_attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.policy.max_attempts
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(ReconnectPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule() {
        let mut backoff = Backoff::default();
        let delays: Vec<u64> =
            std::iter::from_fn(|| backoff.next_delay()).map(|d| d.as_millis() as u64).collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000]);
        assert!(backoff.is_exhausted());
        assert_eq!(backoff.next_delay(), None);
        assert_eq!(backoff.attempts(), 5);
    }

    #[test]
    fn test_reset_restarts_schedule() {
        let mut backoff = Backoff::default();
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.attempts(), 0);
        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_never_exceeds_max_attempts() {
        let policy = ReconnectPolicy { base_delay: Duration::from_millis(10), max_attempts: 3 };
        let mut backoff = Backoff::new(policy);
        let mut attempts = 0;
        while backoff.next_delay().is_some() {
            attempts += 1;
            assert!(attempts <= 3);
        }
        assert_eq!(attempts, 3);
    }

    #[test]
    fn test_zero_attempts_gives_up_immediately() {
        let mut backoff = Backoff::new(ReconnectPolicy { max_attempts: 0, ..Default::default() });
        assert_eq!(backoff.next_delay(), None);
    }

    #[test]
    fn test_large_attempt_counts_saturate() {
        let policy = ReconnectPolicy { base_delay: Duration::from_secs(1), max_attempts: 64 };
        let mut backoff = Backoff::new(policy);
        let last = std::iter::from_fn(|| backoff.next_delay()).last().unwrap();
        assert!(last >= Duration::from_secs(u32::MAX as u64));
    }
}

use std::time::Duration;

/// Reconnect behaviour after an endpoint's socket closes unexpectedly.
///
/// The delay is fixed per attempt; `max_attempts` bounds the total time spent
/// retrying a dead endpoint to roughly `max_attempts × delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Reconnect attempts allowed before subscribers are told to give up.
    pub max_attempts: u32,
    /// Wait before each attempt.
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(3),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the given (1-based) attempt.
    pub fn delay_for_attempt(&self, _attempt: u32) -> Duration {
        self.delay
    }

    /// Whether the given (1-based) attempt may still run.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt <= self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.delay, Duration::from_secs(3));
    }

    #[test]
    fn test_delay_is_fixed() {
        let policy = ReconnectPolicy {
            max_attempts: 4,
            delay: Duration::from_millis(250),
        };

        for attempt in 1..=10 {
            assert_eq!(policy.delay_for_attempt(attempt), Duration::from_millis(250));
        }
    }

    #[test]
    fn test_attempts_are_bounded() {
        let policy = ReconnectPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(10),
        };

        assert!(policy.should_retry(1));
        assert!(policy.should_retry(3));
        assert!(!policy.should_retry(4));

        let never = ReconnectPolicy {
            max_attempts: 0,
            ..policy
        };
        assert!(!never.should_retry(1));
    }
}

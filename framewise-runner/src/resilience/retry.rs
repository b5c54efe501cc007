use std::time::Duration;

/// Bounded retry with clamped exponential backoff
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total tries, including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt, doubled for each one after
    pub base_delay: Duration,
    pub min_delay: Duration,
    pub max_delay: Duration,
    /// Hard limit on each individual attempt
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            min_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
            call_timeout: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no waiting
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Wait after failed attempt `attempt` (1-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let factor = 2u32.saturating_pow(attempt - 1);
        self.base_delay
            .saturating_mul(factor)
            .max(self.min_delay)
            .min(self.max_delay)
    }
}

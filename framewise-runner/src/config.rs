//! Runner configuration
//!
//! Groups the knobs of everything the runner wires together: dispatch
//! concurrency, the circuit breaker, the retry policy and input validation.

use crate::resilience::{BreakerConfig, RetryPolicy};
use crate::validation::ValidationRules;

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Max jobs analysed at the same time
    pub max_parallel_jobs: usize,
    pub breaker: BreakerConfig,
    pub retry: RetryPolicy,
    pub validation: ValidationRules,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_parallel_jobs: 2,
            breaker: BreakerConfig::default(),
            retry: RetryPolicy::default(),
            validation: ValidationRules::default(),
        }
    }
}

impl RunnerConfig {
    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_parallel_jobs == 0 {
            anyhow::bail!("max_parallel_jobs must be greater than 0");
        }

        if self.breaker.failure_threshold == 0 {
            anyhow::bail!("failure_threshold must be greater than 0");
        }

        if self.breaker.half_open_max_calls == 0 {
            anyhow::bail!("half_open_max_calls must be greater than 0");
        }

        if self.retry.max_attempts == 0 {
            anyhow::bail!("max_attempts must be greater than 0");
        }

        if self.retry.min_delay > self.retry.max_delay {
            anyhow::bail!("retry min_delay cannot exceed max_delay");
        }

        if self.retry.call_timeout.is_zero() {
            anyhow::bail!("call_timeout must be greater than 0");
        }

        if self.validation.supported_formats.is_empty() {
            anyhow::bail!("at least one supported format is required");
        }

        Ok(())
    }
}

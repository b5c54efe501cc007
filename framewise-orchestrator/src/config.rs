//! Orchestrator configuration
//!
//! Every setting can come from a command-line flag or its environment
//! variable. The library crates get their own config structs built from here.

use std::time::Duration;

use clap::{Parser, ValueEnum};
use framewise_client::{ClientConfig, DEFAULT_BASE_URL, DEFAULT_MODEL};
use framewise_runner::{BreakerConfig, RetryPolicy, RunnerConfig, ValidationRules};
use framewise_store::LifecycleConfig;

/// Where job records live
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    /// Process-local map; records vanish on restart
    Memory,
    Redis,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "framewise-orchestrator")]
#[command(about = "Asynchronous video analysis service", long_about = None)]
pub struct Config {
    /// Address the HTTP API listens on
    #[arg(long, env = "FRAMEWISE_BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub bind_addr: String,

    #[arg(long, env = "FRAMEWISE_STORE", value_enum, default_value = "redis")]
    pub store: StoreKind,

    #[arg(long, env = "REDIS_URL", default_value = "redis://localhost:6379/0")]
    pub redis_url: String,

    /// Seconds a job record is kept after its last update
    #[arg(long, env = "JOB_RESULT_TTL", default_value_t = 86_400)]
    pub job_result_ttl: u64,

    #[arg(long, env = "OPENROUTER_API_KEY", hide_env_values = true, default_value = "")]
    pub api_key: String,

    #[arg(long, env = "OPENROUTER_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,

    #[arg(long, env = "OPENROUTER_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Seconds allowed for a single model call
    #[arg(long, env = "OPENROUTER_TIMEOUT", default_value_t = 120)]
    pub upstream_timeout: u64,

    /// Sent to the model provider as `HTTP-Referer`
    #[arg(long, env = "FRAMEWISE_APP_URL", default_value = "https://localhost")]
    pub app_url: String,

    #[arg(long, env = "MAX_VIDEO_SIZE_MB", default_value_t = 500)]
    pub max_video_size_mb: u64,

    #[arg(
        long,
        env = "SUPPORTED_FORMATS",
        value_delimiter = ',',
        default_value = "mp4,avi,mov,mkv,webm"
    )]
    pub supported_formats: Vec<String>,

    #[arg(long, env = "MAX_PARALLEL_JOBS", default_value_t = 2)]
    pub max_parallel_jobs: usize,

    #[arg(long, env = "BREAKER_FAILURE_THRESHOLD", default_value_t = 5)]
    pub breaker_failure_threshold: u32,

    /// Seconds an open circuit waits before admitting a probe
    #[arg(long, env = "BREAKER_RECOVERY_TIMEOUT", default_value_t = 60)]
    pub breaker_recovery_timeout: u64,

    #[arg(long, env = "BREAKER_HALF_OPEN_CALLS", default_value_t = 1)]
    pub breaker_half_open_calls: u32,

    #[arg(long, env = "RETRY_MAX_ATTEMPTS", default_value_t = 3)]
    pub retry_max_attempts: u32,

    /// Seconds
    #[arg(long, env = "RETRY_MIN_DELAY", default_value_t = 2)]
    pub retry_min_delay: u64,

    /// Seconds
    #[arg(long, env = "RETRY_MAX_DELAY", default_value_t = 10)]
    pub retry_max_delay: u64,

    /// Allow cross-origin requests from anywhere
    #[arg(long, env = "FRAMEWISE_CORS_ANY")]
    pub cors_any: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "FRAMEWISE_LOG_JSON")]
    pub log_json: bool,
}

impl Config {
    pub fn lifecycle_config(&self) -> LifecycleConfig {
        LifecycleConfig {
            ttl: Duration::from_secs(self.job_result_ttl),
            ..Default::default()
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            model: self.model.clone(),
            timeout: Duration::from_secs(self.upstream_timeout),
            app_url: self.app_url.clone(),
            ..Default::default()
        }
    }

    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            max_parallel_jobs: self.max_parallel_jobs,
            breaker: BreakerConfig {
                failure_threshold: self.breaker_failure_threshold,
                recovery_timeout: Duration::from_secs(self.breaker_recovery_timeout),
                half_open_max_calls: self.breaker_half_open_calls,
            },
            retry: RetryPolicy {
                max_attempts: self.retry_max_attempts,
                base_delay: Duration::from_secs(self.retry_min_delay),
                min_delay: Duration::from_secs(self.retry_min_delay),
                max_delay: Duration::from_secs(self.retry_max_delay),
                // The HTTP client enforces the same limit; this one also covers
                // time spent before the request is sent
                call_timeout: Duration::from_secs(self.upstream_timeout),
            },
            validation: ValidationRules {
                max_size_bytes: self.max_video_size_mb * 1024 * 1024,
                supported_formats: self
                    .supported_formats
                    .iter()
                    .map(|f| f.trim().trim_start_matches('.').to_lowercase())
                    .filter(|f| !f.is_empty())
                    .collect(),
                ..Default::default()
            },
        }
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_key.is_empty() {
            anyhow::bail!("OPENROUTER_API_KEY must be set");
        }

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            anyhow::bail!("base_url must start with http:// or https://");
        }

        if self.store == StoreKind::Redis && !self.redis_url.starts_with("redis") {
            anyhow::bail!("redis_url must be a redis:// or rediss:// URL");
        }

        if self.job_result_ttl == 0 {
            anyhow::bail!("job_result_ttl must be greater than 0");
        }

        if self.upstream_timeout == 0 {
            anyhow::bail!("upstream_timeout must be greater than 0");
        }

        if self.max_video_size_mb == 0 {
            anyhow::bail!("max_video_size_mb must be greater than 0");
        }

        self.runner_config().validate()
    }
}

//! Framewise Runner
//!
//! Executes video-analysis jobs in-process.
//!
//! Architecture:
//! - Resilience: circuit breaker and bounded retry around the remote model
//! - Validation: URL, format, reachability and size checks before analysis
//! - Executor: drives one job through its lifecycle
//! - Dispatcher: runs jobs on tokio tasks with bounded parallelism
//!
//! The orchestrator embeds a [`LocalDispatcher`] and hands it every
//! accepted job; the dispatcher invokes [`JobExecutor::run`] for each.

pub mod analyzer;
pub mod config;
pub mod dispatcher;
pub mod executor;
pub mod resilience;
pub mod validation;

pub use analyzer::VideoAnalyzer;
pub use config::RunnerConfig;
pub use dispatcher::{DispatchError, Dispatcher, LocalDispatcher};
pub use executor::{JobExecutor, RunOutcome};
pub use resilience::{BreakerConfig, CircuitBreaker, ResilientCaller, RetryPolicy};
pub use validation::{HttpValidator, InputValidator, ValidationError, ValidationRules};

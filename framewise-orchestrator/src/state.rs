//! Shared application state handed to every handler

use std::sync::Arc;

use framewise_runner::{CircuitBreaker, Dispatcher};
use framewise_store::JobLifecycle;

/// Path under which job resources are served
pub const JOBS_PATH: &str = "/api/v1/jobs";

pub struct AppState {
    pub lifecycle: JobLifecycle,
    pub dispatcher: Arc<dyn Dispatcher>,
    /// Breaker guarding the remote model, shared with the executor
    pub breaker: Arc<CircuitBreaker>,
}

impl AppState {
    pub fn new(
        lifecycle: JobLifecycle,
        dispatcher: Arc<dyn Dispatcher>,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            lifecycle,
            dispatcher,
            breaker,
        }
    }
}

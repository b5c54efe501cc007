//! API Module
//!
//! HTTP API layer for the orchestrator.
//! Each submodule handles endpoints for a specific domain.

pub mod error;
pub mod health;
pub mod job;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Create the main API router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(health::service_info))
        // Health checks
        .route("/health", get(health::health_check))
        .route("/health/upstream", get(health::upstream_health))
        // Job endpoints
        .route("/api/v1/jobs", post(job::submit_job).get(job::list_jobs))
        .route("/api/v1/jobs/{id}", get(job::get_job).delete(job::delete_job))
        .route("/api/v1/jobs/{id}/cancel", post(job::cancel_job))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Same router, answering cross-origin requests from any origin
pub fn create_router_with_cors(state: Arc<AppState>) -> Router {
    create_router(state).layer(CorsLayer::permissive())
}

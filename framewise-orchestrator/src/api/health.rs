//! Health Check API Handlers
//!
//! Liveness, store reachability, and a view of the breaker guarding the
//! remote model.

use std::sync::Arc;

use axum::{Json, extract::State};
use framewise_runner::resilience::BreakerSnapshot;
use serde::Serialize;

use crate::state::{AppState, JOBS_PATH};

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub version: &'static str,
    /// `ok`, or `error: <reason>` when the job store does not answer
    pub store: String,
}

#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub jobs: &'static str,
    pub health: &'static str,
}

/// GET /
pub async fn service_info() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        jobs: JOBS_PATH,
        health: "/health",
    })
}

/// GET /health
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<Health> {
    let store = match state.lifecycle.ping().await {
        Ok(()) => "ok".to_string(),
        Err(e) => {
            tracing::warn!("Job store health check failed: {}", e);
            format!("error: {}", e)
        }
    };

    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        store,
    })
}

/// GET /health/upstream
pub async fn upstream_health(State(state): State<Arc<AppState>>) -> Json<BreakerSnapshot> {
    Json(state.breaker.snapshot())
}

//! Framewise Orchestrator
//!
//! HTTP facade for the video-analysis job system. Accepted jobs are recorded
//! as `PENDING` and handed to an in-process [`LocalDispatcher`]; clients poll
//! for the outcome.

pub mod api;
pub mod config;
pub mod service;
pub mod state;

pub use api::{create_router, create_router_with_cors};
pub use config::{Config, StoreKind};
pub use state::AppState;

use std::sync::Arc;

use anyhow::Context;
use framewise_client::AnalysisClient;
use framewise_runner::{CircuitBreaker, HttpValidator, JobExecutor, LocalDispatcher, ResilientCaller};
use framewise_store::{JobLifecycle, MemoryStore, RecordStore};

/// Everything `main` needs to serve and to shut down
pub struct Services {
    pub state: Arc<AppState>,
    pub dispatcher: Arc<LocalDispatcher>,
}

/// Wire the store, the remote client and the runner together
pub async fn build_services(config: &Config) -> anyhow::Result<Services> {
    let store = open_store(config).await?;
    let lifecycle = JobLifecycle::new(store, config.lifecycle_config());

    let runner = config.runner_config();
    let breaker = Arc::new(CircuitBreaker::new(runner.breaker.clone()));

    let client =
        AnalysisClient::new(config.client_config()).context("Failed to build analysis client")?;
    tracing::info!("Analysis model: {} at {}", client.model(), client.base_url());

    let validator =
        HttpValidator::new(runner.validation.clone()).context("Failed to build video validator")?;

    let executor = Arc::new(JobExecutor::new(
        lifecycle.clone(),
        Arc::new(validator),
        Arc::new(client),
        ResilientCaller::new(Arc::clone(&breaker), runner.retry.clone()),
    ));
    let dispatcher = Arc::new(LocalDispatcher::new(executor, runner.max_parallel_jobs));

    let state = Arc::new(AppState::new(lifecycle, dispatcher.clone(), breaker));
    Ok(Services { state, dispatcher })
}

async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn RecordStore>> {
    match config.store {
        StoreKind::Memory => {
            tracing::warn!("Using the in-memory job store; records are lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreKind::Redis => connect_redis(&config.redis_url).await,
    }
}

#[cfg(feature = "redis")]
async fn connect_redis(redis_url: &str) -> anyhow::Result<Arc<dyn RecordStore>> {
    let store = framewise_store::RedisStore::connect(redis_url)
        .await
        .context("Failed to connect to Redis")?;
    tracing::info!("Connected to Redis");
    Ok(Arc::new(store))
}

#[cfg(not(feature = "redis"))]
async fn connect_redis(_redis_url: &str) -> anyhow::Result<Arc<dyn RecordStore>> {
    anyhow::bail!("built without the `redis` feature; use --store memory")
}

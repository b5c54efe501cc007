//! Job dispatch
//!
//! [`LocalDispatcher`] runs each job on its own tokio task, gated by a
//! semaphore so at most `max_parallel_jobs` analyses run at once. Queued and
//! running tasks can be revoked; a revoked job simply stops, and whoever
//! revoked it is responsible for recording the cancellation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use framewise_core::domain::analysis::AnalysisRequest;
use framewise_core::domain::job::JobId;
use tokio::sync::Semaphore;
use tokio::task::{AbortHandle, JoinError};
use tracing::{debug, error, info, warn};

use crate::executor::{JobExecutor, RunOutcome};

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("dispatcher is shut down")]
    Closed,
}

#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Hand a job over for asynchronous execution
    async fn dispatch(&self, job_id: JobId, input: AnalysisRequest) -> Result<(), DispatchError>;

    /// Stop a queued or running job; `false` if nothing was tracked for it
    fn revoke(&self, job_id: &JobId) -> bool;
}

type TaskMap = HashMap<JobId, (u64, AbortHandle)>;

pub struct LocalDispatcher {
    executor: Arc<JobExecutor>,
    permits: Arc<Semaphore>,
    tasks: Arc<Mutex<TaskMap>>,
    next_generation: AtomicU64,
}

impl LocalDispatcher {
    pub fn new(executor: Arc<JobExecutor>, max_parallel_jobs: usize) -> Self {
        Self {
            executor,
            permits: Arc::new(Semaphore::new(max_parallel_jobs.max(1))),
            tasks: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
        }
    }

    fn tasks(&self) -> MutexGuard<'_, TaskMap> {
        lock(&self.tasks)
    }

    /// Jobs currently queued or running
    pub fn active_jobs(&self) -> usize {
        self.tasks().len()
    }

    /// Refuse new work and abort everything in flight
    pub fn shutdown(&self) {
        self.permits.close();
        let tasks: Vec<_> = self.tasks().drain().collect();
        info!("Dispatcher shutting down, aborting {} job(s)", tasks.len());
        for (_, (_, handle)) in tasks {
            handle.abort();
        }
    }
}

fn lock(tasks: &Mutex<TaskMap>) -> MutexGuard<'_, TaskMap> {
    tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl Dispatcher for LocalDispatcher {
    async fn dispatch(&self, job_id: JobId, input: AnalysisRequest) -> Result<(), DispatchError> {
        if self.permits.is_closed() {
            return Err(DispatchError::Closed);
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let executor = Arc::clone(&self.executor);
        let permits = Arc::clone(&self.permits);
        let task_id = job_id.clone();

        let handle = tokio::spawn(async move {
            // Permit is released when the task ends or is aborted
            let Ok(_permit) = permits.acquire_owned().await else {
                return Ok(RunOutcome::Skipped);
            };
            executor.run(&task_id, &input).await
        });

        self.tasks()
            .insert(job_id.clone(), (generation, handle.abort_handle()));
        debug!(job_id = %job_id, "Job dispatched");

        let tasks = Arc::clone(&self.tasks);
        let executor = Arc::clone(&self.executor);
        tokio::spawn(async move {
            let joined = handle.await;

            {
                let mut tasks = lock(&tasks);
                // A redispatch of the same job may have replaced our entry
                if tasks.get(&job_id).is_some_and(|(g, _)| *g == generation) {
                    tasks.remove(&job_id);
                }
            }

            match joined {
                Ok(Ok(outcome)) => debug!(job_id = %job_id, "Job task done: {:?}", outcome),
                Ok(Err(e)) => error!(job_id = %job_id, "Job task could not record its outcome: {}", e),
                Err(join_error) => on_join_error(&executor, &job_id, join_error).await,
            }
        });

        Ok(())
    }

    fn revoke(&self, job_id: &JobId) -> bool {
        match self.tasks().remove(job_id) {
            Some((_, handle)) => {
                handle.abort();
                info!(job_id = %job_id, "Job revoked");
                true
            }
            None => false,
        }
    }
}

async fn on_join_error(executor: &JobExecutor, job_id: &JobId, join_error: JoinError) {
    if !join_error.is_panic() {
        debug!(job_id = %job_id, "Job task aborted");
        return;
    }

    let panic = join_error.into_panic();
    let message = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());

    error!(job_id = %job_id, "Job task panicked: {}", message);
    if let Err(e) = executor.record_crash(job_id, &message).await {
        warn!(job_id = %job_id, "Could not record crash: {}", e);
    }
}

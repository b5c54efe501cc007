//! Job Service
//!
//! Submission, lookup, cancellation and removal of analysis jobs.

use framewise_core::domain::analysis::{AnalysisRequest, RequestError};
use framewise_core::domain::job::{JobEvent, JobId, JobRecord, JobStatus};
use framewise_runner::DispatchError;
use framewise_store::LifecycleError;

use crate::state::AppState;

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error(transparent)]
    InvalidRequest(#[from] RequestError),

    #[error("job {0} not found")]
    NotFound(JobId),

    #[error("job {job_id} is already {status}")]
    AlreadyFinished { job_id: JobId, status: JobStatus },

    #[error("job could not be queued: {0}")]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Lifecycle(LifecycleError),
}

impl From<LifecycleError> for JobError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::NotFound(job_id) => JobError::NotFound(job_id),
            LifecycleError::InvalidTransition { job_id, from, .. } if from.is_terminal() => {
                JobError::AlreadyFinished {
                    job_id,
                    status: from,
                }
            }
            other => JobError::Lifecycle(other),
        }
    }
}

/// Accept a new job: record it as PENDING, then hand it to the dispatcher
pub async fn submit(state: &AppState, input: AnalysisRequest) -> Result<JobRecord, JobError> {
    input.check()?;

    let job_id = JobId::generate();
    let record = state.lifecycle.create(job_id.clone(), input.clone()).await?;

    if let Err(e) = state.dispatcher.dispatch(job_id.clone(), input).await {
        tracing::error!("Dispatch of job {} failed, dropping its record: {}", job_id, e);
        if let Err(cleanup) = state.lifecycle.delete(&job_id).await {
            tracing::warn!("Could not remove record of job {}: {}", job_id, cleanup);
        }
        return Err(e.into());
    }

    tracing::info!("Job submitted: {} for {}", job_id, record.input.video_url);
    Ok(record)
}

/// Get a job by ID
pub async fn get_job(state: &AppState, job_id: &JobId) -> Result<JobRecord, JobError> {
    state
        .lifecycle
        .read(job_id)
        .await?
        .ok_or_else(|| JobError::NotFound(job_id.clone()))
}

/// Cancel a job that has not finished yet
///
/// Work already running is revoked on a best-effort basis; a result that
/// lands first wins and the cancel is refused.
pub async fn cancel_job(state: &AppState, job_id: &JobId) -> Result<JobRecord, JobError> {
    let record = get_job(state, job_id).await?;
    if record.is_terminal() {
        return Err(JobError::AlreadyFinished {
            job_id: job_id.clone(),
            status: record.status,
        });
    }

    state.dispatcher.revoke(job_id);
    let record = state.lifecycle.transition(job_id, JobEvent::Cancel).await?;

    tracing::info!("Job {} cancelled", job_id);
    Ok(record)
}

/// Remove a job record, cancelling the job first if it is still active
pub async fn delete_job(state: &AppState, job_id: &JobId) -> Result<(), JobError> {
    let record = get_job(state, job_id).await?;

    if !record.is_terminal() {
        match cancel_job(state, job_id).await {
            Ok(_) | Err(JobError::AlreadyFinished { .. }) => {}
            Err(e) => return Err(e),
        }
    }

    if !state.lifecycle.delete(job_id).await? {
        return Err(JobError::NotFound(job_id.clone()));
    }

    tracing::info!("Job {} deleted", job_id);
    Ok(())
}

/// Most recent jobs, newest first
pub async fn list_jobs(state: &AppState, limit: usize) -> Result<Vec<JobRecord>, JobError> {
    Ok(state.lifecycle.list(limit).await?)
}

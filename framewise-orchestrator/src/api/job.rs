//! Job API Handlers
//!
//! HTTP endpoints for submitting and tracking analysis jobs.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
};
use framewise_core::domain::analysis::AnalysisRequest;
use framewise_core::domain::job::JobId;
use framewise_core::dto::job::{JobList, JobSubmitted, JobSummary, JobView};
use serde::Deserialize;

use crate::api::error::ApiResult;
use crate::service::job_service;
use crate::state::{AppState, JOBS_PATH};

const DEFAULT_LIST_LIMIT: usize = 10;
const MAX_LIST_LIMIT: usize = 100;

/// POST /api/v1/jobs
/// Queue a video for analysis
pub async fn submit_job(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AnalysisRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<JobSubmitted>)> {
    let Json(req) = payload?;
    tracing::info!("Submitting analysis of {}", req.video_url);

    let record = job_service::submit(&state, req).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(JobSubmitted::from_record(&record, JOBS_PATH)),
    ))
}

/// GET /api/v1/jobs/{id}
/// Current status, and the result or error once finished
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<JobView>> {
    tracing::debug!("Getting job: {}", id);

    let record = job_service::get_job(&state, &JobId::from(id)).await?;
    Ok(Json(JobView::from_record(&record, JOBS_PATH)))
}

/// POST /api/v1/jobs/{id}/cancel
pub async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<JobView>> {
    tracing::info!("Cancelling job: {}", id);

    let record = job_service::cancel_job(&state, &JobId::from(id)).await?;
    Ok(Json(JobView::from_record(&record, JOBS_PATH)))
}

/// DELETE /api/v1/jobs/{id}
/// Cancel the job if it is still active, then drop its record
pub async fn delete_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    tracing::info!("Deleting job: {}", id);

    job_service::delete_job(&state, &JobId::from(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub limit: Option<usize>,
}

/// GET /api/v1/jobs
/// Recent jobs, newest first
///
/// Query parameters:
/// - `limit` (optional): at most this many jobs, default 10, capped at 100
pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListJobsQuery>,
) -> ApiResult<Json<JobList>> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);
    tracing::debug!("Listing up to {} jobs", limit);

    let records = job_service::list_jobs(&state, limit).await?;
    Ok(Json(JobList::new(
        records.iter().map(JobSummary::from).collect(),
    )))
}

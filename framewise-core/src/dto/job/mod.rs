//! Job DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::analysis::AnalysisResult;
use crate::domain::error::ErrorInfo;
use crate::domain::job::{JobId, JobRecord, JobStatus};

/// Rough processing estimate returned on submission
pub const ESTIMATED_TIME_SECONDS: u64 = 180;

/// Hypermedia links attached to job responses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Links {
    #[serde(rename = "self")]
    pub self_link: String,
    pub status: String,
    #[serde(default)]
    pub cancel: Option<String>,
}

impl Links {
    /// Links for a job under `prefix` (e.g. "/api/v1/jobs")
    pub fn for_job(prefix: &str, job_id: &JobId, cancellable: bool) -> Self {
        let href = format!("{}/{}", prefix.trim_end_matches('/'), job_id);
        Self {
            self_link: href.clone(),
            status: href.clone(),
            cancel: cancellable.then(|| format!("{}/cancel", href)),
        }
    }
}

/// Response to a job submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSubmitted {
    pub job_id: JobId,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub estimated_time_seconds: u64,
    #[serde(rename = "_links")]
    pub links: Links,
}

impl JobSubmitted {
    pub fn from_record(record: &JobRecord, prefix: &str) -> Self {
        Self {
            job_id: record.job_id.clone(),
            status: record.status,
            created_at: record.created_at,
            estimated_time_seconds: ESTIMATED_TIME_SECONDS,
            links: Links::for_job(prefix, &record.job_id, !record.is_terminal()),
        }
    }
}

/// Full status/result view of a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobView {
    pub job_id: JobId,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<AnalysisResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    #[serde(rename = "_links")]
    pub links: Links,
}

impl JobView {
    pub fn from_record(record: &JobRecord, prefix: &str) -> Self {
        Self {
            job_id: record.job_id.clone(),
            status: record.status,
            created_at: record.created_at,
            updated_at: record.updated_at,
            started_at: record.started_at,
            completed_at: record.completed_at,
            processing_time_seconds: record
                .processing_time()
                .map(|elapsed| elapsed.num_milliseconds() as f64 / 1000.0),
            result: record.result().cloned(),
            error: record.error().cloned(),
            links: Links::for_job(prefix, &record.job_id, !record.is_terminal()),
        }
    }
}

/// One row of a job listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    pub job_id: JobId,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
}

impl From<&JobRecord> for JobSummary {
    fn from(record: &JobRecord) -> Self {
        Self {
            job_id: record.job_id.clone(),
            status: record.status,
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobList {
    pub count: usize,
    pub jobs: Vec<JobSummary>,
}

impl JobList {
    pub fn new(jobs: Vec<JobSummary>) -> Self {
        Self {
            count: jobs.len(),
            jobs,
        }
    }
}

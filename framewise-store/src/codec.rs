//! Mapping between [`JobRecord`] and stored hash fields
//!
//! Timestamps are RFC 3339 with microseconds in UTC. Payloads are JSON.
//! Absent optional values are simply absent fields.

use chrono::{DateTime, SecondsFormat, Utc};
use framewise_core::domain::analysis::{AnalysisRequest, AnalysisResult};
use framewise_core::domain::error::ErrorInfo;
use framewise_core::domain::job::{JobId, JobOutcome, JobRecord, JobStatus};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::store::Fields;

pub const JOB_ID: &str = "job_id";
pub const STATUS: &str = "status";
pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";
pub const STARTED_AT: &str = "started_at";
pub const COMPLETED_AT: &str = "completed_at";
pub const INPUT: &str = "input";
pub const RESULT: &str = "result";
pub const ERROR: &str = "error";

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("malformed field `{field}`: {reason}")]
    Malformed { field: &'static str, reason: String },

    #[error("status {status} inconsistent with stored outcome")]
    Inconsistent { status: JobStatus },
}

pub fn encode_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn encode_json<T: Serialize>(field: &'static str, value: &T) -> Result<String, CodecError> {
    serde_json::to_string(value).map_err(|e| CodecError::Malformed {
        field,
        reason: e.to_string(),
    })
}

/// Fields for a brand new record
pub fn encode(record: &JobRecord) -> Result<Fields, CodecError> {
    let mut fields = Fields::new();
    fields.insert(JOB_ID.into(), record.job_id.to_string());
    fields.insert(STATUS.into(), record.status.to_string());
    fields.insert(CREATED_AT.into(), encode_time(record.created_at));
    fields.insert(UPDATED_AT.into(), encode_time(record.updated_at));
    fields.insert(INPUT.into(), encode_json(INPUT, &record.input)?);

    if let Some(at) = record.started_at {
        fields.insert(STARTED_AT.into(), encode_time(at));
    }
    if let Some(at) = record.completed_at {
        fields.insert(COMPLETED_AT.into(), encode_time(at));
    }
    match &record.outcome {
        Some(JobOutcome::Completed { result }) => {
            fields.insert(RESULT.into(), encode_json(RESULT, result)?);
        }
        Some(JobOutcome::Failed { error }) => {
            fields.insert(ERROR.into(), encode_json(ERROR, error)?);
        }
        Some(JobOutcome::Cancelled) | None => {}
    }
    Ok(fields)
}

fn required<'a>(fields: &'a Fields, name: &'static str) -> Result<&'a str, CodecError> {
    fields
        .get(name)
        .map(String::as_str)
        .ok_or(CodecError::MissingField(name))
}

fn parse_time(field: &'static str, raw: &str) -> Result<DateTime<Utc>, CodecError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| CodecError::Malformed {
            field,
            reason: e.to_string(),
        })
}

fn optional_time(fields: &Fields, name: &'static str) -> Result<Option<DateTime<Utc>>, CodecError> {
    fields
        .get(name)
        .map(|raw| parse_time(name, raw))
        .transpose()
}

fn parse_json<T: DeserializeOwned>(field: &'static str, raw: &str) -> Result<T, CodecError> {
    serde_json::from_str(raw).map_err(|e| CodecError::Malformed {
        field,
        reason: e.to_string(),
    })
}

fn optional_json<T: DeserializeOwned>(
    fields: &Fields,
    name: &'static str,
) -> Result<Option<T>, CodecError> {
    fields.get(name).map(|raw| parse_json(name, raw)).transpose()
}

/// Rebuild a record, rejecting any status/payload combination that breaks
/// the "result iff COMPLETED, error iff FAILED" rule
pub fn decode(fields: &Fields) -> Result<JobRecord, CodecError> {
    let status = required(fields, STATUS)?
        .parse::<JobStatus>()
        .map_err(|e| CodecError::Malformed {
            field: STATUS,
            reason: e.to_string(),
        })?;

    let result: Option<AnalysisResult> = optional_json(fields, RESULT)?;
    let error: Option<ErrorInfo> = optional_json(fields, ERROR)?;

    let outcome = match (status, result, error) {
        (JobStatus::Pending | JobStatus::Processing, None, None) => None,
        (JobStatus::Completed, Some(result), None) => Some(JobOutcome::Completed { result }),
        (JobStatus::Failed, None, Some(error)) => Some(JobOutcome::Failed { error }),
        (JobStatus::Cancelled, None, None) => Some(JobOutcome::Cancelled),
        (status, _, _) => return Err(CodecError::Inconsistent { status }),
    };

    let input: AnalysisRequest = parse_json(INPUT, required(fields, INPUT)?)?;

    Ok(JobRecord {
        job_id: JobId::from(required(fields, JOB_ID)?),
        status,
        input,
        created_at: parse_time(CREATED_AT, required(fields, CREATED_AT)?)?,
        updated_at: parse_time(UPDATED_AT, required(fields, UPDATED_AT)?)?,
        started_at: optional_time(fields, STARTED_AT)?,
        completed_at: optional_time(fields, COMPLETED_AT)?,
        outcome,
    })
}

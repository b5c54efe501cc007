//! Job domain types
//!
//! A job record is created by the orchestrator in `PENDING` and driven by a
//! runner through the transition table below. Terminal states never change.
//!
//! ```text
//! PENDING    --start-->   PROCESSING
//! PROCESSING --succeed--> COMPLETED
//! PROCESSING --fail-->    FAILED
//! PENDING    --cancel-->  CANCELLED
//! PROCESSING --cancel-->  CANCELLED
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::analysis::{AnalysisRequest, AnalysisResult};
use crate::domain::error::ErrorInfo;

/// Opaque job identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Create a new random job ID
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Job execution status
///
/// The serialized names are part of the public API; consumers branch on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Pending,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
        }
    }

    /// Check if the job is in a terminal state
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Status reached by applying `event` from this status, if the guard allows it
    pub fn next(self, event: EventKind) -> Option<JobStatus> {
        event.sources().contains(&self).then(|| event.target())
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown job status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for JobStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// Lifecycle event kinds, without their payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Start,
    Succeed,
    Fail,
    Cancel,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::Start,
        EventKind::Succeed,
        EventKind::Fail,
        EventKind::Cancel,
    ];

    /// Statuses from which this event may be applied
    pub fn sources(self) -> &'static [JobStatus] {
        match self {
            EventKind::Start => &[JobStatus::Pending],
            EventKind::Succeed | EventKind::Fail => &[JobStatus::Processing],
            EventKind::Cancel => &[JobStatus::Pending, JobStatus::Processing],
        }
    }

    pub fn target(self) -> JobStatus {
        match self {
            EventKind::Start => JobStatus::Processing,
            EventKind::Succeed => JobStatus::Completed,
            EventKind::Fail => JobStatus::Failed,
            EventKind::Cancel => JobStatus::Cancelled,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::Start => "dispatch-start",
            EventKind::Succeed => "success",
            EventKind::Fail => "failure",
            EventKind::Cancel => "cancel",
        };
        f.write_str(name)
    }
}

/// Lifecycle event together with the payload its target state requires
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    Start,
    Succeed(AnalysisResult),
    Fail(ErrorInfo),
    Cancel,
}

impl JobEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            JobEvent::Start => EventKind::Start,
            JobEvent::Succeed(_) => EventKind::Succeed,
            JobEvent::Fail(_) => EventKind::Fail,
            JobEvent::Cancel => EventKind::Cancel,
        }
    }
}

/// Terminal outcome of a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobOutcome {
    Completed { result: AnalysisResult },
    Failed { error: ErrorInfo },
    Cancelled,
}

impl JobOutcome {
    pub fn status(&self) -> JobStatus {
        match self {
            JobOutcome::Completed { .. } => JobStatus::Completed,
            JobOutcome::Failed { .. } => JobStatus::Failed,
            JobOutcome::Cancelled => JobStatus::Cancelled,
        }
    }
}

/// Durable job record
///
/// `outcome` is `Some` exactly when `status` is terminal, and its variant
/// always matches `status`. Stores reject records that break this on decode.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRecord {
    pub job_id: JobId,
    pub status: JobStatus,
    pub input: AnalysisRequest,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub outcome: Option<JobOutcome>,
}

impl JobRecord {
    /// Fresh record in `PENDING`
    pub fn pending(job_id: JobId, input: AnalysisRequest, now: DateTime<Utc>) -> Self {
        Self {
            job_id,
            status: JobStatus::Pending,
            input,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            outcome: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        match &self.outcome {
            Some(JobOutcome::Completed { result }) => Some(result),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ErrorInfo> {
        match &self.outcome {
            Some(JobOutcome::Failed { error }) => Some(error),
            _ => None,
        }
    }

    /// Time spent between entering `PROCESSING` and completion
    pub fn processing_time(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.completed_at) {
            (Some(started), Some(completed)) => Some(completed - started),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_transition_table() {
        assert_eq!(
            JobStatus::Pending.next(EventKind::Start),
            Some(JobStatus::Processing)
        );
        assert_eq!(
            JobStatus::Processing.next(EventKind::Succeed),
            Some(JobStatus::Completed)
        );
        assert_eq!(
            JobStatus::Processing.next(EventKind::Fail),
            Some(JobStatus::Failed)
        );
        assert_eq!(
            JobStatus::Pending.next(EventKind::Cancel),
            Some(JobStatus::Cancelled)
        );
        assert_eq!(
            JobStatus::Processing.next(EventKind::Cancel),
            Some(JobStatus::Cancelled)
        );

        assert_eq!(JobStatus::Pending.next(EventKind::Succeed), None);
        assert_eq!(JobStatus::Pending.next(EventKind::Fail), None);
        assert_eq!(JobStatus::Processing.next(EventKind::Start), None);
    }

    #[test]
    fn test_terminal_states_reject_every_event() {
        for status in JobStatus::ALL.into_iter().filter(|s| s.is_terminal()) {
            for event in EventKind::ALL {
                assert_eq!(status.next(event), None, "{status} accepted {event}");
            }
        }
    }

    #[test]
    fn test_status_wire_names() {
        for status in JobStatus::ALL {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("pending".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_outcome_status_matches_variant() {
        let failed = JobOutcome::Failed {
            error: ErrorInfo::internal("boom"),
        };
        assert_eq!(failed.status(), JobStatus::Failed);
        assert_eq!(JobOutcome::Cancelled.status(), JobStatus::Cancelled);
    }

    #[test]
    fn test_generated_ids_are_distinct() {
        assert_ne!(JobId::generate(), JobId::generate());
    }

    fn event_kind() -> impl Strategy<Value = EventKind> {
        prop::sample::select(EventKind::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn walks_never_leave_a_terminal_state(events in prop::collection::vec(event_kind(), 0..24)) {
            let mut status = JobStatus::Pending;
            let mut path = vec![status];

            for event in events {
                if let Some(next) = status.next(event) {
                    prop_assert!(!status.is_terminal());
                    status = next;
                    path.push(status);
                }
            }

            // Every accepted walk is a prefix of PENDING [-> PROCESSING] [-> terminal]
            prop_assert!(path.len() <= 3);
            prop_assert_eq!(path[0], JobStatus::Pending);
            for window in path.windows(2) {
                prop_assert!(!window[0].is_terminal());
            }
        }
    }
}

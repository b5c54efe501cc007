//! Job Lifecycle Manager
//!
//! The single writer of job records. Every status change goes through
//! [`JobLifecycle::transition`], which applies the event's guard and the
//! write as one conditional update against the store, so concurrent callers
//! (executor finishing, API cancelling, a redelivered job starting) are
//! linearized per job and exactly one of them wins.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use framewise_core::domain::analysis::AnalysisRequest;
use framewise_core::domain::job::{EventKind, JobEvent, JobId, JobRecord, JobStatus};
use tracing::{debug, info, warn};

use crate::codec::{self, CodecError};
use crate::store::{CasOutcome, Fields, RecordStore, StoreError};

pub const DEFAULT_TTL: Duration = Duration::from_secs(86_400);
pub const DEFAULT_KEY_PREFIX: &str = "job:";

#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Record lifetime, refreshed on every successful transition
    pub ttl: Duration,
    pub key_prefix: String,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("job {0} already exists")]
    DuplicateJob(JobId),

    #[error("job {0} not found")]
    NotFound(JobId),

    #[error("job {job_id} cannot take {event} while {from}")]
    InvalidTransition {
        job_id: JobId,
        from: JobStatus,
        event: EventKind,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("job {job_id} has a corrupt record: {source}")]
    Corrupt {
        job_id: JobId,
        #[source]
        source: CodecError,
    },
}

pub type Result<T> = std::result::Result<T, LifecycleError>;

/// Hands out non-decreasing timestamps at the precision records store
#[derive(Debug, Default)]
struct Clock {
    last: Mutex<Option<DateTime<Utc>>>,
}

impl Clock {
    fn stamp(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let now = now.trunc_subsecs(6);
        let mut last = self.last.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let stamp = match *last {
            Some(prev) if prev > now => prev,
            _ => now,
        };
        *last = Some(stamp);
        stamp
    }
}

#[derive(Clone)]
pub struct JobLifecycle {
    store: Arc<dyn RecordStore>,
    config: LifecycleConfig,
    clock: Arc<Clock>,
}

impl JobLifecycle {
    pub fn new(store: Arc<dyn RecordStore>, config: LifecycleConfig) -> Self {
        Self {
            store,
            config,
            clock: Arc::new(Clock::default()),
        }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    fn key(&self, job_id: &JobId) -> String {
        format!("{}{}", self.config.key_prefix, job_id)
    }

    fn corrupt(job_id: &JobId) -> impl FnOnce(CodecError) -> LifecycleError + '_ {
        move |source| LifecycleError::Corrupt {
            job_id: job_id.clone(),
            source,
        }
    }

    /// Create a `PENDING` record for a fresh job id
    pub async fn create(&self, job_id: JobId, input: AnalysisRequest) -> Result<JobRecord> {
        let record = JobRecord::pending(job_id, input, self.clock.stamp(Utc::now()));
        let fields = codec::encode(&record).map_err(Self::corrupt(&record.job_id))?;

        let created = self
            .store
            .create_if_absent(&self.key(&record.job_id), &fields, self.config.ttl)
            .await?;
        if !created {
            return Err(LifecycleError::DuplicateJob(record.job_id));
        }

        info!(job_id = %record.job_id, "Job created");
        Ok(record)
    }

    /// Apply `event` to the job and return the record as written
    pub async fn transition(&self, job_id: &JobId, event: JobEvent) -> Result<JobRecord> {
        let kind = event.kind();
        let target = kind.target();
        // Wall-clock steps backwards must not make updated_at decrease
        let now = codec::encode_time(self.clock.stamp(Utc::now()));

        let mut updates = Fields::new();
        updates.insert(codec::STATUS.into(), target.to_string());
        updates.insert(codec::UPDATED_AT.into(), now.clone());
        match &event {
            JobEvent::Start => {
                updates.insert(codec::STARTED_AT.into(), now);
            }
            JobEvent::Succeed(result) => {
                let json = codec::encode_json(codec::RESULT, result)
                    .map_err(Self::corrupt(job_id))?;
                updates.insert(codec::RESULT.into(), json);
                updates.insert(codec::COMPLETED_AT.into(), now);
            }
            JobEvent::Fail(error) => {
                let json =
                    codec::encode_json(codec::ERROR, error).map_err(Self::corrupt(job_id))?;
                updates.insert(codec::ERROR.into(), json);
                updates.insert(codec::COMPLETED_AT.into(), now);
            }
            JobEvent::Cancel => {}
        }

        let expected: Vec<&str> = kind.sources().iter().map(|s| s.as_str()).collect();
        let outcome = self
            .store
            .compare_and_set(
                &self.key(job_id),
                codec::STATUS,
                &expected,
                &updates,
                self.config.ttl,
            )
            .await?;

        match outcome {
            CasOutcome::Applied(fields) => {
                let record = codec::decode(&fields).map_err(Self::corrupt(job_id))?;
                info!(job_id = %job_id, status = %record.status, "Job transitioned on {}", kind);
                Ok(record)
            }
            CasOutcome::Mismatch(Some(current)) => {
                let from = current.parse::<JobStatus>().map_err(|e| LifecycleError::Corrupt {
                    job_id: job_id.clone(),
                    source: CodecError::Malformed {
                        field: codec::STATUS,
                        reason: e.to_string(),
                    },
                })?;
                debug!(job_id = %job_id, "Rejected {} while {}", kind, from);
                Err(LifecycleError::InvalidTransition {
                    job_id: job_id.clone(),
                    from,
                    event: kind,
                })
            }
            CasOutcome::Mismatch(None) => Err(LifecycleError::Corrupt {
                job_id: job_id.clone(),
                source: CodecError::MissingField(codec::STATUS),
            }),
            CasOutcome::Missing => Err(LifecycleError::NotFound(job_id.clone())),
        }
    }

    /// Current record; `None` if it never existed or has expired
    pub async fn read(&self, job_id: &JobId) -> Result<Option<JobRecord>> {
        match self.store.get_all(&self.key(job_id)).await? {
            Some(fields) => codec::decode(&fields)
                .map(Some)
                .map_err(Self::corrupt(job_id)),
            None => Ok(None),
        }
    }

    /// Check that the store answers
    pub async fn ping(&self) -> Result<()> {
        Ok(self.store.ping().await?)
    }

    pub async fn delete(&self, job_id: &JobId) -> Result<bool> {
        let removed = self.store.delete(&self.key(job_id)).await?;
        if removed {
            info!(job_id = %job_id, "Job deleted");
        }
        Ok(removed)
    }

    /// Up to `limit` live records, newest first
    ///
    /// Which records make the cut is up to the store's scan order.
    /// Records that vanish mid-listing are skipped and corrupt ones are
    /// logged and skipped.
    pub async fn list(&self, limit: usize) -> Result<Vec<JobRecord>> {
        let keys = self.store.scan(&self.config.key_prefix, limit).await?;

        let mut records = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(fields) = self.store.get_all(&key).await? else {
                continue;
            };
            match codec::decode(&fields) {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping corrupt record {}: {}", key, e),
            }
        }

        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use framewise_core::domain::analysis::{
        Analysis, AnalysisResult, ProviderInfo, VideoMetadata,
    };
    use framewise_core::domain::error::{ErrorCode, ErrorInfo};

    fn lifecycle() -> JobLifecycle {
        JobLifecycle::new(Arc::new(MemoryStore::new()), LifecycleConfig::default())
    }

    fn input() -> AnalysisRequest {
        AnalysisRequest::new("https://cdn.example.com/clip.mp4")
    }

    fn result() -> AnalysisResult {
        AnalysisResult {
            video_metadata: VideoMetadata {
                format: "mp4".to_string(),
                size_bytes: Some(1024),
                content_type: Some("video/mp4".to_string()),
            },
            analysis: Analysis {
                markdown: "# Clip".to_string(),
                summary: "# Clip".to_string(),
                language: "pt-BR".to_string(),
            },
            ai_provider: ProviderInfo {
                provider: "openrouter".to_string(),
                model: "m".to_string(),
                tokens_used: 42,
                processing_time_ms: 1500,
                attempts: 1,
            },
        }
    }

    #[tokio::test]
    async fn test_create_rejects_duplicates() {
        let lifecycle = lifecycle();
        let id = JobId::from("dup");

        let record = lifecycle.create(id.clone(), input()).await.unwrap();
        assert_eq!(record.status, JobStatus::Pending);

        let err = lifecycle.create(id, input()).await.unwrap_err();
        assert!(matches!(err, LifecycleError::DuplicateJob(_)));
    }

    #[tokio::test]
    async fn test_happy_path_sets_timestamps_and_result() {
        let lifecycle = lifecycle();
        let id = JobId::generate();
        let created = lifecycle.create(id.clone(), input()).await.unwrap();

        let started = lifecycle.transition(&id, JobEvent::Start).await.unwrap();
        assert_eq!(started.status, JobStatus::Processing);
        assert!(started.started_at.is_some());
        assert!(started.completed_at.is_none());
        assert!(started.updated_at >= created.created_at);

        let done = lifecycle
            .transition(&id, JobEvent::Succeed(result()))
            .await
            .unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.result(), Some(&result()));
        assert!(done.error().is_none());
        assert!(done.completed_at.is_some());
        assert_eq!(done.input, input());

        assert_eq!(lifecycle.read(&id).await.unwrap(), Some(done));
    }

    #[tokio::test]
    async fn test_terminal_states_are_immutable() {
        let lifecycle = lifecycle();
        let id = JobId::generate();
        lifecycle.create(id.clone(), input()).await.unwrap();
        lifecycle.transition(&id, JobEvent::Start).await.unwrap();
        lifecycle
            .transition(
                &id,
                JobEvent::Fail(ErrorInfo::new(ErrorCode::TimeoutError, "timed out")),
            )
            .await
            .unwrap();

        for event in [JobEvent::Start, JobEvent::Cancel, JobEvent::Succeed(result())] {
            let err = lifecycle.transition(&id, event).await.unwrap_err();
            assert!(matches!(
                err,
                LifecycleError::InvalidTransition {
                    from: JobStatus::Failed,
                    ..
                }
            ));
        }

        let record = lifecycle.read(&id).await.unwrap().unwrap();
        assert_eq!(record.error().map(|e| e.code), Some(ErrorCode::TimeoutError));
    }

    #[tokio::test]
    async fn test_cancel_keeps_completed_at_unset() {
        let lifecycle = lifecycle();
        let id = JobId::generate();
        lifecycle.create(id.clone(), input()).await.unwrap();

        let cancelled = lifecycle.transition(&id, JobEvent::Cancel).await.unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);
        assert!(cancelled.completed_at.is_none());
        assert!(cancelled.result().is_none() && cancelled.error().is_none());

        // A redelivered job must not start after cancellation
        let err = lifecycle.transition(&id, JobEvent::Start).await.unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::InvalidTransition {
                event: EventKind::Start,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_missing_job() {
        let lifecycle = lifecycle();
        let id = JobId::from("ghost");

        assert!(matches!(
            lifecycle.transition(&id, JobEvent::Start).await,
            Err(LifecycleError::NotFound(_))
        ));
        assert_eq!(lifecycle.read(&id).await.unwrap(), None);
        assert!(!lifecycle.delete(&id).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_record_is_not_found() {
        let lifecycle = JobLifecycle::new(
            Arc::new(MemoryStore::new()),
            LifecycleConfig {
                ttl: Duration::from_secs(10),
                ..Default::default()
            },
        );
        let id = JobId::generate();
        lifecycle.create(id.clone(), input()).await.unwrap();

        tokio::time::advance(Duration::from_secs(8)).await;
        lifecycle.transition(&id, JobEvent::Start).await.unwrap();

        // The transition refreshed the TTL
        tokio::time::advance(Duration::from_secs(8)).await;
        assert!(lifecycle.read(&id).await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(lifecycle.read(&id).await.unwrap(), None);
        assert!(matches!(
            lifecycle.transition(&id, JobEvent::Succeed(result())).await,
            Err(LifecycleError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_transitions_have_one_winner() {
        let lifecycle = lifecycle();
        let id = JobId::generate();
        lifecycle.create(id.clone(), input()).await.unwrap();
        lifecycle.transition(&id, JobEvent::Start).await.unwrap();

        let (succeed, cancel) = tokio::join!(
            lifecycle.transition(&id, JobEvent::Succeed(result())),
            lifecycle.transition(&id, JobEvent::Cancel),
        );
        assert!(succeed.is_ok() ^ cancel.is_ok());

        let record = lifecycle.read(&id).await.unwrap().unwrap();
        let winner = if succeed.is_ok() {
            JobStatus::Completed
        } else {
            JobStatus::Cancelled
        };
        assert_eq!(record.status, winner);
    }

    #[test]
    fn test_clock_never_goes_backwards() {
        use chrono::{TimeDelta, TimeZone};

        let clock = Clock::default();
        let t1 = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();

        assert_eq!(clock.stamp(t1), t1);
        assert_eq!(clock.stamp(t1 - TimeDelta::seconds(5)), t1);
        assert_eq!(
            clock.stamp(t1 + TimeDelta::seconds(1)),
            t1 + TimeDelta::seconds(1)
        );

        // Sub-microsecond digits are dropped to match what the store keeps
        let fine = t1 + TimeDelta::seconds(2) + TimeDelta::nanoseconds(1_500);
        assert_eq!(
            clock.stamp(fine),
            t1 + TimeDelta::seconds(2) + TimeDelta::microseconds(1)
        );
    }

    #[tokio::test]
    async fn test_updated_at_is_non_decreasing() {
        let lifecycle = lifecycle();
        let id = JobId::generate();
        let created = lifecycle.create(id.clone(), input()).await.unwrap();
        let started = lifecycle.transition(&id, JobEvent::Start).await.unwrap();
        let done = lifecycle
            .transition(&id, JobEvent::Succeed(result()))
            .await
            .unwrap();

        assert!(created.updated_at <= started.updated_at);
        assert!(started.updated_at <= done.updated_at);
        assert!(done.started_at <= done.completed_at);
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let lifecycle = lifecycle();
        for name in ["a", "b", "c"] {
            lifecycle.create(JobId::from(name), input()).await.unwrap();
        }

        let records = lifecycle.list(10).await.unwrap();
        assert_eq!(records.len(), 3);
        assert!(records.windows(2).all(|w| w[0].created_at >= w[1].created_at));
        assert_eq!(lifecycle.list(2).await.unwrap().len(), 2);
    }
}

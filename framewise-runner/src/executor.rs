//! Job Executor
//!
//! Runs one job end to end:
//!
//! 1. Move the record to `PROCESSING`. If that is refused the job was
//!    already started, finished or cancelled, and this delivery is a no-op.
//! 2. Validate the input without touching the remote dependency.
//! 3. Call the remote model through the resilience layer.
//! 4. Record `COMPLETED` with the assembled result, or `FAILED` with a
//!    classified error. Losing that write to a concurrent cancel is fine:
//!    the terminal state already recorded stands. A store failure on this
//!    write is retried once before giving up.
//!
//! Safe to invoke more than once for the same job.

use std::sync::Arc;
use std::time::Duration;

use framewise_client::ClientError;
use framewise_core::domain::analysis::{
    Analysis, AnalysisRequest, AnalysisResult, ProviderInfo,
};
use framewise_core::domain::error::{ErrorCode, ErrorInfo};
use framewise_core::domain::job::{JobEvent, JobId, JobRecord};
use framewise_store::{JobLifecycle, LifecycleError};
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::analyzer::{VideoAnalyzer, build_prompt};
use crate::resilience::{ResilienceError, ResilientCaller};
use crate::validation::InputValidator;

const SUMMARY_LINES: usize = 3;
const SUMMARY_MAX_CHARS: usize = 500;

const FINISH_ATTEMPTS: u32 = 2;
const FINISH_RETRY_DELAY: Duration = Duration::from_millis(500);

/// What a single delivery of a job amounted to
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// This delivery drove the job to a terminal state
    Finished(JobRecord),
    /// The job was not `PENDING` (or no longer exists); nothing was done
    Skipped,
    /// Work ran, but another writer reached a terminal state first
    Superseded,
}

pub struct JobExecutor {
    lifecycle: JobLifecycle,
    validator: Arc<dyn InputValidator>,
    analyzer: Arc<dyn VideoAnalyzer>,
    caller: ResilientCaller,
}

impl JobExecutor {
    pub fn new(
        lifecycle: JobLifecycle,
        validator: Arc<dyn InputValidator>,
        analyzer: Arc<dyn VideoAnalyzer>,
        caller: ResilientCaller,
    ) -> Self {
        Self {
            lifecycle,
            validator,
            analyzer,
            caller,
        }
    }

    pub fn lifecycle(&self) -> &JobLifecycle {
        &self.lifecycle
    }

    /// Execute the job once
    ///
    /// Only store failures surface as errors; everything that goes wrong
    /// with the job itself ends up on the record.
    pub async fn run(
        &self,
        job_id: &JobId,
        input: &AnalysisRequest,
    ) -> Result<RunOutcome, LifecycleError> {
        match self.lifecycle.transition(job_id, JobEvent::Start).await {
            Ok(_) => info!(job_id = %job_id, "Processing job"),
            Err(LifecycleError::InvalidTransition { from, .. }) => {
                info!(job_id = %job_id, "Skipping job already {}", from);
                return Ok(RunOutcome::Skipped);
            }
            Err(LifecycleError::NotFound(_)) => {
                warn!(job_id = %job_id, "Skipping job with no record");
                return Ok(RunOutcome::Skipped);
            }
            Err(e) => return Err(e),
        }

        let event = match self.analyze(job_id, input).await {
            Ok(result) => JobEvent::Succeed(result),
            Err(error) => {
                if error.code.is_client_error() {
                    info!(job_id = %job_id, code = %error.code, "Job rejected: {}", error.message);
                } else {
                    warn!(job_id = %job_id, code = %error.code, "Job failed: {}", error.message);
                }
                JobEvent::Fail(error)
            }
        };

        self.finish(job_id, event).await
    }

    /// Record an unexpected crash of the job body
    pub async fn record_crash(
        &self,
        job_id: &JobId,
        message: &str,
    ) -> Result<RunOutcome, LifecycleError> {
        let error = ErrorInfo::internal(format!("job crashed: {}", message));
        self.finish(job_id, JobEvent::Fail(error)).await
    }

    async fn finish(&self, job_id: &JobId, event: JobEvent) -> Result<RunOutcome, LifecycleError> {
        let mut attempt = 1;
        loop {
            match self.lifecycle.transition(job_id, event.clone()).await {
                Ok(record) => {
                    info!(job_id = %job_id, "Job finished as {}", record.status);
                    return Ok(RunOutcome::Finished(record));
                }
                // Also reached when a retried write had in fact been applied
                Err(LifecycleError::InvalidTransition { from, .. }) => {
                    info!(job_id = %job_id, "Job already {}, discarding outcome", from);
                    return Ok(RunOutcome::Superseded);
                }
                Err(LifecycleError::NotFound(_)) => {
                    warn!(job_id = %job_id, "Job record vanished, discarding outcome");
                    return Ok(RunOutcome::Superseded);
                }
                Err(LifecycleError::Store(e)) if attempt < FINISH_ATTEMPTS => {
                    warn!(
                        job_id = %job_id,
                        "Failed to record job outcome (attempt {}): {}", attempt, e
                    );
                    attempt += 1;
                    tokio::time::sleep(FINISH_RETRY_DELAY).await;
                }
                Err(e) => {
                    error!(job_id = %job_id, "Failed to record job outcome: {}", e);
                    return Err(e);
                }
            }
        }
    }

    async fn analyze(
        &self,
        job_id: &JobId,
        input: &AnalysisRequest,
    ) -> Result<AnalysisResult, ErrorInfo> {
        let video_metadata = self
            .validator
            .validate(&input.video_url)
            .await
            .map_err(|e| e.to_error_info())?;

        let prompt = build_prompt(input);
        let started = Instant::now();
        let outcome = self
            .caller
            .execute(|| self.analyzer.analyze(&input.video_url, &prompt))
            .await;
        let elapsed = started.elapsed();

        let attempted = outcome.map_err(|e| classify(&e))?;
        let completion = attempted.value;

        info!(
            job_id = %job_id,
            "Analysis returned after {} attempt(s) in {:?} ({} tokens)",
            attempted.attempts, elapsed, completion.total_tokens
        );

        Ok(AnalysisResult {
            video_metadata,
            analysis: Analysis {
                summary: summarize(&completion.content),
                markdown: completion.content,
                language: input.options.language.clone(),
            },
            ai_provider: ProviderInfo {
                provider: self.analyzer.provider().to_string(),
                model: completion.model,
                tokens_used: completion.total_tokens,
                processing_time_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                attempts: attempted.attempts,
            },
        })
    }
}

/// Map a protected-call failure onto the recorded error taxonomy
pub fn classify(error: &ResilienceError<ClientError>) -> ErrorInfo {
    match error {
        ResilienceError::CircuitOpen { retry_after } => {
            // Round up so callers never retry a moment too early
            let seconds = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            ErrorInfo::new(
                ErrorCode::CircuitOpen,
                "analysis service is temporarily unavailable",
            )
            .with_retry_after(seconds)
        }
        ResilienceError::Operation { attempts, source } => {
            let info = match source {
                ClientError::Timeout(_) => {
                    ErrorInfo::new(ErrorCode::TimeoutError, source.to_string())
                }
                ClientError::RateLimited { retry_after } => {
                    ErrorInfo::new(ErrorCode::RateLimitExceeded, source.to_string())
                        .with_retry_after(*retry_after)
                }
                ClientError::Server { .. }
                | ClientError::Api { .. }
                | ClientError::Transport(_)
                | ClientError::Parse(_) => {
                    ErrorInfo::new(ErrorCode::UpstreamApiError, source.to_string())
                }
                ClientError::InvalidConfig(_) => ErrorInfo::internal(source.to_string()),
            };
            info.with_details(format!("after {} attempt(s)", attempts))
        }
    }
}

/// Plain-text summary: first few non-empty lines joined, capped in length
pub fn summarize(markdown: &str) -> String {
    let joined = markdown
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(SUMMARY_LINES)
        .collect::<Vec<_>>()
        .join(" ");
    joined.chars().take(SUMMARY_MAX_CHARS).collect()
}

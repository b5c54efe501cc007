//! Error taxonomy recorded on failed jobs

use std::fmt;

use serde::{Deserialize, Serialize};

/// Machine-readable error code stored on a `FAILED` job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Input errors, caused by the submitter
    InvalidVideoUrl,
    VideoNotFound,
    UnsupportedFormat,
    VideoTooLarge,

    // Dependency errors
    RateLimitExceeded,
    TimeoutError,
    UpstreamApiError,

    // Protection errors
    CircuitOpen,

    // Everything else
    InternalError,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::InvalidVideoUrl => "INVALID_VIDEO_URL",
            ErrorCode::VideoNotFound => "VIDEO_NOT_FOUND",
            ErrorCode::UnsupportedFormat => "UNSUPPORTED_FORMAT",
            ErrorCode::VideoTooLarge => "VIDEO_TOO_LARGE",
            ErrorCode::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ErrorCode::TimeoutError => "TIMEOUT_ERROR",
            ErrorCode::UpstreamApiError => "UPSTREAM_API_ERROR",
            ErrorCode::CircuitOpen => "CIRCUIT_OPEN",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Whether the submitter caused this error
    pub fn is_client_error(self) -> bool {
        matches!(
            self,
            ErrorCode::InvalidVideoUrl
                | ErrorCode::VideoNotFound
                | ErrorCode::UnsupportedFormat
                | ErrorCode::VideoTooLarge
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error payload of a `FAILED` job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Seconds until retrying the submission is worthwhile
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl ErrorInfo {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            retry_after: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }
}

//! Error types for the analysis client

use std::time::Duration;

use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when calling the remote model
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// The request did not finish within the configured limit
    #[error("request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// Upstream asked us to back off (HTTP 429)
    #[error("rate limit exceeded, retry after {retry_after}s")]
    RateLimited { retry_after: u64 },

    /// Upstream failed in a way that may clear up (5xx, 408)
    #[error("upstream error (status {status}): {message}")]
    Server { status: u16, message: String },

    /// Upstream rejected the request (4xx other than 408/429)
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Connection-level failure before a response arrived
    #[error("HTTP request failed: {0}")]
    Transport(String),

    /// Failed to parse response
    #[error("failed to parse response: {0}")]
    Parse(String),

    /// Client could not be built from its configuration
    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),
}

impl ClientError {
    /// Create the matching error for a non-success status code
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            408 | 500..=599 => Self::Server { status, message },
            _ => Self::Api { status, message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_splits_by_status() {
        assert!(matches!(
            ClientError::api_error(503, "down"),
            ClientError::Server { status: 503, .. }
        ));
        assert!(matches!(
            ClientError::api_error(408, "slow"),
            ClientError::Server { status: 408, .. }
        ));
        assert!(matches!(
            ClientError::api_error(401, "bad key"),
            ClientError::Api { status: 401, .. }
        ));
    }
}

//! API Error Handling
//!
//! Unified error types and conversion for API responses.
//! Every error renders as `{"error": CODE, "message": text}`.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use framewise_core::domain::analysis::RequestError;
use framewise_core::domain::error::ErrorCode;
use framewise_store::LifecycleError;

use crate::service::job_service::JobError;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    InvalidVideoUrl(String),
    Conflict(String),
    InternalError(String),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, &str) {
        match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST", msg),
            ApiError::InvalidVideoUrl(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorCode::InvalidVideoUrl.as_str(),
                msg,
            ),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::InternalError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::InternalError.as_str(),
                msg,
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        if status.is_server_error() {
            tracing::error!("Internal error: {}", message);
        }

        (
            status,
            Json(serde_json::json!({ "error": code, "message": message })),
        )
            .into_response()
    }
}

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::InvalidRequest(
                e @ (RequestError::MissingVideoUrl | RequestError::UnsupportedScheme(_)),
            ) => ApiError::InvalidVideoUrl(e.to_string()),
            JobError::InvalidRequest(e) => ApiError::BadRequest(e.to_string()),
            JobError::NotFound(id) => ApiError::NotFound(format!("Job {} not found", id)),
            e @ JobError::AlreadyFinished { .. } => ApiError::Conflict(e.to_string()),
            JobError::Dispatch(e) => {
                ApiError::InternalError(format!("Job could not be queued: {}", e))
            }
            JobError::Lifecycle(e) => match e {
                LifecycleError::DuplicateJob(_)
                | LifecycleError::InvalidTransition { .. } => {
                    ApiError::Conflict(e.to_string())
                }
                other => {
                    tracing::error!("Job store error: {:?}", other);
                    ApiError::InternalError("Internal server error".to_string())
                }
            },
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

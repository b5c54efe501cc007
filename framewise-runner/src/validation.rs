//! Input validation
//!
//! Checks a video URL before any remote analysis is attempted: scheme,
//! file extension, reachability (HTTP HEAD) and advertised size.

use std::time::Duration;

use async_trait::async_trait;
use framewise_core::domain::analysis::VideoMetadata;
use framewise_core::domain::error::{ErrorCode, ErrorInfo};
use reqwest::{Client, Url};
use tracing::debug;

pub const DEFAULT_FORMATS: [&str; 5] = ["mp4", "avi", "mov", "mkv", "webm"];
pub const DEFAULT_MAX_SIZE_MB: u64 = 500;

#[derive(Debug, Clone)]
pub struct ValidationRules {
    pub max_size_bytes: u64,
    /// Lower-case extensions without the dot
    pub supported_formats: Vec<String>,
    pub probe_timeout: Duration,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            max_size_bytes: DEFAULT_MAX_SIZE_MB * 1024 * 1024,
            supported_formats: DEFAULT_FORMATS.iter().map(|f| f.to_string()).collect(),
            probe_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid video URL: {0}")]
    InvalidUrl(String),

    #[error("format '{format}' is not supported (accepted: {accepted})")]
    UnsupportedFormat { format: String, accepted: String },

    #[error("video is not reachable: {0}")]
    Unreachable(String),

    #[error("video is {size_mb:.2}MB, limit is {limit_mb}MB")]
    TooLarge { size_mb: f64, limit_mb: u64 },
}

impl ValidationError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ValidationError::InvalidUrl(_) => ErrorCode::InvalidVideoUrl,
            ValidationError::UnsupportedFormat { .. } => ErrorCode::UnsupportedFormat,
            ValidationError::Unreachable(_) => ErrorCode::VideoNotFound,
            ValidationError::TooLarge { .. } => ErrorCode::VideoTooLarge,
        }
    }

    pub fn to_error_info(&self) -> ErrorInfo {
        ErrorInfo::new(self.code(), self.to_string())
    }
}

#[async_trait]
pub trait InputValidator: Send + Sync {
    /// Validate the video and report what was learned about it
    async fn validate(&self, video_url: &str) -> Result<VideoMetadata, ValidationError>;
}

/// Validator that probes the video with an HTTP HEAD request
#[derive(Debug, Clone)]
pub struct HttpValidator {
    client: Client,
    rules: ValidationRules,
}

impl HttpValidator {
    pub fn new(rules: ValidationRules) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(rules.probe_timeout).build()?;
        Ok(Self::with_client(client, rules))
    }

    pub fn with_client(client: Client, rules: ValidationRules) -> Self {
        Self { client, rules }
    }

    pub fn rules(&self) -> &ValidationRules {
        &self.rules
    }
}

#[async_trait]
impl InputValidator for HttpValidator {
    async fn validate(&self, video_url: &str) -> Result<VideoMetadata, ValidationError> {
        let url = parse_url(video_url)?;
        let format = check_format(&url, &self.rules)?;

        let response = self
            .client
            .head(url)
            .send()
            .await
            .map_err(|e| ValidationError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ValidationError::Unreachable(format!("HEAD answered {}", status)));
        }

        let headers = response.headers();
        let size_bytes = headers
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let content_type = headers
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        check_size(size_bytes, &self.rules)?;

        debug!("Validated video {} ({}, {:?} bytes)", video_url, format, size_bytes);

        Ok(VideoMetadata {
            format,
            size_bytes,
            content_type,
        })
    }
}

fn parse_url(video_url: &str) -> Result<Url, ValidationError> {
    let url = Url::parse(video_url.trim())
        .map_err(|e| ValidationError::InvalidUrl(format!("{}: {}", video_url, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ValidationError::InvalidUrl(format!(
            "scheme '{}' is not http or https",
            other
        ))),
    }
}

/// Extension of the last path segment, ignoring query and fragment
fn check_format(url: &Url, rules: &ValidationRules) -> Result<String, ValidationError> {
    let format = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    if rules.supported_formats.iter().any(|f| *f == format) {
        Ok(format)
    } else {
        Err(ValidationError::UnsupportedFormat {
            format,
            accepted: rules.supported_formats.join(", "),
        })
    }
}

/// A missing size is accepted; the upstream gets the final word
fn check_size(size_bytes: Option<u64>, rules: &ValidationRules) -> Result<(), ValidationError> {
    match size_bytes {
        Some(size) if size > rules.max_size_bytes => Err(ValidationError::TooLarge {
            size_mb: size as f64 / (1024.0 * 1024.0),
            limit_mb: rules.max_size_bytes / (1024 * 1024),
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, http::StatusCode, routing::get};

    fn format_of(url: &str) -> Result<String, ValidationError> {
        check_format(&parse_url(url)?, &ValidationRules::default())
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(format_of("https://cdn.example.com/a/clip.MP4").unwrap(), "mp4");
        assert_eq!(
            format_of("https://cdn.example.com/clip.webm?token=abc.mp3").unwrap(),
            "webm"
        );
        assert!(matches!(
            format_of("https://cdn.example.com/clip.gif"),
            Err(ValidationError::UnsupportedFormat { .. })
        ));
        assert!(matches!(
            format_of("https://cdn.example.com/"),
            Err(ValidationError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn test_url_checks() {
        assert!(matches!(
            parse_url("ftp://host/a.mp4"),
            Err(ValidationError::InvalidUrl(_))
        ));
        assert!(matches!(
            parse_url("not a url"),
            Err(ValidationError::InvalidUrl(_))
        ));
        assert!(parse_url(" https://host/a.mp4 ").is_ok());
    }

    #[test]
    fn test_size_limit() {
        let rules = ValidationRules::default();
        assert!(check_size(None, &rules).is_ok());
        assert!(check_size(Some(rules.max_size_bytes), &rules).is_ok());

        let err = check_size(Some(rules.max_size_bytes + 1), &rules).unwrap_err();
        assert_eq!(err.code(), ErrorCode::VideoTooLarge);
        assert!(err.to_error_info().message.contains("limit is 500MB"));
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_head_probe() {
        let app = Router::new()
            .route("/clip.mp4", get(|| async { "0123456789" }))
            .route("/gone.mp4", get(|| async { StatusCode::NOT_FOUND }));
        let base = serve(app).await;
        let validator = HttpValidator::new(ValidationRules::default()).unwrap();

        let metadata = validator
            .validate(&format!("{}/clip.mp4", base))
            .await
            .unwrap();
        assert_eq!(metadata.format, "mp4");

        let err = validator
            .validate(&format!("{}/gone.mp4", base))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::VideoNotFound);

        // Format is rejected before any request goes out
        let err = validator
            .validate(&format!("{}/clip.txt", base))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnsupportedFormat);
    }
}

//! Analysis request and result payloads

use serde::{Deserialize, Serialize};

/// How thorough the model should be
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisDepth {
    Quick,
    #[default]
    Standard,
    Detailed,
}

/// Options steering the analysis when no custom prompt is given
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisOptions {
    pub analysis_depth: AnalysisDepth,
    pub include_timestamps: bool,
    /// Language tag in `xx-XX` form
    pub language: String,
    pub extract_entities: bool,
    pub detect_sentiment: bool,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            analysis_depth: AnalysisDepth::Standard,
            include_timestamps: true,
            language: "pt-BR".to_string(),
            extract_entities: false,
            detect_sentiment: false,
        }
    }
}

/// Submitted job input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub video_url: String,
    #[serde(default)]
    pub options: AnalysisOptions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_prompt: Option<String>,
}

impl AnalysisRequest {
    pub fn new(video_url: impl Into<String>) -> Self {
        Self {
            video_url: video_url.into(),
            options: AnalysisOptions::default(),
            custom_prompt: None,
        }
    }

    /// Shape checks performed before a job is accepted
    ///
    /// Reachability, size and format are checked later by the runner.
    pub fn check(&self) -> Result<(), RequestError> {
        let url = self.video_url.trim();
        if url.is_empty() {
            return Err(RequestError::MissingVideoUrl);
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(RequestError::UnsupportedScheme(self.video_url.clone()));
        }
        if !is_language_tag(&self.options.language) {
            return Err(RequestError::InvalidLanguage(self.options.language.clone()));
        }
        if self
            .custom_prompt
            .as_deref()
            .is_some_and(|prompt| prompt.trim().is_empty())
        {
            return Err(RequestError::EmptyPrompt);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("video_url is required")]
    MissingVideoUrl,

    #[error("video_url must use http or https: {0}")]
    UnsupportedScheme(String),

    #[error("language must look like pt-BR: {0}")]
    InvalidLanguage(String),

    #[error("custom_prompt must not be blank")]
    EmptyPrompt,
}

fn is_language_tag(tag: &str) -> bool {
    let bytes = tag.as_bytes();
    bytes.len() == 5
        && bytes[..2].iter().all(u8::is_ascii_lowercase)
        && bytes[2] == b'-'
        && bytes[3..].iter().all(u8::is_ascii_uppercase)
}

/// What the runner learned about the video before calling the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    pub markdown: String,
    pub summary: String,
    pub language: String,
}

/// Provider and usage data for the remote call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub provider: String,
    pub model: String,
    pub tokens_used: u64,
    pub processing_time_ms: u64,
    pub attempts: u32,
}

/// Success payload of a `COMPLETED` job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub video_metadata: VideoMetadata,
    pub analysis: Analysis,
    pub ai_provider: ProviderInfo,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults_when_options_missing() {
        let req: AnalysisRequest =
            serde_json::from_str(r#"{"video_url": "https://cdn.example.com/a.mp4"}"#).unwrap();

        assert_eq!(req.options, AnalysisOptions::default());
        assert_eq!(req.custom_prompt, None);
        assert!(req.check().is_ok());
    }

    #[test]
    fn test_partial_options_keep_defaults() {
        let req: AnalysisRequest = serde_json::from_str(
            r#"{"video_url": "http://x/a.mp4", "options": {"analysis_depth": "detailed"}}"#,
        )
        .unwrap();

        assert_eq!(req.options.analysis_depth, AnalysisDepth::Detailed);
        assert!(req.options.include_timestamps);
        assert_eq!(req.options.language, "pt-BR");
    }

    #[test]
    fn test_check_rejects_bad_requests() {
        assert_eq!(
            AnalysisRequest::new("  ").check(),
            Err(RequestError::MissingVideoUrl)
        );
        assert!(matches!(
            AnalysisRequest::new("file:///tmp/a.mp4").check(),
            Err(RequestError::UnsupportedScheme(_))
        ));

        let mut req = AnalysisRequest::new("https://x/a.mp4");
        req.options.language = "english".to_string();
        assert!(matches!(req.check(), Err(RequestError::InvalidLanguage(_))));

        let mut req = AnalysisRequest::new("https://x/a.mp4");
        req.custom_prompt = Some("   ".to_string());
        assert_eq!(req.check(), Err(RequestError::EmptyPrompt));
    }

    #[test]
    fn test_language_tag() {
        assert!(is_language_tag("en-US"));
        assert!(is_language_tag("pt-BR"));
        assert!(!is_language_tag("EN-us"));
        assert!(!is_language_tag("en_US"));
        assert!(!is_language_tag("en-USA"));
    }
}

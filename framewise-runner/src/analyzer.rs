//! Remote analysis seam
//!
//! [`VideoAnalyzer`] is what the executor calls through the resilience layer.
//! The production implementation is the HTTP [`AnalysisClient`]; tests plug
//! in scripted fakes.

use std::time::Duration;

use async_trait::async_trait;
use framewise_client::{AnalysisClient, ClientError, Completion};
use framewise_core::domain::analysis::{AnalysisDepth, AnalysisRequest};

use crate::resilience::{Failure, FailureKind};

#[async_trait]
pub trait VideoAnalyzer: Send + Sync {
    /// Provider name recorded on results
    fn provider(&self) -> &str;

    async fn analyze(&self, video_url: &str, prompt: &str) -> Result<Completion, ClientError>;
}

#[async_trait]
impl VideoAnalyzer for AnalysisClient {
    fn provider(&self) -> &str {
        "openrouter"
    }

    async fn analyze(&self, video_url: &str, prompt: &str) -> Result<Completion, ClientError> {
        AnalysisClient::analyze(self, video_url, prompt).await
    }
}

impl Failure for ClientError {
    fn kind(&self) -> FailureKind {
        match self {
            ClientError::Timeout(_)
            | ClientError::RateLimited { .. }
            | ClientError::Server { .. }
            | ClientError::Transport(_) => FailureKind::Transient,
            // The upstream refused this particular request
            ClientError::Api {
                status: 400 | 413 | 415 | 422,
                ..
            } => FailureKind::Caller,
            ClientError::Api { .. } | ClientError::Parse(_) => FailureKind::Upstream,
            ClientError::InvalidConfig(_) => FailureKind::Caller,
        }
    }

    fn timeout(limit: Duration) -> Self {
        ClientError::Timeout(limit)
    }
}

/// Prompt sent with the video: the caller's own, or a short default
pub fn build_prompt(request: &AnalysisRequest) -> String {
    if let Some(prompt) = &request.custom_prompt {
        return prompt.clone();
    }

    let options = &request.options;
    let depth = match options.analysis_depth {
        AnalysisDepth::Quick => "Keep it brief.",
        AnalysisDepth::Standard => "Give a balanced level of detail.",
        AnalysisDepth::Detailed => "Go into depth.",
    };

    let mut prompt = format!(
        "Analyse this video and answer in {} using Markdown, starting with a title \
         and a short executive summary. {}",
        options.language, depth
    );
    if options.include_timestamps {
        prompt.push_str(" List key moments with MM:SS timestamps.");
    }
    if options.extract_entities {
        prompt.push_str(" Identify people, objects, places and brands.");
    }
    if options.detect_sentiment {
        prompt.push_str(" Describe the overall tone and sentiment.");
    }
    prompt
}

//! Chat-completions exchange

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::AnalysisClient;
use crate::error::{ClientError, Result};

const SYSTEM_INSTRUCTION: &str = "You are a video analysis expert. Answer in well structured \
     Markdown. Be objective and precise.";

/// Retry-After used when a 429 carries no usable header
const DEFAULT_RETRY_AFTER: u64 = 60;

/// What the model answered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub content: String,
    pub total_tokens: u64,
    /// Model that actually served the request
    pub model: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: serde_json::Value,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    total_tokens: u64,
}

impl AnalysisClient {
    /// Ask the model to analyse the video at `video_url`
    ///
    /// The video is passed by reference; the upstream fetches it itself.
    pub async fn analyze(&self, video_url: &str, prompt: &str) -> Result<Completion> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: json!([
                { "role": "system", "content": SYSTEM_INSTRUCTION },
                {
                    "role": "user",
                    "content": [
                        { "type": "text", "text": prompt },
                        { "type": "video_url", "video_url": { "url": video_url } }
                    ]
                }
            ]),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        tracing::debug!("Requesting analysis from {} with model {}", url, self.model);

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER);
            tracing::warn!("Upstream rate limited, retry after {}s", retry_after);
            return Err(ClientError::RateLimited { retry_after });
        }
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::warn!("Upstream answered {}: {}", status, error_text);
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                ClientError::Timeout(self.timeout)
            } else {
                ClientError::Parse(format!("Failed to parse JSON response: {}", e))
            }
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| ClientError::Parse("response carried no message content".to_string()))?;

        Ok(Completion {
            content,
            total_tokens: parsed.usage.map(|u| u.total_tokens).unwrap_or(0),
            model: parsed.model.unwrap_or_else(|| self.model.clone()),
        })
    }

    fn transport_error(&self, e: reqwest::Error) -> ClientError {
        if e.is_timeout() {
            ClientError::Timeout(self.timeout)
        } else {
            ClientError::Transport(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::{
        Json, Router,
        http::{HeaderMap, StatusCode},
        response::IntoResponse,
        routing::post,
    };
    use serde_json::{Value, json};

    use crate::{AnalysisClient, ClientConfig, ClientError};

    /// Serve `app` on an ephemeral port and return its base URL
    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn client(base_url: String) -> AnalysisClient {
        AnalysisClient::new(ClientConfig {
            base_url,
            api_key: "test-key".to_string(),
            model: "vision-model".to_string(),
            timeout: Duration::from_millis(500),
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_analyze_success() {
        let app = Router::new().route(
            "/chat/completions",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                assert_eq!(headers["authorization"], "Bearer test-key");
                assert_eq!(body["model"], "vision-model");
                assert_eq!(
                    body["messages"][1]["content"][1]["video_url"]["url"],
                    "https://cdn.example.com/a.mp4"
                );
                Json(json!({
                    "model": "vision-model-2024",
                    "choices": [{ "message": { "content": "# Title\nBody" } }],
                    "usage": { "total_tokens": 321 }
                }))
            }),
        );
        let client = client(serve(app).await);

        let completion = client
            .analyze("https://cdn.example.com/a.mp4", "describe")
            .await
            .unwrap();

        assert_eq!(completion.content, "# Title\nBody");
        assert_eq!(completion.total_tokens, 321);
        assert_eq!(completion.model, "vision-model-2024");
    }

    #[tokio::test]
    async fn test_rate_limit_reads_retry_after() {
        let app = Router::new().route(
            "/chat/completions",
            post(|| async { (StatusCode::TOO_MANY_REQUESTS, [("retry-after", "17")], "slow down") }),
        );
        let client = client(serve(app).await);

        let err = client.analyze("https://x/a.mp4", "p").await.unwrap_err();
        assert!(matches!(err, ClientError::RateLimited { retry_after: 17 }));
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let app = Router::new()
            .route(
                "/chat/completions",
                post(|| async { (StatusCode::BAD_GATEWAY, "upstream down").into_response() }),
            );
        let err = client(serve(app).await)
            .analyze("https://x/a.mp4", "p")
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Server { status: 502, .. }));

        let app = Router::new().route(
            "/chat/completions",
            post(|| async { (StatusCode::UNAUTHORIZED, "bad key").into_response() }),
        );
        let err = client(serve(app).await)
            .analyze("https://x/a.mp4", "p")
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Api { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_empty_choices_is_parse_error() {
        let app = Router::new().route(
            "/chat/completions",
            post(|| async { Json(json!({ "choices": [] })) }),
        );
        let err = client(serve(app).await)
            .analyze("https://x/a.mp4", "p")
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Parse(_)));
    }

    #[tokio::test]
    async fn test_slow_upstream_times_out() {
        let app = Router::new().route(
            "/chat/completions",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        );
        let err = client(serve(app).await)
            .analyze("https://x/a.mp4", "p")
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Timeout(_)));
    }
}

//! Framewise analysis client
//!
//! A small HTTP client for an OpenRouter-style chat-completions endpoint
//! hosting a vision model. The client makes exactly one request per call;
//! retries and circuit breaking are the caller's business.
//!
//! # Example
//!
//! ```no_run
//! use framewise_client::{AnalysisClient, ClientConfig};
//!
//! # async fn example() -> framewise_client::Result<()> {
//! let client = AnalysisClient::new(ClientConfig {
//!     api_key: "sk-or-...".to_string(),
//!     ..Default::default()
//! })?;
//!
//! let completion = client
//!     .analyze("https://cdn.example.com/clip.mp4", "Describe this video.")
//!     .await?;
//! println!("{} tokens: {}", completion.total_tokens, completion.content);
//! # Ok(())
//! # }
//! ```

mod completions;
pub mod error;

pub use completions::Completion;
pub use error::{ClientError, Result};

use std::time::Duration;

use reqwest::Client;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "nvidia/nemotron-nano-12b-v2-vl:free";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the API (e.g., "https://openrouter.ai/api/v1")
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    /// Per-request limit enforced by the HTTP client
    pub timeout: Duration,
    /// Sent as `X-Title`
    pub app_name: String,
    /// Sent as `HTTP-Referer`
    pub app_url: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(120),
            app_name: "Framewise".to_string(),
            app_url: "https://localhost".to_string(),
            max_tokens: 4000,
            temperature: 0.7,
        }
    }
}

/// HTTP client for the remote vision model
#[derive(Debug, Clone)]
pub struct AnalysisClient {
    base_url: String,
    model: String,
    timeout: Duration,
    max_tokens: u32,
    temperature: f32,
    client: Client,
}

impl AnalysisClient {
    /// Build a client with authentication and attribution headers preset
    pub fn new(config: ClientConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            header_value(&format!("Bearer {}", config.api_key))?,
        );
        headers.insert("HTTP-Referer", header_value(&config.app_url)?);
        headers.insert("X-Title", header_value(&config.app_name)?);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClientError::InvalidConfig(e.to_string()))?;

        Ok(Self::with_client(config, client))
    }

    /// Create a client around a preconfigured reqwest `Client`
    ///
    /// Headers from `config` are not applied; the given client is used as is.
    pub fn with_client(config: ClientConfig, client: Client) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model,
            timeout: config.timeout,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| ClientError::InvalidConfig(format!("invalid header value: {}", e)))
}

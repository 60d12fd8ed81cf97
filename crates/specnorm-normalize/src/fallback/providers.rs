//! OpenAI-compatible chat completion oracle.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use super::{FallbackError, FallbackOracle, FallbackRequest};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

const SYSTEM_PROMPT: &str = "You fill a fixed laser specification schema from vendor data. \
Answer with one JSON object that has exactly one key per entry of `fields`, using the field ids. \
Each value must match the declared type and unit, or be null when the sources do not state it. \
Never guess and never add keys.";

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: Option<String>,
    /// Transport-level cap; the adapter's own timeout is usually shorter.
    pub http_timeout: Duration,
}

impl OpenAiConfig {
    /// `OPENAI_API_KEY` is required; `OPENAI_MODEL` and `OPENAI_BASE_URL` are optional.
    pub fn from_env() -> Result<Self, FallbackError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| FallbackError::Unavailable("OPENAI_API_KEY is not set".to_string()))?;
        Ok(Self {
            api_key,
            model: std::env::var("OPENAI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            base_url: std::env::var("OPENAI_BASE_URL").ok(),
            http_timeout: Duration::from_secs(120),
        })
    }
}

pub struct OpenAiOracle {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiOracle {
    pub fn new(config: OpenAiConfig) -> Result<Self, FallbackError> {
        let client = Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| FallbackError::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self, FallbackError> {
        Self::new(OpenAiConfig::from_env()?)
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config
                .base_url
                .as_deref()
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
        )
    }
}

#[async_trait]
impl FallbackOracle for OpenAiOracle {
    fn name(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, request: &FallbackRequest) -> Result<Value, FallbackError> {
        let user = serde_json::to_string(request)
            .map_err(|e| FallbackError::Unavailable(format!("encoding request: {e}")))?;
        let body = json!({
            "model": self.config.model,
            "temperature": 0,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": user},
            ],
        });

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| FallbackError::Transport(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after_ms = retry_after_ms(
                response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok()),
            );
            return Err(FallbackError::RateLimited { retry_after_ms });
        }
        if status.is_server_error() {
            return Err(FallbackError::Transport(format!("server returned {status}")));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(FallbackError::Unavailable(format!("{status}: {text}")));
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| FallbackError::Transport(e.to_string()))?;
        let content = data["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| FallbackError::SchemaViolation("no message content".to_string()))?;
        serde_json::from_str(content)
            .map_err(|e| FallbackError::SchemaViolation(format!("content is not JSON: {e}")))
    }
}

/// `Retry-After` in whole seconds; one second when absent or unreadable.
fn retry_after_ms(header: Option<&str>) -> u64 {
    header
        .and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(1)
        .saturating_mul(1000)
}

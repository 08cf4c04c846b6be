//! Anthropic Messages API provider.

use crate::error::OracleError;
use crate::prompt::render_prompt;
use crate::provider::ResolutionOracle;
use crate::request::OracleRequest;
use crate::response::parse_proposal;
use async_trait::async_trait;
use namegraph_core::MergeProposal;
use reqwest::{Client, StatusCode};

pub const NAMEGRAPH_ANTHROPIC_API_KEY_ENV: &str = "NAMEGRAPH_ANTHROPIC_API_KEY";
pub const ANTHROPIC_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";
pub const ANTHROPIC_MODEL_ENV: &str = "ANTHROPIC_MODEL";
pub const ANTHROPIC_BASE_URL_ENV: &str = "ANTHROPIC_BASE_URL";

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_RATE_LIMIT_RETRY_MS: u64 = 60_000;

#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub max_tokens: u32,
}

impl AnthropicConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            max_tokens: 16_000,
        }
    }

    /// `NAMEGRAPH_ANTHROPIC_API_KEY` first, then `ANTHROPIC_API_KEY`.
    pub fn from_env() -> Result<Self, OracleError> {
        let api_key = [NAMEGRAPH_ANTHROPIC_API_KEY_ENV, ANTHROPIC_API_KEY_ENV]
            .iter()
            .find_map(|var| std::env::var(var).ok().filter(|v| !v.trim().is_empty()))
            .ok_or_else(|| {
                OracleError::Fatal(format!(
                    "no API key: set {NAMEGRAPH_ANTHROPIC_API_KEY_ENV} or {ANTHROPIC_API_KEY_ENV}"
                ))
            })?;
        let mut config = Self::new(api_key.trim());
        if let Ok(model) = std::env::var(ANTHROPIC_MODEL_ENV) {
            if !model.trim().is_empty() {
                config.model = model.trim().to_string();
            }
        }
        if let Ok(url) = std::env::var(ANTHROPIC_BASE_URL_ENV) {
            if !url.trim().is_empty() {
                config.base_url = url.trim().trim_end_matches('/').to_string();
            }
        }
        Ok(config)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

pub struct AnthropicOracle {
    client: Client,
    config: AnthropicConfig,
}

impl AnthropicOracle {
    pub fn new(config: AnthropicConfig) -> Result<Self, OracleError> {
        let client = Client::builder()
            .build()
            .map_err(|e| OracleError::Fatal(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }
}

#[async_trait]
impl ResolutionOracle for AnthropicOracle {
    async fn propose_merges(&self, request: &OracleRequest) -> Result<MergeProposal, OracleError> {
        let url = format!("{}/v1/messages", self.config.base_url);
        let body = serde_json::json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "messages": [{"role": "user", "content": render_prompt(request)}],
        });

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| OracleError::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_ms = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(|secs| secs * 1000)
                .unwrap_or(DEFAULT_RATE_LIMIT_RETRY_MS);
            return Err(OracleError::RateLimited { retry_after_ms });
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let text = response.text().await.unwrap_or_default();
            return Err(OracleError::Fatal(format!("{status}: {text}")));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(OracleError::Http {
                status: status.as_u16(),
                body: text,
            });
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| OracleError::InvalidResponse(e.to_string()))?;
        let text = data["content"][0]["text"]
            .as_str()
            .ok_or_else(|| OracleError::InvalidResponse("missing content[0].text".to_string()))?;

        tracing::debug!(
            pass = %request.pass,
            batch = request.batch_index,
            input_tokens = data["usage"]["input_tokens"].as_u64().unwrap_or(0),
            output_tokens = data["usage"]["output_tokens"].as_u64().unwrap_or(0),
            "oracle reply"
        );

        parse_proposal(text, request.pass.response_shape())
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

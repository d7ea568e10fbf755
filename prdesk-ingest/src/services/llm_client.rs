//! LLM extraction backends
//!
//! The single-query parser asks a backend to extract fields when its regex
//! pass is not confident. The backend is picked once at startup from the
//! `[llm]` config section (`openai`, `anthropic` or `none`).

use async_trait::async_trait;
use prdesk_common::config::LlmConfig;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const OPENAI_DEFAULT_BASE_URL: &str = "https://api.openai.com";
const OPENAI_DEFAULT_MODEL: &str = "gpt-4o-mini";
const ANTHROPIC_DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_DEFAULT_MODEL: &str = "claude-3-5-haiku-latest";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1024;

/// LLM backend errors (absorbed by the caller, never fail a job)
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM request timed out after {0:?}")]
    Timeout(Duration),

    #[error("LLM transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("LLM API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("LLM response malformed: {0}")]
    Malformed(String),

    #[error("LLM configuration error: {0}")]
    Config(String),
}

/// Field-extraction capability
#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &'static str;

    /// Send one prompt, return the raw completion text
    async fn extract(&self, prompt: &str) -> Result<String, LlmError>;
}

/// OpenAI chat-completions backend
pub struct OpenAiBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiBackend {
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        Ok(Self {
            client: http_client(timeout)?,
            api_key,
            model: model.unwrap_or_else(|| OPENAI_DEFAULT_MODEL.to_string()),
            base_url: base_url.unwrap_or_else(|| OPENAI_DEFAULT_BASE_URL.to_string()),
        })
    }
}

#[async_trait]
impl ExtractionBackend for OpenAiBackend {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn extract(&self, prompt: &str) -> Result<String, LlmError> {
        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/')))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&serde_json::json!({
                "model": self.model,
                "messages": [{"role": "user", "content": prompt}],
                "max_tokens": MAX_TOKENS,
                "temperature": 0
            }))
            .send()
            .await?;

        let result = read_json(response).await?;
        result["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| LlmError::Malformed("missing choices[0].message.content".to_string()))
    }
}

/// Anthropic messages backend
pub struct AnthropicBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl AnthropicBackend {
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        Ok(Self {
            client: http_client(timeout)?,
            api_key,
            model: model.unwrap_or_else(|| ANTHROPIC_DEFAULT_MODEL.to_string()),
            base_url: base_url.unwrap_or_else(|| ANTHROPIC_DEFAULT_BASE_URL.to_string()),
        })
    }
}

#[async_trait]
impl ExtractionBackend for AnthropicBackend {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn extract(&self, prompt: &str) -> Result<String, LlmError> {
        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url.trim_end_matches('/')))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&serde_json::json!({
                "model": self.model,
                "max_tokens": MAX_TOKENS,
                "messages": [{"role": "user", "content": prompt}]
            }))
            .send()
            .await?;

        let result = read_json(response).await?;
        result["content"][0]["text"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| LlmError::Malformed("missing content[0].text".to_string()))
    }
}

fn http_client(timeout: Duration) -> Result<reqwest::Client, LlmError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(LlmError::Transport)
}

async fn read_json(response: reqwest::Response) -> Result<serde_json::Value, LlmError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(LlmError::Api {
            status: status.as_u16(),
            body: body.chars().take(500).collect(),
        });
    }
    Ok(response.json().await?)
}

/// Build the configured backend
///
/// `None` when the provider is `none` or no API key resolved: the
/// single-query parser then runs regex-only.
pub fn backend_from_config(
    config: &LlmConfig,
    api_key: Option<String>,
) -> Result<Option<Arc<dyn ExtractionBackend>>, LlmError> {
    let provider = config.provider.trim().to_lowercase();
    if provider == "none" || provider.is_empty() {
        return Ok(None);
    }

    let Some(api_key) = api_key.filter(|k| !k.trim().is_empty()) else {
        tracing::warn!(provider = %provider, "LLM provider configured without an API key; LLM fallback disabled");
        return Ok(None);
    };

    let timeout = Duration::from_secs(config.timeout_secs.max(1));
    let backend: Arc<dyn ExtractionBackend> = match provider.as_str() {
        "openai" => Arc::new(OpenAiBackend::new(
            api_key,
            config.model.clone(),
            config.base_url.clone(),
            timeout,
        )?),
        "anthropic" => Arc::new(AnthropicBackend::new(
            api_key,
            config.model.clone(),
            config.base_url.clone(),
            timeout,
        )?),
        other => {
            return Err(LlmError::Config(format!(
                "unknown LLM provider '{}' (expected openai, anthropic or none)",
                other
            )))
        }
    };

    tracing::info!(provider = backend.name(), "LLM extraction backend enabled");
    Ok(Some(backend))
}

/// Strip a Markdown code fence around a JSON completion
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening fence line
    let rest = rest.split_once('\n').map_or("", |(_, body)| body);
    rest.trim_end().trim_end_matches("```").trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n{}\n```\n"), "{}");
        assert_eq!(strip_code_fence("  {\"b\":2} "), "{\"b\":2}");
    }

    #[test]
    fn test_backend_from_config_none() {
        let config = LlmConfig::default();
        assert!(backend_from_config(&config, Some("key".to_string())).unwrap().is_none());
    }

    #[test]
    fn test_backend_requires_key() {
        let config = LlmConfig {
            provider: "openai".to_string(),
            ..Default::default()
        };
        assert!(backend_from_config(&config, None).unwrap().is_none());
        assert!(backend_from_config(&config, Some("  ".to_string())).unwrap().is_none());
    }

    #[test]
    fn test_backend_selection() {
        let config = LlmConfig {
            provider: "Anthropic".to_string(),
            ..Default::default()
        };
        let backend = backend_from_config(&config, Some("k".to_string())).unwrap().unwrap();
        assert_eq!(backend.name(), "anthropic");

        let config = LlmConfig {
            provider: "cohere".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            backend_from_config(&config, Some("k".to_string())),
            Err(LlmError::Config(_))
        ));
    }
}

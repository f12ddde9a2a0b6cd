//! LLM client for OpenAI-compatible chat-completions providers
//!
//! Used by the LLM-backed intent router. Only single-shot JSON-mode
//! completions are needed.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ClassifierConfig;

const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Configuration for an LLM API provider
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Base URL for the API (e.g., "https://api.openai.com/v1")
    pub base_url: String,
    pub api_key: String,
    /// Extra headers to include in requests (e.g., X-Title)
    pub extra_headers: Vec<(String, String)>,
}

impl ProviderConfig {
    pub fn openrouter(api_key: String) -> Self {
        Self {
            base_url: OPENROUTER_BASE_URL.to_string(),
            api_key,
            extra_headers: vec![("X-Title".to_string(), "Transit Orchestrator".to_string())],
        }
    }

    /// Any OpenAI-compatible endpoint
    pub fn custom(base_url: impl Into<String>, api_key: String) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            extra_headers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
}

/// Per-call completion settings
#[derive(Debug, Clone)]
pub struct CompletionOptions {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    /// Ask the provider for a JSON object reply
    pub json_mode: bool,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            max_tokens: Some(1024),
            temperature: None,
            json_mode: false,
        }
    }
}

/// Chat-completions client
#[derive(Clone)]
pub struct LlmClient {
    client: Arc<Client>,
    provider: ProviderConfig,
}

impl LlmClient {
    pub fn with_provider(provider: ProviderConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build LLM HTTP client")?;
        Ok(Self {
            client: Arc::new(client),
            provider,
        })
    }

    /// Send a chat completion request and return the first choice's text
    pub async fn complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<String> {
        let request = ChatRequest {
            model,
            messages,
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            response_format: options
                .json_mode
                .then(|| serde_json::json!({"type": "json_object"})),
        };

        let mut req_builder = self.client
            .post(format!("{}/chat/completions", self.provider.base_url))
            .header("Authorization", format!("Bearer {}", self.provider.api_key));
        for (key, value) in &self.provider.extra_headers {
            req_builder = req_builder.header(key.as_str(), value.as_str());
        }
        let response = req_builder
            .json(&request)
            .send()
            .await
            .context("Failed to send request to LLM provider")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("LLM API error ({}): {}", status, crate::truncate_safe(&body, 500));
        }

        let body = response.text().await.context("Failed to read response body")?;
        let raw_response: Value = serde_json::from_str(&body).map_err(|e| {
            anyhow::anyhow!(
                "Failed to parse JSON response: {} (body: {})",
                e,
                crate::truncate_safe(&body, 500)
            )
        })?;

        extract_content(&raw_response).context("LLM response has no message content")
    }
}

/// Pull the first choice's content, handling both string and
/// array-of-content-parts formats
fn extract_content(raw: &Value) -> Option<String> {
    let content = raw
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|arr| arr.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|msg| msg.get("content"))?;

    match content {
        Value::String(s) => Some(s.clone()),
        Value::Array(parts) => {
            let text = parts
                .iter()
                .filter(|part| part.get("type").and_then(|t| t.as_str()) == Some("text"))
                .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
                .collect::<Vec<_>>()
                .join("");
            Some(text)
        }
        _ => None,
    }
}

/// Narrow seam the LLM router talks to
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    /// Complete `system` + `user` and return the raw JSON text
    async fn complete_json(&self, system: &str, user: &str) -> Result<String>;
}

/// An `LlmClient` bound to one model and its settings
pub struct BoundModel {
    client: LlmClient,
    model: String,
    options: CompletionOptions,
}

impl BoundModel {
    pub fn new(client: LlmClient, model: impl Into<String>, options: CompletionOptions) -> Self {
        Self {
            client,
            model: model.into(),
            options,
        }
    }

    /// Build from classifier settings; `None` when no API key is configured
    pub fn from_config(config: &ClassifierConfig) -> Result<Option<Self>> {
        let Some(api_key) = config.api_key.clone() else {
            return Ok(None);
        };
        let provider = if config.base_url.contains("openrouter.ai") {
            ProviderConfig::openrouter(api_key)
        } else {
            ProviderConfig::custom(&config.base_url, api_key)
        };
        let client = LlmClient::with_provider(provider, config.timeout())?;
        let options = CompletionOptions {
            max_tokens: Some(config.max_tokens),
            temperature: Some(config.temperature),
            json_mode: true,
        };
        Ok(Some(Self::new(client, &config.model, options)))
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ChatCompletion for BoundModel {
    async fn complete_json(&self, system: &str, user: &str) -> Result<String> {
        let messages = [ChatMessage::system(system), ChatMessage::user(user)];
        self.client.complete(&self.model, &messages, &self.options).await
    }
}

//! Anthropic Messages API adapter.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{
    classify_transport, error_from_response, http_client, normalize_base_url, render_prompt,
    Completion, ProviderAdapter,
};
use crate::config::ProviderConfig;
use crate::errors::{AdapterError, ConfigResult};
use crate::types::{ModelInfo, Request};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_CONTEXT_WINDOW: u32 = 200_000;
/// The Messages API requires `max_tokens` on every call.
const DEFAULT_MAX_TOKENS: u32 = 1_024;
const MAX_OUTPUT_TOKENS: u32 = 8_192;

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

/// Adapter for Anthropic `/v1/messages`.
#[derive(Debug, Clone)]
pub struct AnthropicAdapter {
    id: String,
    model: String,
    base_url: String,
    api_key: String,
    timeout: Duration,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    context_window: u32,
    http: reqwest::Client,
}

impl AnthropicAdapter {
    pub fn from_config(config: &ProviderConfig) -> ConfigResult<Self> {
        let api_key = config.require_api_key()?;
        let model = config.require_model()?.to_string();
        let base_url = config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        Ok(Self {
            id: config.id.clone(),
            model,
            base_url: normalize_base_url(base_url),
            api_key,
            timeout: config.timeout(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            context_window: config.context_window.unwrap_or(DEFAULT_CONTEXT_WINDOW),
            http: http_client(&config.id, config.timeout())?,
        })
    }

    async fn send(&self, body: &MessagesRequest<'_>) -> Result<reqwest::Response, AdapterError> {
        self.http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(body)
            .send()
            .await
            .map_err(|e| classify_transport(&e))
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            provider: self.id.clone(),
            model: self.model.clone(),
            supports_system_message: true,
            supports_context: true,
            max_context_tokens: self.context_window,
            max_output_tokens: self.max_tokens.unwrap_or(MAX_OUTPUT_TOKENS),
        }
    }

    async fn complete(&self, request: &Request) -> Result<Completion, AdapterError> {
        let prompt = render_prompt(request);
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: request
                .max_tokens
                .or(self.max_tokens)
                .unwrap_or(DEFAULT_MAX_TOKENS),
            system: request.system_message.as_deref(),
            messages: vec![Message {
                role: "user",
                content: &prompt,
            }],
            temperature: request.temperature.or(self.temperature),
        };

        let response = self.send(&body).await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| AdapterError::Generic(format!("Failed to parse response: {e}")))?;

        let content: String = parsed
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect();

        Ok(Completion {
            content,
            tokens_used: parsed
                .usage
                .map(|u| u.input_tokens.saturating_add(u.output_tokens)),
            finish_reason: parsed.stop_reason,
        })
    }

    /// One-token message; Anthropic has no cheaper authenticated endpoint.
    async fn validate_connection(&self) -> bool {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: 1,
            system: None,
            messages: vec![Message {
                role: "user",
                content: "ping",
            }],
            temperature: None,
        };
        match self.send(&body).await {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                warn!(provider = %self.id, status = %resp.status(), "Connection probe rejected");
                false
            }
            Err(e) => {
                warn!(provider = %self.id, error = %e, "Connection probe failed");
                false
            }
        }
    }
}

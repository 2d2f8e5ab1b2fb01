//! OpenAI chat completions adapter.
//!
//! Also serves any server speaking the same protocol (vLLM, llama.cpp,
//! Ollama). The `openai` kind requires an API key; `openai-compatible`
//! requires a `base_url` and treats the key as optional.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{
    classify_transport, error_from_response, http_client, normalize_base_url, render_prompt,
    Completion, ProviderAdapter,
};
use crate::config::ProviderConfig;
use crate::errors::{AdapterError, ConfigError, ConfigResult};
use crate::types::{ModelInfo, Request};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_CONTEXT_WINDOW: u32 = 128_000;
const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 4_096;

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    total_tokens: Option<u32>,
}

/// Adapter for `/chat/completions` endpoints.
#[derive(Debug, Clone)]
pub struct OpenAiAdapter {
    id: String,
    model: String,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    context_window: u32,
    http: reqwest::Client,
}

impl OpenAiAdapter {
    /// Hosted OpenAI. Requires a well-formed API key and a model.
    pub fn from_config(config: &ProviderConfig) -> ConfigResult<Self> {
        let api_key = config.require_api_key()?;
        let base_url = config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        Self::build(config, base_url, Some(api_key))
    }

    /// Self-hosted OpenAI-compatible server. Requires `base_url`.
    pub fn compatible(config: &ProviderConfig) -> ConfigResult<Self> {
        let base_url = config
            .base_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingField {
                provider: config.id.clone(),
                field: "base_url",
            })?;
        let api_key = match config.resolve_api_key()? {
            Some(k) if !k.trim().is_empty() => Some(config.require_api_key()?),
            _ => None,
        };
        Self::build(config, base_url, api_key)
    }

    fn build(
        config: &ProviderConfig,
        base_url: &str,
        api_key: Option<String>,
    ) -> ConfigResult<Self> {
        let model = config.require_model()?.to_string();
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

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
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
            max_output_tokens: self.max_tokens.unwrap_or(DEFAULT_MAX_OUTPUT_TOKENS),
        }
    }

    async fn complete(&self, request: &Request) -> Result<Completion, AdapterError> {
        let prompt = render_prompt(request);
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system_message.as_deref() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &prompt,
        });

        let body = ChatRequest {
            model: &self.model,
            messages,
            temperature: request.temperature.or(self.temperature),
            max_tokens: request.max_tokens.or(self.max_tokens),
        };

        let response = self
            .authorize(self.http.post(format!("{}/chat/completions", self.base_url)))
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AdapterError::Generic(format!("Failed to parse response: {e}")))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AdapterError::Generic("Response contained no choices".to_string()))?;

        Ok(Completion {
            content: choice.message.content.unwrap_or_default(),
            tokens_used: parsed.usage.and_then(|u| u.total_tokens),
            finish_reason: choice.finish_reason,
        })
    }

    async fn validate_connection(&self) -> bool {
        let url = format!("{}/models", self.base_url);
        match self.authorize(self.http.get(&url)).send().await {
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

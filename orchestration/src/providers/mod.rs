//! Provider adapters.
//!
//! An adapter wraps one vendor endpoint behind [`ProviderAdapter`]. The
//! vendor call ([`ProviderAdapter::complete`]) returns a typed
//! [`AdapterError`]; the provided [`ProviderAdapter::generate`] turns every
//! outcome into a [`Response`] so vendor errors never escape.
//!
//! Built-in adapters:
//! - [`OpenAiAdapter`]: OpenAI `/chat/completions` and compatible local servers
//! - [`AnthropicAdapter`]: Anthropic `/v1/messages`

pub mod anthropic;
pub mod openai;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tokio::time::Instant;
use tracing::debug;

use crate::errors::{AdapterError, ConfigError, ConfigResult, ErrorKind};
use crate::types::{ModelInfo, Request, Response};

pub use anthropic::AnthropicAdapter;
pub use openai::OpenAiAdapter;

/// Longest slice of an error body kept in an error message.
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Successful vendor completion, before it is wrapped in a [`Response`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    pub content: String,
    pub tokens_used: Option<u32>,
    pub finish_reason: Option<String>,
}

/// Contract every vendor adapter satisfies.
///
/// Adapters validate their configuration when constructed and hold no
/// routing state; health, caching and stats live in the orchestrator.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Registry id of this provider.
    fn id(&self) -> &str;

    fn model(&self) -> &str;

    /// Upper bound for one call; the orchestrator enforces it.
    fn timeout(&self) -> Duration;

    fn model_info(&self) -> ModelInfo;

    /// Perform the vendor call.
    async fn complete(&self, request: &Request) -> Result<Completion, AdapterError>;

    /// Cheap probe that the endpoint is reachable and accepts our credentials.
    async fn validate_connection(&self) -> bool;

    /// Run [`complete`](Self::complete) and convert the outcome to a
    /// [`Response`], timing the call.
    async fn generate(&self, request: &Request) -> Response {
        let started = Instant::now();
        let outcome = self.complete(request).await;
        let elapsed = started.elapsed().as_secs_f64();
        match outcome {
            Ok(completion) => {
                let response = Response::success(
                    self.id(),
                    self.model(),
                    completion.content,
                    completion.tokens_used,
                    elapsed,
                );
                match completion.finish_reason {
                    Some(reason) => response.with_metadata("finish_reason", reason),
                    None => response,
                }
            }
            Err(e) => {
                debug!(provider = self.id(), error = %e, "Provider call failed");
                Response::from_adapter_error(self.id(), self.model(), &e, elapsed)
            }
        }
    }
}

/// Map a non-success HTTP status onto the error taxonomy.
pub fn classify_status(status: StatusCode) -> ErrorKind {
    match status.as_u16() {
        401 | 403 => ErrorKind::Authentication,
        429 => ErrorKind::RateLimit,
        400 | 404 | 413 | 422 => ErrorKind::InvalidRequest,
        408 | 504 => ErrorKind::Timeout,
        _ => ErrorKind::Generic,
    }
}

/// Map a transport-level reqwest failure onto the error taxonomy.
pub fn classify_transport(error: &reqwest::Error) -> AdapterError {
    if error.is_timeout() {
        AdapterError::Timeout(error.to_string())
    } else {
        AdapterError::Generic(format!("HTTP error: {error}"))
    }
}

/// Consume a non-success response and build the matching error.
pub async fn error_from_response(response: reqwest::Response) -> AdapterError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let body: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
    AdapterError::new(classify_status(status), format!("HTTP {status}: {body}"))
}

/// Prompt text with the request context rendered as a sorted preamble.
///
/// ```text
/// Context:
/// audience: executives
/// industry: retail
///
/// <prompt>
/// ```
pub fn render_prompt(request: &Request) -> String {
    if request.context.is_empty() {
        return request.prompt.clone();
    }
    let mut keys: Vec<&String> = request.context.keys().collect();
    keys.sort();

    let mut out = String::from("Context:\n");
    for key in keys {
        let value = match &request.context[key] {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        out.push_str(key);
        out.push_str(": ");
        out.push_str(&value);
        out.push('\n');
    }
    out.push('\n');
    out.push_str(&request.prompt);
    out
}

/// HTTP client with the provider timeout applied.
pub fn http_client(provider: &str, timeout: Duration) -> ConfigResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ConfigError::Invalid {
            provider: provider.to_string(),
            message: format!("failed to build HTTP client: {e}"),
        })
}

/// Strip trailing slashes so paths can be appended with `/`.
pub(crate) fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

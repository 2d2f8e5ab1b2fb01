//! Request and response types shared by every routing component.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{AdapterError, ErrorKind};

/// Identifier a provider is registered under (e.g. "openai", "local-qwen").
pub type ProviderId = String;

/// Error code returned when the orchestrator has no registered provider.
pub const NO_PROVIDER: &str = "NO_PROVIDER";

/// Error code returned when every candidate provider failed.
pub const ALL_PROVIDERS_FAILED: &str = "ALL_PROVIDERS_FAILED";

/// Domain tag used when a request does not declare one.
pub const DEFAULT_DOMAIN: &str = "general";

/// A single logical generation request.
///
/// Built once and passed by reference through cache, routing and adapters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub prompt: String,
    /// Free-form context; iteration order never affects caching.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Request {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_context(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_system_message(mut self, system_message: impl Into<String>) -> Self {
        self.system_message = Some(system_message.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Declared domain tag: `metadata.domain`, then `context.domain`, then
    /// [`DEFAULT_DOMAIN`].
    pub fn domain(&self) -> &str {
        self.metadata
            .get("domain")
            .or_else(|| self.context.get("domain"))
            .and_then(|v| v.as_str())
            .filter(|d| !d.is_empty())
            .unwrap_or(DEFAULT_DOMAIN)
    }
}

/// Outcome class of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseStatus {
    Success,
    Error,
    Timeout,
    RateLimited,
    InvalidRequest,
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "SUCCESS"),
            Self::Error => write!(f, "ERROR"),
            Self::Timeout => write!(f, "TIMEOUT"),
            Self::RateLimited => write!(f, "RATE_LIMITED"),
            Self::InvalidRequest => write!(f, "INVALID_REQUEST"),
        }
    }
}

/// Uniform response returned by adapters and by the orchestrator.
///
/// A `Success` response never carries `error_message`, `error_code` or
/// `error_kind`; the constructors enforce this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub content: String,
    pub provider: ProviderId,
    pub model: String,
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u32>,
    /// Wall-clock seconds spent producing this response.
    pub response_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Typed classification for provider failures; routing keys off this.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Response {
    /// Successful generation.
    pub fn success(
        provider: impl Into<String>,
        model: impl Into<String>,
        content: impl Into<String>,
        tokens_used: Option<u32>,
        response_time: f64,
    ) -> Self {
        Self {
            content: content.into(),
            provider: provider.into(),
            model: model.into(),
            status: ResponseStatus::Success,
            tokens_used,
            response_time,
            error_message: None,
            error_code: None,
            error_kind: None,
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    /// Provider-scoped failure of the given kind.
    pub fn failure(
        provider: impl Into<String>,
        model: impl Into<String>,
        kind: ErrorKind,
        message: impl Into<String>,
        response_time: f64,
    ) -> Self {
        Self {
            content: String::new(),
            provider: provider.into(),
            model: model.into(),
            status: kind.status(),
            tokens_used: None,
            response_time,
            error_message: Some(message.into()),
            error_code: Some(kind.code().to_string()),
            error_kind: Some(kind),
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    /// Failure built from an adapter error.
    pub fn from_adapter_error(
        provider: impl Into<String>,
        model: impl Into<String>,
        error: &AdapterError,
        response_time: f64,
    ) -> Self {
        Self::failure(provider, model, error.kind(), error.to_string(), response_time)
    }

    /// Orchestrator-level error (`NO_PROVIDER`, `ALL_PROVIDERS_FAILED`).
    pub fn error(
        provider: impl Into<String>,
        model: impl Into<String>,
        code: &str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            content: String::new(),
            provider: provider.into(),
            model: model.into(),
            status: ResponseStatus::Error,
            tokens_used: None,
            response_time: 0.0,
            error_message: Some(message.into()),
            error_code: Some(code.to_string()),
            error_kind: None,
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_response_time(mut self, response_time: f64) -> Self {
        self.response_time = response_time;
        self
    }

    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }
}

/// Capability descriptor reported by an adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub provider: ProviderId,
    pub model: String,
    pub supports_system_message: bool,
    pub supports_context: bool,
    /// Maximum context window in tokens
    pub max_context_tokens: u32,
    /// Maximum output tokens per call
    pub max_output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_has_no_error_fields() {
        let resp = Response::success("a", "m", "hi", Some(3), 0.1);
        assert!(resp.is_success());
        assert!(resp.error_code.is_none());
        assert!(resp.error_message.is_none());
        assert!(resp.error_kind.is_none());
    }

    #[test]
    fn test_failure_status_follows_kind() {
        let resp = Response::failure("a", "m", ErrorKind::RateLimit, "429", 0.2);
        assert_eq!(resp.status, ResponseStatus::RateLimited);
        assert_eq!(resp.error_code.as_deref(), Some("RATE_LIMIT"));
        assert_eq!(resp.error_kind, Some(ErrorKind::RateLimit));
        assert!(!resp.is_success());
    }

    #[test]
    fn test_domain_lookup_order() {
        let req = Request::new("p");
        assert_eq!(req.domain(), DEFAULT_DOMAIN);

        let req = Request::new("p").with_context("domain", "retail");
        assert_eq!(req.domain(), "retail");

        let req = Request::new("p")
            .with_context("domain", "retail")
            .with_metadata("domain", "finance");
        assert_eq!(req.domain(), "finance");
    }

    #[test]
    fn test_status_serializes_screaming_case() {
        let json = serde_json::to_string(&ResponseStatus::RateLimited).unwrap();
        assert_eq!(json, "\"RATE_LIMITED\"");
        assert_eq!(ResponseStatus::InvalidRequest.to_string(), "INVALID_REQUEST");
    }
}

//! Error taxonomy for provider calls and configuration.
//!
//! Adapters never surface vendor errors directly. Every failed call is
//! mapped onto one of the [`ErrorKind`] variants, and the orchestrator
//! routes on the kind alone, never on message text.
//!
//! | Kind           | Response status   | Code              | Fails over |
//! |----------------|-------------------|-------------------|------------|
//! | Timeout        | `TIMEOUT`         | `TIMEOUT`         | yes        |
//! | RateLimit      | `RATE_LIMITED`    | `RATE_LIMIT`      | yes        |
//! | Authentication | `ERROR`           | `AUTHENTICATION`  | yes        |
//! | InvalidRequest | `INVALID_REQUEST` | `INVALID_REQUEST` | yes        |
//! | Generic        | `ERROR`           | `PROVIDER_ERROR`  | yes        |

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::ResponseStatus;

/// Closed classification of a failed provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The call did not complete within the provider timeout.
    Timeout,
    /// The provider throttled the call.
    RateLimit,
    /// Credentials were rejected.
    Authentication,
    /// The request itself is malformed; every provider will likely reject it.
    InvalidRequest,
    /// Anything else: transport failures, 5xx responses, undecodable bodies.
    Generic,
}

impl ErrorKind {
    /// Response status reported for a failure of this kind.
    pub fn status(self) -> ResponseStatus {
        match self {
            Self::Timeout => ResponseStatus::Timeout,
            Self::RateLimit => ResponseStatus::RateLimited,
            Self::InvalidRequest => ResponseStatus::InvalidRequest,
            Self::Authentication | Self::Generic => ResponseStatus::Error,
        }
    }

    /// Machine-readable error code placed in `Response::error_code`.
    pub fn code(self) -> &'static str {
        match self {
            Self::Timeout => "TIMEOUT",
            Self::RateLimit => "RATE_LIMIT",
            Self::Authentication => "AUTHENTICATION",
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::Generic => "PROVIDER_ERROR",
        }
    }

    /// Whether the caller, not the provider, caused the failure.
    pub fn is_client_error(self) -> bool {
        matches!(self, Self::InvalidRequest)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::RateLimit => write!(f, "rate_limit"),
            Self::Authentication => write!(f, "authentication"),
            Self::InvalidRequest => write!(f, "invalid_request"),
            Self::Generic => write!(f, "generic"),
        }
    }
}

/// Failure returned by an adapter's vendor call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdapterError {
    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Rate limited: {0}")]
    RateLimit(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Provider error: {0}")]
    Generic(String),
}

impl AdapterError {
    /// Build an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            ErrorKind::Timeout => Self::Timeout(message),
            ErrorKind::RateLimit => Self::RateLimit(message),
            ErrorKind::Authentication => Self::Authentication(message),
            ErrorKind::InvalidRequest => Self::InvalidRequest(message),
            ErrorKind::Generic => Self::Generic(message),
        }
    }

    /// Classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::RateLimit(_) => ErrorKind::RateLimit,
            Self::Authentication(_) => ErrorKind::Authentication,
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::Generic(_) => ErrorKind::Generic,
        }
    }
}

/// Errors raised while loading configuration or constructing adapters.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Provider '{provider}': missing {field}")]
    MissingField {
        provider: String,
        field: &'static str,
    },

    #[error("Provider '{provider}': {message}")]
    Invalid { provider: String, message: String },

    #[error("Environment variable not set: {0}")]
    MissingEnv(String),

    #[error("Unsupported provider kind '{kind}' for provider '{provider}'")]
    UnsupportedKind { provider: String, kind: String },

    #[error("Duplicate provider id: {0}")]
    DuplicateProvider(String),

    #[error("Invalid setting {name}: {message}")]
    InvalidSetting { name: &'static str, message: String },
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

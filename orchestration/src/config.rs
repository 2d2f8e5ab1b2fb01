//! Relay configuration: providers, cache and circuit breaker settings.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. Environment variable overrides (e.g. `RELAY_CACHE_TTL_SECS`)
//! 2. Values from the TOML file
//! 3. Built-in defaults
//!
//! ```toml
//! default_provider = "openai"
//!
//! [cache]
//! ttl_secs = 600
//!
//! [circuit]
//! failure_threshold = 3
//! cooldown_secs = 60
//!
//! [[providers]]
//! id = "openai"
//! kind = "openai"
//! api_key = "env:OPENAI_API_KEY"
//! model = "gpt-4o-mini"
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{ConfigError, ConfigResult};

const DEFAULT_CACHE_TTL_SECS: u64 = 3600;
const DEFAULT_CACHE_MAX_ENTRIES: usize = 1000;
const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
const DEFAULT_COOLDOWN_SECS: u64 = 60;
const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 30;

const ENV_CACHE_ENABLED: &str = "RELAY_CACHE_ENABLED";
const ENV_CACHE_TTL_SECS: &str = "RELAY_CACHE_TTL_SECS";
const ENV_CACHE_MAX_ENTRIES: &str = "RELAY_CACHE_MAX_ENTRIES";
const ENV_CIRCUIT_THRESHOLD: &str = "RELAY_CIRCUIT_THRESHOLD";
const ENV_CIRCUIT_COOLDOWN_SECS: &str = "RELAY_CIRCUIT_COOLDOWN_SECS";
const ENV_DEFAULT_PROVIDER: &str = "RELAY_DEFAULT_PROVIDER";

/// Response cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Seconds a cached response stays valid.
    pub ttl_secs: u64,
    /// Soft cap; exceeding it triggers an expired-entry sweep.
    pub max_entries: usize,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: DEFAULT_CACHE_TTL_SECS,
            max_entries: DEFAULT_CACHE_MAX_ENTRIES,
        }
    }
}

/// Circuit breaker settings shared by every provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,
    /// Seconds an open circuit waits before allowing a probe.
    pub cooldown_secs: u64,
}

impl CircuitConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            cooldown_secs: DEFAULT_COOLDOWN_SECS,
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    DEFAULT_PROVIDER_TIMEOUT_SECS
}

/// Static configuration for one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Registry id; also the routing and stats key.
    pub id: String,
    /// Adapter kind (`openai`, `openai-compatible`, `anthropic`, or a custom kind).
    pub kind: String,
    /// API key, or `env:VAR_NAME` to read it from the environment.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model: String,
    /// Overrides the vendor's default endpoint.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Used when a request does not set its own temperature.
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Used when a request does not set its own max_tokens.
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Context window override for `model_info`.
    #[serde(default)]
    pub context_window: Option<u32>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl ProviderConfig {
    pub fn new(id: impl Into<String>, kind: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            api_key: None,
            model: model.into(),
            base_url: None,
            timeout_secs: DEFAULT_PROVIDER_TIMEOUT_SECS,
            temperature: None,
            max_tokens: None,
            context_window: None,
            enabled: true,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Resolve the API key, following `env:VAR_NAME` indirection.
    pub fn resolve_api_key(&self) -> ConfigResult<Option<String>> {
        match self.api_key.as_deref() {
            Some(k) => match k.strip_prefix("env:") {
                Some(var_name) => std::env::var(var_name)
                    .map(Some)
                    .map_err(|_| ConfigError::MissingEnv(var_name.to_string())),
                None => Ok(Some(k.to_string())),
            },
            None => Ok(None),
        }
    }

    /// Resolve the API key and reject missing or malformed values.
    pub fn require_api_key(&self) -> ConfigResult<String> {
        let key = self
            .resolve_api_key()?
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingField {
                provider: self.id.clone(),
                field: "api_key",
            })?;
        if key.chars().any(char::is_whitespace) {
            return Err(ConfigError::Invalid {
                provider: self.id.clone(),
                message: "api_key contains whitespace".to_string(),
            });
        }
        Ok(key)
    }

    /// Reject an empty model id.
    pub fn require_model(&self) -> ConfigResult<&str> {
        let model = self.model.trim();
        if model.is_empty() {
            return Err(ConfigError::MissingField {
                provider: self.id.clone(),
                field: "model",
            });
        }
        Ok(model)
    }
}

/// Top-level relay configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub cache: CacheConfig,
    pub circuit: CircuitConfig,
    /// Provider tried first when a call names no preference.
    pub default_provider: Option<String>,
    pub providers: Vec<ProviderConfig>,
}

impl RelayConfig {
    /// Read, apply environment overrides, and validate.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&raw)?;
        config.apply_env_overrides();
        config.validate()?;
        debug!(
            path = %path.display(),
            providers = config.providers.len(),
            "Loaded relay config"
        );
        Ok(config)
    }

    /// Parse TOML without overrides or validation.
    pub fn from_toml_str(raw: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Apply `RELAY_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary lookup; unparsable values are ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(ENV_CACHE_ENABLED).and_then(|s| s.parse().ok()) {
            self.cache.enabled = v;
        }
        if let Some(v) = lookup(ENV_CACHE_TTL_SECS).and_then(|s| s.parse().ok()) {
            self.cache.ttl_secs = v;
        }
        if let Some(v) = lookup(ENV_CACHE_MAX_ENTRIES).and_then(|s| s.parse().ok()) {
            self.cache.max_entries = v;
        }
        if let Some(v) = lookup(ENV_CIRCUIT_THRESHOLD).and_then(|s| s.parse().ok()) {
            self.circuit.failure_threshold = v;
        }
        if let Some(v) = lookup(ENV_CIRCUIT_COOLDOWN_SECS).and_then(|s| s.parse().ok()) {
            self.circuit.cooldown_secs = v;
        }
        if let Some(v) = lookup(ENV_DEFAULT_PROVIDER).filter(|s| !s.is_empty()) {
            self.default_provider = Some(v);
        }
    }

    /// Structural checks. Per-provider credential checks happen at adapter
    /// construction so one bad provider does not reject the whole file.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.circuit.failure_threshold == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "circuit.failure_threshold",
                message: "must be > 0".to_string(),
            });
        }
        if self.cache.max_entries == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "cache.max_entries",
                message: "must be > 0".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for provider in &self.providers {
            if provider.id.trim().is_empty() {
                return Err(ConfigError::InvalidSetting {
                    name: "providers.id",
                    message: "must not be empty".to_string(),
                });
            }
            if !seen.insert(provider.id.as_str()) {
                return Err(ConfigError::DuplicateProvider(provider.id.clone()));
            }
            if provider.timeout_secs == 0 {
                return Err(ConfigError::Invalid {
                    provider: provider.id.clone(),
                    message: "timeout_secs must be > 0".to_string(),
                });
            }
        }
        Ok(())
    }
}

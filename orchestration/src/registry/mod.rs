//! Adapter registry.
//!
//! Maps a provider `kind` to a factory that builds an adapter from its
//! [`ProviderConfig`]. A provider whose config fails validation is excluded
//! with a warning; the remaining providers still load.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::ProviderConfig;
use crate::errors::{ConfigError, ConfigResult};
use crate::providers::{AnthropicAdapter, OpenAiAdapter, ProviderAdapter};
use crate::types::ProviderId;

/// Builds one adapter from its configuration.
pub type AdapterFactory =
    Arc<dyn Fn(&ProviderConfig) -> ConfigResult<Arc<dyn ProviderAdapter>> + Send + Sync>;

/// Outcome of building adapters from a provider list.
pub struct RegistryBuild {
    /// Constructed adapters, in configuration order.
    pub adapters: Vec<Arc<dyn ProviderAdapter>>,
    /// Providers that failed construction, with the reason.
    pub rejected: Vec<(ProviderId, ConfigError)>,
}

impl std::fmt::Debug for RegistryBuild {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryBuild")
            .field(
                "adapters",
                &self.adapters.iter().map(|a| a.id()).collect::<Vec<_>>(),
            )
            .field("rejected", &self.rejected)
            .finish()
    }
}

/// Factory map keyed by provider kind.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    factories: HashMap<String, AdapterFactory>,
}

impl AdapterRegistry {
    /// Empty registry with no kinds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `openai`, `openai-compatible` and `anthropic`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("openai", |c| {
            Ok(Arc::new(OpenAiAdapter::from_config(c)?) as Arc<dyn ProviderAdapter>)
        });
        registry.register("openai-compatible", |c| {
            Ok(Arc::new(OpenAiAdapter::compatible(c)?) as Arc<dyn ProviderAdapter>)
        });
        registry.register("anthropic", |c| {
            Ok(Arc::new(AnthropicAdapter::from_config(c)?) as Arc<dyn ProviderAdapter>)
        });
        registry
    }

    /// Register (or replace) the factory for `kind`.
    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&ProviderConfig) -> ConfigResult<Arc<dyn ProviderAdapter>> + Send + Sync + 'static,
    {
        self.factories.insert(kind.into(), Arc::new(factory));
    }

    pub fn supports(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Build a single adapter.
    pub fn create(&self, config: &ProviderConfig) -> ConfigResult<Arc<dyn ProviderAdapter>> {
        let factory =
            self.factories
                .get(&config.kind)
                .ok_or_else(|| ConfigError::UnsupportedKind {
                    provider: config.id.clone(),
                    kind: config.kind.clone(),
                })?;
        factory(config)
    }

    /// Build every enabled provider. Disabled providers are skipped; failures
    /// are collected in [`RegistryBuild::rejected`].
    pub fn build(&self, configs: &[ProviderConfig]) -> RegistryBuild {
        let mut adapters = Vec::with_capacity(configs.len());
        let mut rejected = Vec::new();

        for config in configs {
            if !config.enabled {
                info!(provider = %config.id, "Provider disabled, skipping");
                continue;
            }
            match self.create(config) {
                Ok(adapter) => {
                    info!(
                        provider = %config.id,
                        kind = %config.kind,
                        model = adapter.model(),
                        "Provider registered"
                    );
                    adapters.push(adapter);
                }
                Err(e) => {
                    warn!(provider = %config.id, kind = %config.kind, error = %e, "Provider excluded");
                    rejected.push((config.id.clone(), e));
                }
            }
        }

        RegistryBuild { adapters, rejected }
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

//! Orchestrator
//!
//! Routes one logical generation call across the registered providers.
//!
//! ```text
//! generate(request)
//!   ├─ no providers                → ERROR / NO_PROVIDER
//!   ├─ live cache entry            → cached response (no adapter call, stats untouched)
//!   ├─ candidate succeeds          → SUCCESS, cached, breaker closed
//!   ├─ candidate fails             → breaker + stats updated, next candidate
//!   └─ candidates exhausted        → ERROR / ALL_PROVIDERS_FAILED + fallback text
//! ```
//!
//! Every path returns a [`Response`]; `generate` never errors or panics.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde_json::json;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::{CacheStats, ResponseCache};
use crate::config::{CacheConfig, CircuitConfig, RelayConfig};
use crate::errors::ErrorKind;
use crate::fallback::{FallbackText, StaticFallbackText};
use crate::providers::ProviderAdapter;
use crate::registry::AdapterRegistry;
use crate::router::{FallbackLadder, HealthSnapshot, HealthTracker, Routing};
use crate::stats::{ProviderStatsSnapshot, StatsCollector};
use crate::types::{ModelInfo, ProviderId, Request, Response, ALL_PROVIDERS_FAILED, NO_PROVIDER};

/// Provider/model label on orchestrator-level error responses.
const NO_PROVIDER_LABEL: &str = "none";
/// Provider/model label on degraded responses.
const FALLBACK_LABEL: &str = "fallback";

/// Thread-safe handle to an orchestrator.
pub type SharedOrchestrator = Arc<Orchestrator>;

/// Builder for [`Orchestrator`].
pub struct OrchestratorBuilder {
    adapters: Vec<Arc<dyn ProviderAdapter>>,
    cache: CacheConfig,
    circuit: CircuitConfig,
    default_provider: Option<ProviderId>,
    fallback: Arc<dyn FallbackText>,
}

impl OrchestratorBuilder {
    fn new() -> Self {
        Self {
            adapters: Vec::new(),
            cache: CacheConfig::default(),
            circuit: CircuitConfig::default(),
            default_provider: None,
            fallback: Arc::new(StaticFallbackText::default()),
        }
    }

    /// Register an adapter. Registration order is failover order.
    pub fn adapter(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    pub fn adapters(mut self, adapters: impl IntoIterator<Item = Arc<dyn ProviderAdapter>>) -> Self {
        self.adapters.extend(adapters);
        self
    }

    pub fn cache_config(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn circuit_config(mut self, circuit: CircuitConfig) -> Self {
        self.circuit = circuit;
        self
    }

    pub fn default_provider(mut self, provider: impl Into<ProviderId>) -> Self {
        self.default_provider = Some(provider.into());
        self
    }

    pub fn fallback_text(mut self, fallback: Arc<dyn FallbackText>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn build(self) -> Orchestrator {
        let health = HealthTracker::from_config(&self.circuit);
        let stats = StatsCollector::new();
        let mut adapters: Vec<Arc<dyn ProviderAdapter>> = Vec::with_capacity(self.adapters.len());
        let mut index = HashMap::with_capacity(self.adapters.len());

        for adapter in self.adapters {
            let id = adapter.id().to_string();
            if index.contains_key(&id) {
                warn!(provider = %id, "Duplicate provider id, keeping first registration");
                continue;
            }
            health.register(&id);
            stats.register(&id);
            index.insert(id, adapters.len());
            adapters.push(adapter);
        }

        let default_provider = match self.default_provider {
            Some(id) if index.contains_key(&id) => Some(id),
            Some(id) => {
                warn!(provider = %id, "Default provider is not registered, ignoring");
                None
            }
            None => None,
        };

        let ladder = FallbackLadder::new(adapters.iter().map(|a| a.id().to_string()).collect());
        info!(
            providers = adapters.len(),
            default = default_provider.as_deref().unwrap_or("-"),
            cache_enabled = self.cache.enabled,
            "Orchestrator ready"
        );

        Orchestrator {
            adapters,
            index,
            ladder,
            preferred: RwLock::new(default_provider),
            cache: ResponseCache::new(&self.cache),
            health,
            stats,
            fallback: self.fallback,
        }
    }
}

/// Multi-provider request router.
///
/// Owns the cache, breakers and stats; adapters only perform vendor calls.
pub struct Orchestrator {
    adapters: Vec<Arc<dyn ProviderAdapter>>,
    index: HashMap<ProviderId, usize>,
    ladder: FallbackLadder,
    /// Provider tried first when a call names none (health-filtered).
    preferred: RwLock<Option<ProviderId>>,
    cache: ResponseCache,
    health: HealthTracker,
    stats: StatsCollector,
    fallback: Arc<dyn FallbackText>,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// Build adapters through `registry` and assemble an orchestrator.
    /// Providers whose configuration is rejected are left out.
    pub fn from_config(config: &RelayConfig, registry: &AdapterRegistry) -> Self {
        let built = registry.build(&config.providers);
        let mut builder = Self::builder()
            .adapters(built.adapters)
            .cache_config(config.cache.clone())
            .circuit_config(config.circuit.clone());
        if let Some(default) = &config.default_provider {
            builder = builder.default_provider(default.clone());
        }
        builder.build()
    }

    pub fn shared(self) -> SharedOrchestrator {
        Arc::new(self)
    }

    /// Generate a response, trying `preferred_provider` first when given.
    pub async fn generate(&self, request: &Request, preferred_provider: Option<&str>) -> Response {
        self.generate_routed(request, Routing::prefer(preferred_provider))
            .await
    }

    /// Generate a response under an explicit routing directive.
    pub async fn generate_routed(&self, request: &Request, routing: Routing) -> Response {
        if self.adapters.is_empty() {
            warn!("Generate called with no providers registered");
            return Response::error(
                NO_PROVIDER_LABEL,
                NO_PROVIDER_LABEL,
                NO_PROVIDER,
                "No providers configured",
            );
        }

        let started = Instant::now();
        let lead = self.preferred.read().await.clone();
        let explicit = match routing.explicit() {
            Some(id) if self.index.contains_key(id) => Some(id),
            Some(id) => {
                warn!(provider = %id, "Requested provider is not registered");
                None
            }
            None => None,
        };

        let cache_key = ResponseCache::key(request, &cache_scope(&routing, lead.as_deref()));
        if let Some(hit) = self.cache.get(&cache_key) {
            debug!(provider = %hit.provider, "Cache hit");
            return hit;
        }

        let candidates = if routing.allows_failover() {
            self.ladder
                .candidates(&self.health, explicit, lead.as_deref())
        } else {
            explicit.map(|id| vec![id.to_string()]).unwrap_or_default()
        };
        debug!(?candidates, "Routing request");

        let mut attempted: Vec<ProviderId> = Vec::with_capacity(candidates.len());
        let mut failures: Vec<String> = Vec::with_capacity(candidates.len());
        let mut all_invalid = true;

        for id in &candidates {
            let Some(adapter) = self.adapter(id) else {
                continue;
            };
            let forced = explicit == Some(id.as_str());
            if !self.health.try_acquire(id) && !forced {
                debug!(provider = %id, "Circuit open, skipping");
                continue;
            }

            attempted.push(id.clone());
            let (response, latency) = self.dispatch(adapter.as_ref(), request).await;

            if response.is_success() {
                self.health.record_success(id, latency);
                self.stats.update(id, &response);
                self.cache.put(cache_key, response.clone());
                info!(
                    provider = %id,
                    latency_ms = latency.as_millis() as u64,
                    attempts = attempted.len(),
                    "Request served"
                );
                return response;
            }

            let kind = response.error_kind.unwrap_or(ErrorKind::Generic);
            self.health.record_failure(id, kind);
            self.stats.update(id, &response);
            all_invalid &= kind.is_client_error();
            failures.push(format!("{id}: {}", kind.code()));
            warn!(
                provider = %id,
                status = %response.status,
                error = response.error_message.as_deref().unwrap_or(""),
                "Provider failed, trying next"
            );
        }

        self.degraded(request, &attempted, &failures, all_invalid, started)
    }

    /// Invoke one adapter, bounded by its timeout. Returns the response and
    /// the measured wall-clock latency.
    async fn dispatch(
        &self,
        adapter: &dyn ProviderAdapter,
        request: &Request,
    ) -> (Response, Duration) {
        let timeout = adapter.timeout();
        let started = Instant::now();
        let outcome = tokio::time::timeout(timeout, adapter.generate(request)).await;
        let latency = started.elapsed();
        let response = match outcome {
            Ok(response) => response,
            Err(_) => Response::failure(
                adapter.id(),
                adapter.model(),
                ErrorKind::Timeout,
                format!("No response within {:.1}s", timeout.as_secs_f64()),
                latency.as_secs_f64(),
            ),
        };
        (response, latency)
    }

    fn degraded(
        &self,
        request: &Request,
        attempted: &[ProviderId],
        failures: &[String],
        all_invalid: bool,
        started: Instant,
    ) -> Response {
        let domain = request.domain();
        let message = if failures.is_empty() {
            "No healthy provider available".to_string()
        } else {
            format!("All providers failed: {}", failures.join(", "))
        };
        let all_invalid_request = all_invalid && !attempted.is_empty();
        warn!(
            domain,
            attempted = attempted.len(),
            all_invalid_request,
            "Returning fallback content"
        );

        Response::error(FALLBACK_LABEL, FALLBACK_LABEL, ALL_PROVIDERS_FAILED, message)
            .with_content(self.fallback.text_for(domain))
            .with_response_time(started.elapsed().as_secs_f64())
            .with_metadata("domain", domain)
            .with_metadata("attempted", json!(attempted))
            .with_metadata("all_invalid_request", all_invalid_request)
    }

    fn adapter(&self, id: &str) -> Option<&Arc<dyn ProviderAdapter>> {
        self.index.get(id).map(|&i| &self.adapters[i])
    }

    /// Make `id` the default first candidate. False if `id` is not registered.
    pub async fn set_preferred_provider(&self, id: &str) -> bool {
        if !self.index.contains_key(id) {
            warn!(provider = %id, "Cannot prefer unregistered provider");
            return false;
        }
        *self.preferred.write().await = Some(id.to_string());
        info!(provider = %id, "Preferred provider set");
        true
    }

    pub async fn preferred_provider(&self) -> Option<ProviderId> {
        self.preferred.read().await.clone()
    }

    /// Registered ids in registration order.
    pub fn provider_ids(&self) -> Vec<ProviderId> {
        self.ladder.providers().to_vec()
    }

    /// Registered providers whose circuit currently admits traffic.
    pub fn list_available_providers(&self) -> Vec<ProviderId> {
        self.health.healthy_providers(self.ladder.providers())
    }

    pub fn get_provider_stats(&self) -> BTreeMap<ProviderId, ProviderStatsSnapshot> {
        self.stats.get_stats()
    }

    pub fn reset_stats(&self) {
        self.stats.clear();
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
        info!("Response cache cleared");
    }

    pub fn get_cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn health_report(&self) -> Vec<HealthSnapshot> {
        self.health.report(self.ladder.providers())
    }

    pub fn model_info(&self, id: &str) -> Option<ModelInfo> {
        self.adapter(id).map(|a| a.model_info())
    }

    /// Probe `id`, or the preferred provider, or the first registered one.
    pub async fn validate_provider_connection(&self, id: Option<&str>) -> bool {
        let target = match id {
            Some(id) => Some(id.to_string()),
            None => self
                .preferred_provider()
                .await
                .or_else(|| self.ladder.providers().first().cloned()),
        };
        let Some(adapter) = target.as_deref().and_then(|t| self.adapter(t)) else {
            warn!(provider = ?target, "No provider to validate");
            return false;
        };
        let ok = adapter.validate_connection().await;
        info!(provider = adapter.id(), ok, "Connection validated");
        ok
    }

    /// Probe every provider concurrently.
    pub async fn validate_all_connections(&self) -> BTreeMap<ProviderId, bool> {
        let probes = self.adapters.iter().map(|adapter| async move {
            (adapter.id().to_string(), adapter.validate_connection().await)
        });
        join_all(probes).await.into_iter().collect()
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("providers", &self.ladder.providers())
            .field("cache", &self.cache)
            .field("health", &self.health)
            .finish_non_exhaustive()
    }
}

/// Provider component of the cache key for one routing directive.
fn cache_scope(routing: &Routing, lead: Option<&str>) -> String {
    match routing {
        Routing::Default => lead.unwrap_or("*").to_string(),
        Routing::Prefer(id) => id.clone(),
        Routing::Only(id) => format!("only:{id}"),
    }
}

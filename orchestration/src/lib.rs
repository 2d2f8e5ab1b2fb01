//! Orchestration Library
//!
//! Routes text-generation requests across interchangeable providers:
//! - TTL response cache keyed by a canonical request fingerprint
//! - Per-provider circuit breakers that gate routing
//! - Ordered failover with degraded fallback text on total exhaustion
//! - Per-provider usage statistics
//!
//! # Usage
//!
//! ```rust,ignore
//! use orchestration::{AdapterRegistry, Orchestrator, RelayConfig, Request};
//!
//! let config = RelayConfig::load("relay.toml")?;
//! let orchestrator = Orchestrator::from_config(&config, &AdapterRegistry::with_builtins()).shared();
//!
//! let response = orchestrator
//!     .generate(&Request::new("What is the capital of France?"), Some("openai"))
//!     .await;
//! println!("{} ({})", response.content, response.provider);
//! ```

pub mod cache;
pub mod config;
pub mod errors;
pub mod fallback;
pub mod orchestrator;
pub mod providers;
pub mod registry;
pub mod router;
pub mod stats;
pub mod types;

pub use cache::{CacheStats, ResponseCache};
pub use config::{CacheConfig, CircuitConfig, ProviderConfig, RelayConfig};
pub use errors::{AdapterError, ConfigError, ConfigResult, ErrorKind};
pub use fallback::{FallbackText, StaticFallbackText};
pub use orchestrator::{Orchestrator, OrchestratorBuilder, SharedOrchestrator};
pub use providers::{AnthropicAdapter, Completion, OpenAiAdapter, ProviderAdapter};
pub use registry::{AdapterRegistry, RegistryBuild};
pub use router::{CircuitState, HealthSnapshot, HealthTracker, Routing};
pub use stats::{ProviderStatsSnapshot, StatsCollector};
pub use types::{
    ModelInfo, ProviderId, Request, Response, ResponseStatus, ALL_PROVIDERS_FAILED,
    DEFAULT_DOMAIN, NO_PROVIDER,
};

//! Subcommand implementations. Each returns a serializable report; `main`
//! prints it.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use orchestration::{
    AdapterRegistry, HealthSnapshot, ModelInfo, Orchestrator, ProviderId, ProviderStatsSnapshot,
    RelayConfig, Request, Response, Routing,
};
use serde::Serialize;
use tracing::{info, warn};

/// Options for one `generate` invocation.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub prompt: String,
    pub provider: Option<String>,
    pub only: bool,
    pub domain: Option<String>,
    pub system: Option<String>,
    pub repeat: u32,
}

impl GenerateOptions {
    fn request(&self) -> Request {
        let mut request = Request::new(self.prompt.clone());
        if let Some(system) = &self.system {
            request = request.with_system_message(system.clone());
        }
        if let Some(domain) = &self.domain {
            request = request.with_metadata("domain", domain.clone());
        }
        request
    }

    fn routing(&self) -> Routing {
        match (&self.provider, self.only) {
            (Some(id), true) => Routing::Only(id.clone()),
            (provider, _) => Routing::prefer(provider.clone()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GenerateReport {
    pub responses: Vec<Response>,
    pub stats: BTreeMap<ProviderId, ProviderStatsSnapshot>,
}

impl GenerateReport {
    pub fn all_succeeded(&self) -> bool {
        self.responses.iter().all(Response::is_success)
    }
}

#[derive(Debug, Serialize)]
pub struct ProviderListing {
    pub id: ProviderId,
    pub available: bool,
    pub model: Option<ModelInfo>,
    pub health: HealthSnapshot,
}

/// Load config, build adapters, and assemble the orchestrator.
pub fn load_orchestrator(path: &Path) -> Result<Orchestrator> {
    let config = RelayConfig::load(path)
        .with_context(|| format!("Failed to load relay config from {}", path.display()))?;
    let orchestrator = Orchestrator::from_config(&config, &AdapterRegistry::with_builtins());
    if orchestrator.provider_ids().is_empty() {
        warn!(path = %path.display(), "No usable providers configured");
    }
    Ok(orchestrator)
}

pub async fn generate(orchestrator: &Orchestrator, options: &GenerateOptions) -> GenerateReport {
    let request = options.request();
    let routing = options.routing();
    let mut responses = Vec::with_capacity(options.repeat.max(1) as usize);

    for attempt in 1..=options.repeat.max(1) {
        let response = orchestrator.generate_routed(&request, routing.clone()).await;
        info!(
            attempt,
            provider = %response.provider,
            status = %response.status,
            "Generate finished"
        );
        responses.push(response);
    }

    GenerateReport {
        responses,
        stats: orchestrator.get_provider_stats(),
    }
}

pub fn providers(orchestrator: &Orchestrator) -> Vec<ProviderListing> {
    let available = orchestrator.list_available_providers();
    orchestrator
        .health_report()
        .into_iter()
        .map(|health| ProviderListing {
            available: available.contains(&health.provider),
            model: orchestrator.model_info(&health.provider),
            id: health.provider.clone(),
            health,
        })
        .collect()
}

/// Probe one provider, or all of them.
pub async fn check(orchestrator: &Orchestrator, provider: Option<&str>) -> BTreeMap<ProviderId, bool> {
    match provider {
        Some(id) => {
            let ok = orchestrator.validate_provider_connection(Some(id)).await;
            BTreeMap::from([(id.to_string(), ok)])
        }
        None => orchestrator.validate_all_connections().await,
    }
}

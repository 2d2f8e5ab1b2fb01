//! Orchestrator integration tests: caching, circuit breaking and failover
//! against scripted providers.
//!
//! Tests verify:
//! - A failed provider hands the request to the next candidate
//! - Identical requests inside the TTL reach the provider once
//! - Circuits open at the threshold and recover through a probe
//! - Total exhaustion yields uncached fallback text
//! - Timeouts are treated as provider failures

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use orchestration::{
    AdapterError, CacheConfig, CircuitConfig, CircuitState, Completion, ErrorKind, ModelInfo,
    Orchestrator, ProviderAdapter, Request, ResponseStatus, Routing, StaticFallbackText,
    ALL_PROVIDERS_FAILED, NO_PROVIDER,
};

#[derive(Debug, Clone)]
enum Step {
    Reply(&'static str),
    Fail(ErrorKind),
    Stall(Duration),
}

/// Provider whose behaviour is set by the test.
struct ScriptedAdapter {
    id: String,
    timeout: Duration,
    step: Mutex<Step>,
    calls: AtomicUsize,
}

impl ScriptedAdapter {
    fn new(id: &str, step: Step) -> Arc<Self> {
        Self::with_timeout(id, step, Duration::from_secs(5))
    }

    fn with_timeout(id: &str, step: Step, timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            timeout,
            step: Mutex::new(step),
            calls: AtomicUsize::new(0),
        })
    }

    fn set(&self, step: Step) {
        *self.step.lock().unwrap() = step;
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn model(&self) -> &str {
        "scripted-1"
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            provider: self.id.clone(),
            model: "scripted-1".to_string(),
            supports_system_message: true,
            supports_context: false,
            max_context_tokens: 8_192,
            max_output_tokens: 512,
        }
    }

    async fn complete(&self, _request: &Request) -> Result<Completion, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self.step.lock().unwrap().clone();
        match step {
            Step::Reply(text) => Ok(Completion {
                content: text.to_string(),
                tokens_used: Some(7),
                finish_reason: Some("stop".to_string()),
            }),
            Step::Fail(kind) => Err(AdapterError::new(kind, "scripted failure")),
            Step::Stall(delay) => {
                tokio::time::sleep(delay).await;
                Ok(Completion {
                    content: "late".to_string(),
                    ..Default::default()
                })
            }
        }
    }

    async fn validate_connection(&self) -> bool {
        matches!(*self.step.lock().unwrap(), Step::Reply(_))
    }
}

fn orchestrator(adapters: &[&Arc<ScriptedAdapter>]) -> Orchestrator {
    Orchestrator::builder()
        .adapters(
            adapters
                .iter()
                .map(|a| Arc::clone(*a) as Arc<dyn ProviderAdapter>),
        )
        .cache_config(CacheConfig {
            enabled: true,
            ttl_secs: 60,
            max_entries: 100,
        })
        .circuit_config(CircuitConfig {
            failure_threshold: 3,
            cooldown_secs: 60,
        })
        .fallback_text(Arc::new(
            StaticFallbackText::new("generic fallback").with_entry("retail", "retail fallback"),
        ))
        .build()
}

fn capital_question() -> Request {
    Request::new("What is the capital of France?")
        .with_context("audience", "students")
        .with_temperature(0.2)
}

#[tokio::test]
async fn test_rate_limited_preferred_fails_over() {
    let a = ScriptedAdapter::new("a", Step::Fail(ErrorKind::RateLimit));
    let b = ScriptedAdapter::new("b", Step::Reply("Paris"));
    let orch = orchestrator(&[&a, &b]);

    let resp = orch.generate(&capital_question(), Some("a")).await;

    assert_eq!(resp.status, ResponseStatus::Success);
    assert_eq!(resp.provider, "b");
    assert_eq!(resp.content, "Paris");
    assert!(resp.error_code.is_none());

    let stats = orch.get_provider_stats();
    assert_eq!(stats["a"].failures, 1);
    assert_eq!(stats["a"].successes, 0);
    assert_eq!(stats["b"].successes, 1);
}

#[tokio::test]
async fn test_identical_request_hits_cache() {
    let a = ScriptedAdapter::new("a", Step::Reply("Paris"));
    let orch = orchestrator(&[&a]);

    let first = orch.generate(&capital_question(), None).await;
    let second = orch.generate(&capital_question(), None).await;

    assert_eq!(a.calls(), 1);
    assert_eq!(first.content, second.content);
    assert_eq!(first, second);
    // Cache hits leave stats untouched
    assert_eq!(orch.get_provider_stats()["a"].requests, 1);
    assert_eq!(orch.get_cache_stats().valid_entries, 1);
}

#[tokio::test]
async fn test_different_parameters_miss_cache() {
    let a = ScriptedAdapter::new("a", Step::Reply("Paris"));
    let orch = orchestrator(&[&a]);

    orch.generate(&capital_question(), None).await;
    orch.generate(&capital_question().with_max_tokens(5), None).await;
    orch.generate(&capital_question(), Some("a")).await;

    assert_eq!(a.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_cached_entry_expires_after_ttl() {
    let a = ScriptedAdapter::new("a", Step::Reply("Paris"));
    let orch = orchestrator(&[&a]);

    orch.generate(&capital_question(), None).await;
    tokio::time::advance(Duration::from_secs(59)).await;
    orch.generate(&capital_question(), None).await;
    assert_eq!(a.calls(), 1);

    tokio::time::advance(Duration::from_secs(1)).await;
    orch.generate(&capital_question(), None).await;
    assert_eq!(a.calls(), 2);
}

#[tokio::test]
async fn test_no_provider_configured() {
    let orch = Orchestrator::builder().build();

    let resp = orch.generate(&capital_question(), None).await;

    assert_eq!(resp.status, ResponseStatus::Error);
    assert_eq!(resp.error_code.as_deref(), Some(NO_PROVIDER));
    assert_eq!(orch.get_cache_stats().total_entries, 0);
    assert!(orch.get_provider_stats().is_empty());
}

#[tokio::test]
async fn test_exhaustion_returns_domain_fallback_uncached() {
    let a = ScriptedAdapter::new("a", Step::Fail(ErrorKind::Generic));
    let b = ScriptedAdapter::new("b", Step::Fail(ErrorKind::Authentication));
    let orch = orchestrator(&[&a, &b]);
    let request = capital_question().with_metadata("domain", "retail");

    let resp = orch.generate(&request, None).await;

    assert_eq!(resp.status, ResponseStatus::Error);
    assert_eq!(resp.error_code.as_deref(), Some(ALL_PROVIDERS_FAILED));
    assert_eq!(resp.content, "retail fallback");
    assert_eq!(resp.metadata["domain"], "retail");
    assert_eq!(resp.metadata["attempted"], serde_json::json!(["a", "b"]));
    assert_eq!(resp.metadata["all_invalid_request"], false);
    assert_eq!(orch.get_cache_stats().total_entries, 0);

    // Not cached: the next call reaches the providers again
    orch.generate(&request, None).await;
    assert_eq!(a.calls(), 2);
    assert_eq!(b.calls(), 2);
}

#[tokio::test]
async fn test_unknown_domain_uses_default_fallback() {
    let a = ScriptedAdapter::new("a", Step::Fail(ErrorKind::Generic));
    let orch = orchestrator(&[&a]);

    let resp = orch.generate(&Request::new("hi"), None).await;

    assert_eq!(resp.content, "generic fallback");
    assert_eq!(resp.metadata["domain"], "general");
}

#[tokio::test]
async fn test_all_invalid_request_is_flagged() {
    let a = ScriptedAdapter::new("a", Step::Fail(ErrorKind::InvalidRequest));
    let b = ScriptedAdapter::new("b", Step::Fail(ErrorKind::InvalidRequest));
    let orch = orchestrator(&[&a, &b]);

    let resp = orch.generate(&capital_question(), None).await;

    // Invalid requests still fail over
    assert_eq!(b.calls(), 1);
    assert_eq!(resp.metadata["all_invalid_request"], true);
}

#[tokio::test]
async fn test_clear_cache_forces_refetch() {
    let a = ScriptedAdapter::new("a", Step::Reply("Paris"));
    let orch = orchestrator(&[&a]);

    orch.generate(&capital_question(), None).await;
    orch.clear_cache();
    assert_eq!(orch.get_cache_stats().total_entries, 0);

    orch.generate(&capital_question(), None).await;
    assert_eq!(a.calls(), 2);
}

#[tokio::test]
async fn test_circuit_opens_after_threshold() {
    let a = ScriptedAdapter::new("a", Step::Fail(ErrorKind::Generic));
    let b = ScriptedAdapter::new("b", Step::Reply("ok"));
    let orch = orchestrator(&[&a, &b]);

    for i in 0..3 {
        let resp = orch.generate(&Request::new(format!("q{i}")), None).await;
        assert_eq!(resp.provider, "b");
    }
    assert_eq!(a.calls(), 3);
    assert_eq!(orch.list_available_providers(), vec!["b".to_string()]);

    // Open circuit: a is no longer attempted
    orch.generate(&Request::new("q3"), None).await;
    assert_eq!(a.calls(), 3);

    let report = orch.health_report();
    assert_eq!(report[0].provider, "a");
    assert_eq!(report[0].state, CircuitState::Open);
    assert_eq!(report[0].consecutive_failures, 3);
    assert_eq!(report[1].state, CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_circuit_recovers_after_cooldown_probe() {
    let a = ScriptedAdapter::new("a", Step::Fail(ErrorKind::Timeout));
    let b = ScriptedAdapter::new("b", Step::Reply("from b"));
    let orch = orchestrator(&[&a, &b]);

    for i in 0..3 {
        orch.generate(&Request::new(format!("q{i}")), None).await;
    }
    assert_eq!(orch.health_report()[0].state, CircuitState::Open);

    a.set(Step::Reply("from a"));
    tokio::time::advance(Duration::from_secs(60)).await;
    assert_eq!(orch.health_report()[0].state, CircuitState::HalfOpen);

    let resp = orch.generate(&Request::new("probe"), None).await;
    assert_eq!(resp.provider, "a");
    assert_eq!(resp.content, "from a");
    assert_eq!(orch.health_report()[0].state, CircuitState::Closed);
}

#[tokio::test]
async fn test_explicit_preference_bypasses_open_circuit() {
    let a = ScriptedAdapter::new("a", Step::Fail(ErrorKind::Generic));
    let b = ScriptedAdapter::new("b", Step::Reply("ok"));
    let orch = orchestrator(&[&a, &b]);
    for i in 0..3 {
        orch.generate(&Request::new(format!("q{i}")), None).await;
    }
    assert!(!orch.list_available_providers().contains(&"a".to_string()));

    a.set(Step::Reply("a is back"));
    let resp = orch.generate(&Request::new("direct"), Some("a")).await;

    assert_eq!(a.calls(), 4);
    assert_eq!(resp.provider, "a");
    assert_eq!(orch.health_report()[0].state, CircuitState::Closed);
}

#[tokio::test]
async fn test_default_provider_is_health_filtered() {
    let a = ScriptedAdapter::new("a", Step::Reply("from a"));
    let b = ScriptedAdapter::new("b", Step::Fail(ErrorKind::Generic));
    let orch = orchestrator(&[&a, &b]);
    assert!(orch.set_preferred_provider("b").await);

    for i in 0..3 {
        let resp = orch.generate(&Request::new(format!("q{i}")), None).await;
        assert_eq!(resp.provider, "a");
    }
    assert_eq!(b.calls(), 3);

    // b is open now and no longer tried first
    orch.generate(&Request::new("q3"), None).await;
    assert_eq!(b.calls(), 3);
}

#[tokio::test]
async fn test_set_preferred_provider() {
    let a = ScriptedAdapter::new("a", Step::Reply("from a"));
    let b = ScriptedAdapter::new("b", Step::Reply("from b"));
    let orch = orchestrator(&[&a, &b]);

    assert!(!orch.set_preferred_provider("zzz").await);
    assert_eq!(orch.generate(&Request::new("q"), None).await.provider, "a");

    assert!(orch.set_preferred_provider("b").await);
    assert_eq!(orch.preferred_provider().await.as_deref(), Some("b"));
    assert_eq!(orch.generate(&Request::new("q"), None).await.provider, "b");
}

#[tokio::test]
async fn test_explicit_preference_overrides_default_order() {
    let a = ScriptedAdapter::new("a", Step::Fail(ErrorKind::Generic));
    let b = ScriptedAdapter::new("b", Step::Fail(ErrorKind::Generic));
    let c = ScriptedAdapter::new("c", Step::Fail(ErrorKind::Generic));
    let orch = orchestrator(&[&a, &b, &c]);
    assert!(orch.set_preferred_provider("c").await);

    let resp = orch.generate(&Request::new("q"), Some("a")).await;
    assert_eq!(resp.error_code.as_deref(), Some(ALL_PROVIDERS_FAILED));
    assert_eq!(resp.metadata["attempted"], serde_json::json!(["a", "b", "c"]));

    // Without a per-call preference the default leads again
    let resp = orch.generate(&Request::new("q2"), None).await;
    assert_eq!(resp.metadata["attempted"], serde_json::json!(["c", "a", "b"]));
}

#[tokio::test]
async fn test_only_routing_never_fails_over() {
    let a = ScriptedAdapter::new("a", Step::Fail(ErrorKind::RateLimit));
    let b = ScriptedAdapter::new("b", Step::Reply("ok"));
    let orch = orchestrator(&[&a, &b]);

    let resp = orch
        .generate_routed(&Request::new("q"), Routing::Only("a".into()))
        .await;

    assert_eq!(resp.error_code.as_deref(), Some(ALL_PROVIDERS_FAILED));
    assert_eq!(a.calls(), 1);
    assert_eq!(b.calls(), 0);
}

#[tokio::test]
async fn test_only_unregistered_provider_degrades() {
    let a = ScriptedAdapter::new("a", Step::Reply("ok"));
    let orch = orchestrator(&[&a]);

    let resp = orch
        .generate_routed(&Request::new("q"), Routing::Only("ghost".into()))
        .await;

    assert_eq!(resp.error_code.as_deref(), Some(ALL_PROVIDERS_FAILED));
    assert_eq!(resp.metadata["attempted"], serde_json::json!([]));
    assert_eq!(a.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_counts_as_failure() {
    let a = ScriptedAdapter::with_timeout(
        "a",
        Step::Stall(Duration::from_secs(30)),
        Duration::from_secs(1),
    );
    let b = ScriptedAdapter::new("b", Step::Reply("Paris"));
    let orch = orchestrator(&[&a, &b]);

    let resp = orch.generate(&capital_question(), None).await;

    assert_eq!(resp.provider, "b");
    let report = orch.health_report();
    assert_eq!(report[0].last_error, Some(ErrorKind::Timeout));
    assert_eq!(orch.get_provider_stats()["a"].failures, 1);
}

#[tokio::test]
async fn test_concurrent_callers() {
    let a = ScriptedAdapter::new("a", Step::Reply("ok"));
    let orch = orchestrator(&[&a]).shared();

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let orch = Arc::clone(&orch);
            tokio::spawn(async move { orch.generate(&Request::new(format!("q{i}")), None).await })
        })
        .collect();
    for handle in handles {
        assert!(handle.await.unwrap().is_success());
    }

    assert_eq!(a.calls(), 16);
    let stats = orch.get_provider_stats();
    assert_eq!(stats["a"].requests, 16);
    assert!((stats["a"].success_rate - 1.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_connection_validation() {
    let a = ScriptedAdapter::new("a", Step::Reply("ok"));
    let b = ScriptedAdapter::new("b", Step::Fail(ErrorKind::Authentication));
    let orch = orchestrator(&[&a, &b]);

    assert!(orch.validate_provider_connection(None).await);
    assert!(!orch.validate_provider_connection(Some("b")).await);
    assert!(!orch.validate_provider_connection(Some("ghost")).await);

    let all = orch.validate_all_connections().await;
    assert!(all["a"]);
    assert!(!all["b"]);
}

#[tokio::test]
async fn test_reset_stats_and_model_info() {
    let a = ScriptedAdapter::new("a", Step::Reply("ok"));
    let orch = orchestrator(&[&a]);
    orch.generate(&Request::new("q"), None).await;

    orch.reset_stats();
    assert_eq!(orch.get_provider_stats()["a"].requests, 0);

    let info = orch.model_info("a").unwrap();
    assert_eq!(info.model, "scripted-1");
    assert!(orch.model_info("ghost").is_none());
    assert_eq!(orch.provider_ids(), vec!["a".to_string()]);
}

//! Circuit breaker and fallback ladder for provider routing.
//!
//! The [`HealthTracker`] keeps one breaker per provider. When consecutive
//! failures reach the configured threshold the circuit *opens* and the
//! provider is skipped. After the cooldown the circuit admits one probe
//! (*half-open*); a successful probe closes it, a failed one reopens it and
//! restarts the cooldown clock.
//!
//! The [`FallbackLadder`] turns the registration order plus an optional
//! explicit preference into the ordered candidate list for one call.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::CircuitConfig;
use crate::errors::ErrorKind;
use crate::types::ProviderId;

/// Circuit breaker state for a single provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Healthy; requests allowed.
    Closed,
    /// Tripped; requests blocked until cooldown expires.
    Open,
    /// Cooldown expired; one probe request allowed.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Mutable breaker record for one provider.
#[derive(Debug, Clone)]
pub struct ProviderHealthState {
    pub consecutive_failures: u32,
    pub state: CircuitState,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub last_success_time: Option<DateTime<Utc>>,
    pub last_error: Option<ErrorKind>,
    pub last_latency: Option<Duration>,
    opened_at: Option<Instant>,
    /// When the outstanding half-open probe was granted.
    probe_started: Option<Instant>,
}

impl Default for ProviderHealthState {
    fn default() -> Self {
        Self {
            consecutive_failures: 0,
            state: CircuitState::Closed,
            last_failure_time: None,
            last_success_time: None,
            last_error: None,
            last_latency: None,
            opened_at: None,
            probe_started: None,
        }
    }
}

impl ProviderHealthState {
    fn cooldown_elapsed(&self, cooldown: Duration) -> bool {
        self.opened_at
            .map(|at| at.elapsed() >= cooldown)
            .unwrap_or(true)
    }

    fn open(&mut self) {
        self.state = CircuitState::Open;
        self.opened_at = Some(Instant::now());
        self.probe_started = None;
    }
}

/// Serializable view of one provider's breaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub provider: ProviderId,
    pub state: CircuitState,
    pub available: bool,
    pub consecutive_failures: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failure_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_success_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_latency_ms: Option<u64>,
}

/// Per-provider circuit breakers.
///
/// Each provider's record sits in its own map entry; updates for one
/// provider never wait on another provider's record.
#[derive(Debug)]
pub struct HealthTracker {
    states: DashMap<ProviderId, ProviderHealthState>,
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,
    /// Time an open circuit waits before admitting a probe.
    pub cooldown: Duration,
}

impl HealthTracker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            states: DashMap::new(),
            failure_threshold: failure_threshold.max(1),
            cooldown,
        }
    }

    pub fn from_config(config: &CircuitConfig) -> Self {
        Self::new(config.failure_threshold, config.cooldown())
    }

    /// Start tracking `provider` in the closed state.
    pub fn register(&self, provider: &str) {
        self.states.entry(provider.to_string()).or_default();
    }

    /// Record a success. Closes the circuit from any state.
    pub fn record_success(&self, provider: &str, latency: Duration) {
        let mut entry = self.states.entry(provider.to_string()).or_default();
        let previous = entry.state;
        entry.consecutive_failures = 0;
        entry.state = CircuitState::Closed;
        entry.opened_at = None;
        entry.probe_started = None;
        entry.last_success_time = Some(Utc::now());
        entry.last_latency = Some(latency);
        if previous != CircuitState::Closed {
            info!(provider, from = %previous, "Circuit closed");
        }
    }

    /// Record a failure. May trip the circuit to open.
    pub fn record_failure(&self, provider: &str, kind: ErrorKind) {
        let mut entry = self.states.entry(provider.to_string()).or_default();
        entry.consecutive_failures = entry.consecutive_failures.saturating_add(1);
        entry.last_failure_time = Some(Utc::now());
        entry.last_error = Some(kind);
        entry.probe_started = None;

        let state = entry.state;
        match state {
            CircuitState::HalfOpen => {
                entry.open();
                warn!(provider, error = %kind, "Probe failed, circuit reopened");
            }
            CircuitState::Open => {
                // A forced attempt against an open circuit restarts the cooldown.
                entry.opened_at = Some(Instant::now());
                debug!(provider, error = %kind, "Failure while open, cooldown restarted");
            }
            CircuitState::Closed if entry.consecutive_failures >= self.failure_threshold => {
                entry.open();
                warn!(
                    provider,
                    error = %kind,
                    failures = entry.consecutive_failures,
                    cooldown_secs = self.cooldown.as_secs(),
                    "Circuit opened"
                );
            }
            CircuitState::Closed => {}
        }
    }

    /// Current state of the circuit for `provider`.
    ///
    /// An open circuit whose cooldown has elapsed reports `HalfOpen`.
    pub fn state(&self, provider: &str) -> CircuitState {
        match self.states.get(provider) {
            Some(entry) => match entry.state {
                CircuitState::Open if entry.cooldown_elapsed(self.cooldown) => {
                    CircuitState::HalfOpen
                }
                state => state,
            },
            None => CircuitState::Closed,
        }
    }

    /// False iff the circuit is open and the cooldown has not elapsed.
    pub fn is_available(&self, provider: &str) -> bool {
        match self.states.get(provider) {
            Some(entry) => {
                !(entry.state == CircuitState::Open && !entry.cooldown_elapsed(self.cooldown))
            }
            None => true,
        }
    }

    /// Gate a dispatch. Moves an expired open circuit to half-open and grants
    /// the single probe; refuses further callers until the probe resolves.
    ///
    /// A probe that never reports back (caller dropped mid-flight) is
    /// re-granted once another cooldown has passed.
    pub fn try_acquire(&self, provider: &str) -> bool {
        let mut entry = self.states.entry(provider.to_string()).or_default();
        let state = entry.state;
        match state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                if !entry.cooldown_elapsed(self.cooldown) {
                    return false;
                }
                entry.state = CircuitState::HalfOpen;
                entry.probe_started = Some(Instant::now());
                info!(provider, "Circuit half-open, sending probe");
                true
            }
            CircuitState::HalfOpen => {
                let outstanding = entry
                    .probe_started
                    .is_some_and(|at| at.elapsed() < self.cooldown);
                if outstanding {
                    false
                } else {
                    entry.probe_started = Some(Instant::now());
                    true
                }
            }
        }
    }

    /// Filter out unavailable providers, preserving input order.
    pub fn healthy_providers(&self, providers: &[ProviderId]) -> Vec<ProviderId> {
        providers
            .iter()
            .filter(|p| self.is_available(p))
            .cloned()
            .collect()
    }

    /// Consecutive failures recorded for `provider`.
    pub fn failure_count(&self, provider: &str) -> u32 {
        self.states
            .get(provider)
            .map(|e| e.consecutive_failures)
            .unwrap_or(0)
    }

    pub fn snapshot(&self, provider: &str) -> HealthSnapshot {
        let state = self.state(provider);
        let available = self.is_available(provider);
        let record = self
            .states
            .get(provider)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        HealthSnapshot {
            provider: provider.to_string(),
            state,
            available,
            consecutive_failures: record.consecutive_failures,
            last_error: record.last_error,
            last_failure_time: record.last_failure_time,
            last_success_time: record.last_success_time,
            last_latency_ms: record.last_latency.map(|d| d.as_millis() as u64),
        }
    }

    /// Snapshots for `providers`, in the given order.
    pub fn report(&self, providers: &[ProviderId]) -> Vec<HealthSnapshot> {
        providers.iter().map(|p| self.snapshot(p)).collect()
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::from_config(&CircuitConfig::default())
    }
}

/// Ordered fallback ladder of providers.
#[derive(Debug, Clone)]
pub struct FallbackLadder {
    providers: Vec<ProviderId>,
}

impl FallbackLadder {
    /// Create a ladder from providers in registration order.
    pub fn new(providers: Vec<ProviderId>) -> Self {
        Self { providers }
    }

    /// Candidate order for one call.
    ///
    /// `explicit` goes first regardless of its breaker, followed by the
    /// healthy remainder in registration order. Without `explicit`, `lead`
    /// (the default provider) heads the order but is still health-filtered.
    /// Duplicates are dropped.
    pub fn candidates(
        &self,
        breaker: &HealthTracker,
        explicit: Option<&str>,
        lead: Option<&str>,
    ) -> Vec<ProviderId> {
        let explicit = explicit.filter(|e| self.contains(e));
        let lead = match explicit {
            Some(_) => None,
            None => lead.filter(|l| self.contains(l)),
        };

        let mut ordered: Vec<ProviderId> = Vec::with_capacity(self.providers.len());
        ordered.extend(lead.map(str::to_string));
        ordered.extend(
            self.providers
                .iter()
                .filter(|p| Some(p.as_str()) != lead)
                .cloned(),
        );

        let mut candidates = Vec::with_capacity(ordered.len());
        candidates.extend(explicit.map(str::to_string));
        for id in breaker.healthy_providers(&ordered) {
            if !candidates.contains(&id) {
                candidates.push(id);
            }
        }
        candidates
    }

    pub fn contains(&self, provider: &str) -> bool {
        self.providers.iter().any(|p| p == provider)
    }

    /// The ordered list of providers.
    pub fn providers(&self) -> &[ProviderId] {
        &self.providers
    }
}

//! Per-provider usage counters.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::types::{ProviderId, Response};

/// Raw counters for one provider.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderStats {
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
    /// Sum of response times in seconds.
    pub total_response_time: f64,
    pub total_tokens: u64,
    pub last_used: Option<DateTime<Utc>>,
}

impl ProviderStats {
    /// Fraction of requests that succeeded (0.0 with no requests).
    pub fn success_rate(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.successes as f64 / self.requests as f64
        }
    }

    /// Mean response time in seconds (0.0 with no requests).
    pub fn average_response_time(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.total_response_time / self.requests as f64
        }
    }

    pub fn snapshot(&self) -> ProviderStatsSnapshot {
        ProviderStatsSnapshot {
            requests: self.requests,
            successes: self.successes,
            failures: self.failures,
            total_response_time: self.total_response_time,
            average_response_time: self.average_response_time(),
            success_rate: self.success_rate(),
            total_tokens: self.total_tokens,
            last_used: self.last_used,
        }
    }
}

/// Reported view of a provider's counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderStatsSnapshot {
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub total_response_time: f64,
    pub average_response_time: f64,
    pub success_rate: f64,
    pub total_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used: Option<DateTime<Utc>>,
}

/// Concurrent per-provider counters. Each provider's record is updated
/// under its own map entry.
#[derive(Debug, Default)]
pub struct StatsCollector {
    providers: DashMap<ProviderId, ProviderStats>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure `provider` appears in reports even before its first call.
    pub fn register(&self, provider: &str) {
        self.providers.entry(provider.to_string()).or_default();
    }

    /// Fold one attempt's outcome into the provider's counters.
    pub fn update(&self, provider: &str, response: &Response) {
        let mut stats = self.providers.entry(provider.to_string()).or_default();
        stats.requests += 1;
        if response.is_success() {
            stats.successes += 1;
        } else {
            stats.failures += 1;
        }
        stats.total_response_time += response.response_time.max(0.0);
        if let Some(tokens) = response.tokens_used {
            stats.total_tokens += u64::from(tokens);
        }
        stats.last_used = Some(Utc::now());
    }

    /// Snapshot of every provider, keyed and ordered by id.
    pub fn get_stats(&self) -> BTreeMap<ProviderId, ProviderStatsSnapshot> {
        self.providers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().snapshot()))
            .collect()
    }

    pub fn provider_stats(&self, provider: &str) -> Option<ProviderStatsSnapshot> {
        self.providers.get(provider).map(|s| s.snapshot())
    }

    /// Zero every counter, keeping registered providers.
    pub fn clear(&self) {
        for mut entry in self.providers.iter_mut() {
            *entry.value_mut() = ProviderStats::default();
        }
    }
}

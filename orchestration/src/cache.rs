//! TTL response cache keyed by request fingerprint.
//!
//! Entries expire lazily: a lookup that finds an expired entry removes it.
//! When the entry count passes the soft cap, `put` sweeps every expired
//! entry. Live entries are never evicted to satisfy the cap.

use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::time::Instant;
use tracing::debug;

use crate::config::CacheConfig;
use crate::types::{Request, Response};

#[derive(Debug, Clone)]
struct CacheEntry {
    response: Response,
    inserted_at: Instant,
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub valid_entries: usize,
    pub expired_entries: usize,
    /// TTL in seconds
    pub ttl: u64,
    pub enabled: bool,
}

/// Concurrent TTL cache of successful responses.
#[derive(Debug)]
pub struct ResponseCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
    max_entries: usize,
    enabled: bool,
}

impl ResponseCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            ttl: config.ttl(),
            max_entries: config.max_entries.max(1),
            enabled: config.enabled,
        }
    }

    /// Deterministic fingerprint of `request` routed to `provider`.
    ///
    /// Context maps are canonicalized (keys sorted at every depth) so two
    /// requests that differ only in map insertion order share a key. The
    /// temperature is hashed by bit pattern; JSON has no NaN.
    pub fn key(request: &Request, provider: &str) -> String {
        let context: Map<String, Value> = request
            .context
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let fingerprint = canonicalize(&json!({
            "prompt": request.prompt,
            "context": Value::Object(context),
            "system_message": request.system_message,
            "temperature": request.temperature.map(f32::to_bits),
            "max_tokens": request.max_tokens,
            "provider": provider,
        }));
        blake3::hash(fingerprint.to_string().as_bytes())
            .to_hex()
            .to_string()
    }

    /// Live entry for `key`, if any.
    pub fn get(&self, key: &str) -> Option<Response> {
        if !self.enabled {
            return None;
        }
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) if now.duration_since(entry.inserted_at) < self.ttl => {
                return Some(entry.response.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            // Another caller may have refreshed the entry since the read.
            self.entries
                .remove_if(key, |_, e| now.duration_since(e.inserted_at) >= self.ttl);
            debug!(key, "Cache entry expired");
        }
        None
    }

    /// Store `response` under `key`, replacing any previous entry.
    pub fn put(&self, key: String, response: Response) {
        if !self.enabled {
            return;
        }
        self.entries.insert(
            key,
            CacheEntry {
                response,
                inserted_at: Instant::now(),
            },
        );
        if self.entries.len() > self.max_entries {
            let removed = self.sweep_expired();
            debug!(
                removed,
                remaining = self.entries.len(),
                cap = self.max_entries,
                "Cache over soft cap, swept expired entries"
            );
        }
    }

    /// Remove every expired entry; returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries
            .retain(|_, e| now.duration_since(e.inserted_at) < self.ttl);
        before.saturating_sub(self.entries.len())
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let mut valid_entries = 0;
        let mut expired_entries = 0;
        for entry in self.entries.iter() {
            if now.duration_since(entry.inserted_at) < self.ttl {
                valid_entries += 1;
            } else {
                expired_entries += 1;
            }
        }
        CacheStats {
            total_entries: valid_entries + expired_entries,
            valid_entries,
            expired_entries,
            ttl: self.ttl.as_secs(),
            enabled: self.enabled,
        }
    }
}

/// Rebuild `value` with object keys inserted in sorted order at every depth.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for k in keys {
                sorted.insert(k.clone(), canonicalize(&map[k]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

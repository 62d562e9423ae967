use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::provider::types::ProviderInitialize;

/// Scope a provider fee quote is valid for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QuoteKey {
    pub did: String,
    pub service_id: String,
    pub consumer: String,
}

impl QuoteKey {
    pub fn new(did: &str, service_id: &str, consumer: &str) -> Self {
        Self {
            did: did.to_string(),
            service_id: service_id.to_string(),
            consumer: consumer.to_lowercase(),
        }
    }
}

struct CachedQuote {
    value: ProviderInitialize,
    cached_at: Instant,
}

/// In-memory cache of provider initialize results.
///
/// An entry is served while it is within the TTL and its fee quote has
/// not passed `valid_until`.
pub struct QuoteCache {
    entries: HashMap<QuoteKey, CachedQuote>,
    ttl: Duration,
}

impl QuoteCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
        }
    }

    pub fn get(&self, key: &QuoteKey) -> Option<ProviderInitialize> {
        self.entries
            .get(key)
            .filter(|entry| Self::is_fresh(entry, self.ttl))
            .map(|entry| entry.value.clone())
    }

    /// Store a quote; entries that can no longer be served are dropped
    /// on the way.
    pub fn set(&mut self, key: QuoteKey, value: ProviderInitialize) {
        self.purge_stale();
        self.entries.insert(
            key,
            CachedQuote {
                value,
                cached_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&mut self, key: &QuoteKey) {
        self.entries.remove(key);
    }

    /// Drop every entry that can no longer be served.
    pub fn purge_stale(&mut self) {
        let ttl = self.ttl;
        self.entries.retain(|_, entry| Self::is_fresh(entry, ttl));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_fresh(entry: &CachedQuote, ttl: Duration) -> bool {
        entry.cached_at.elapsed() <= ttl && !entry.value.provider_fee.is_expired_at(Utc::now())
    }
}

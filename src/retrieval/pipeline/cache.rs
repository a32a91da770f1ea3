//! TTL cache of fused results, keyed by query.

use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::retrieval::core::config::CacheConfig;
use crate::retrieval::fusion::engine::FusionOutcome;

#[derive(Clone)]
struct CacheEntry<T> {
    data: T,
    expires_at: Instant,
}

impl<T: Clone> CacheEntry<T> {
    fn new(data: T, ttl: Duration) -> Self {
        Self {
            data,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Thread-safe cache of fusion outcomes.
pub struct FusionCache {
    config: CacheConfig,
    entries: DashMap<String, CacheEntry<FusionOutcome>>,
}

impl FusionCache {
    /// Create a cache with the given configuration.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: DashMap::new(),
        }
    }

    fn key(query: &str) -> String {
        query.trim().to_string()
    }

    /// Cached outcome for `query`, if present and fresh.
    #[must_use]
    pub fn get(&self, query: &str) -> Option<FusionOutcome> {
        if !self.config.enabled {
            return None;
        }

        let key = Self::key(query);
        self.entries.get(&key).and_then(|entry| {
            if entry.is_expired() {
                drop(entry);
                self.entries.remove(&key);
                None
            } else {
                Some(entry.data.clone())
            }
        })
    }

    /// Cache the outcome for `query`.
    pub fn insert(&self, query: &str, outcome: &FusionOutcome) {
        if !self.config.enabled || self.config.max_entries == 0 {
            return;
        }

        self.enforce_max_entries();

        let ttl = Duration::from_secs(self.config.ttl_seconds);
        self.entries
            .insert(Self::key(query), CacheEntry::new(outcome.clone(), ttl));
    }

    /// Number of cached entries, fresh or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Remove expired entries.
    pub fn cleanup_expired(&self) {
        self.entries.retain(|_, entry| !entry.is_expired());
    }

    /// Make room for one entry, evicting the entries closest to expiry.
    fn enforce_max_entries(&self) {
        if self.entries.len() < self.config.max_entries {
            return;
        }
        self.cleanup_expired();

        let excess = (self.entries.len() + 1).saturating_sub(self.config.max_entries);
        if excess == 0 {
            return;
        }
        let mut by_expiry: Vec<(Instant, String)> = self
            .entries
            .iter()
            .map(|entry| (entry.expires_at, entry.key().clone()))
            .collect();
        by_expiry.sort();
        for (_, key) in by_expiry.into_iter().take(excess) {
            self.entries.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::retrieval::core::candidate::Candidate;
    use crate::retrieval::fusion::metrics::{FusionMetrics, FusionStats, RetrieverMetrics};
    use crate::retrieval::fusion::rrf::FusedResult;
    use crate::retrieval::core::kinds::RetrievalSource;
    use crate::retrieval::testing::sutra;

    fn outcome(doc: &str) -> FusionOutcome {
        let candidate = Candidate::Passage(sutra(doc, 0, "经文"));
        FusionOutcome {
            results: vec![FusedResult {
                key: candidate.dedup_key(),
                candidate,
                score: 0.01,
                sources: BTreeSet::from([RetrievalSource::Semantic]),
            }],
            metrics: FusionMetrics {
                request_id: Uuid::new_v4(),
                started_at: Utc::now(),
                expanded_queries: Vec::new(),
                alias_matches: Vec::new(),
                semantic: RetrieverMetrics::default(),
                fulltext: RetrieverMetrics::default(),
                dictionary: RetrieverMetrics::default(),
                scoped: None,
                fusion: FusionStats::default(),
                failures: Vec::new(),
                total_time_ms: 0,
            },
        }
    }

    fn config(ttl_seconds: u64, max_entries: usize) -> CacheConfig {
        CacheConfig {
            enabled: true,
            ttl_seconds,
            max_entries,
        }
    }

    #[test]
    fn test_cache_roundtrip_trims_query() {
        let cache = FusionCache::new(config(60, 8));
        cache.insert(" 心经 ", &outcome("T08n0251"));

        let cached = cache.get("心经");
        assert_eq!(
            cached.map(|hit| hit.results[0].key.to_string()),
            Some("T08n0251:1:0".to_string())
        );
    }

    #[test]
    fn test_cache_disabled() {
        let cache = FusionCache::new(CacheConfig {
            enabled: false,
            ..config(60, 8)
        });
        cache.insert("心经", &outcome("T08n0251"));
        assert!(cache.get("心经").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_expired_entries_are_not_served() {
        let cache = FusionCache::new(config(0, 8));
        cache.insert("心经", &outcome("T08n0251"));
        assert!(cache.get("心经").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_max_entries_evicts_oldest() {
        let cache = FusionCache::new(config(60, 2));
        cache.insert("一", &outcome("T01"));
        std::thread::sleep(Duration::from_millis(2));
        cache.insert("二", &outcome("T02"));
        std::thread::sleep(Duration::from_millis(2));
        cache.insert("三", &outcome("T03"));

        assert_eq!(cache.len(), 2);
        assert!(cache.get("一").is_none());
        assert!(cache.get("三").is_some());
    }
}

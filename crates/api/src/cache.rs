use dashmap::DashMap;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::CacheConfig;

/// Response cache keyed by the raw query string. The key is hashed, never
/// normalized: "Climate" and "climate " are different entries.
pub struct ResponseCache<V> {
    entries: Arc<DashMap<String, V>>,
    enabled: bool,
    max_entries: usize,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl<V: Clone> ResponseCache<V> {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            enabled: config.enabled,
            max_entries: config.max_entries,
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    pub fn get(&self, query: &str) -> Option<V> {
        if !self.enabled {
            return None;
        }
        let found = self.entries.get(&hash_text(query)).map(|r| r.value().clone());
        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    pub fn set(&self, query: &str, value: V) {
        if !self.enabled {
            return;
        }
        if self.entries.len() >= self.max_entries {
            // Simple eviction: clear 25% when full
            let to_remove: Vec<_> = self
                .entries
                .iter()
                .take((self.max_entries / 4).max(1))
                .map(|r| r.key().clone())
                .collect();
            for key in to_remove {
                self.entries.remove(&key);
            }
        }
        self.entries.insert(hash_text(query), value);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            enabled: self.enabled,
            entries: self.entries.len(),
            max_entries: self.max_entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Serialize)]
pub struct CacheStats {
    pub enabled: bool,
    pub entries: usize,
    pub max_entries: usize,
    pub hits: usize,
    pub misses: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(max_entries: usize) -> ResponseCache<String> {
        ResponseCache::new(&CacheConfig {
            enabled: true,
            max_entries,
        })
    }

    #[test]
    fn test_hit_and_miss() {
        let cache = cache(10);
        cache.set("climate policy", "result".to_string());

        assert_eq!(cache.get("climate policy").as_deref(), Some("result"));
        assert_eq!(cache.get("climate  policy"), None);

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 1));
    }

    #[test]
    fn test_eviction_when_full() {
        let cache = cache(8);
        for i in 0..8 {
            cache.set(&format!("q{i}"), i.to_string());
        }
        cache.set("one more", "x".to_string());

        // A quarter was evicted before the insert
        assert_eq!(cache.stats().entries, 7);
        assert_eq!(cache.get("one more").as_deref(), Some("x"));
    }

    #[test]
    fn test_disabled_cache_stores_nothing() {
        let cache: ResponseCache<String> = ResponseCache::new(&CacheConfig {
            enabled: false,
            max_entries: 10,
        });
        cache.set("q", "v".to_string());

        assert_eq!(cache.get("q"), None);
        assert_eq!(cache.stats().entries, 0);
    }
}

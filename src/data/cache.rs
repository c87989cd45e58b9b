use dashmap::DashMap;
use std::time::{Duration, Instant};

/// In-process layer in front of the summary table, keyed by payload hash.
pub struct SummaryCache {
    cache: DashMap<String, CachedSummary>,
    ttl: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CachedEntry {
    pub id: Option<i64>,
    pub text: String,
    pub source: String,
}

struct CachedSummary {
    entry: CachedEntry,
    timestamp: Instant,
}

impl SummaryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: DashMap::new(),
            ttl,
        }
    }

    pub fn insert(&self, key: String, entry: CachedEntry) {
        self.cache.insert(key, CachedSummary {
            entry,
            timestamp: Instant::now(),
        });
    }

    /// Get entry if not expired (evict on read)
    pub fn get(&self, key: &str) -> Option<CachedEntry> {
        let expired = match self.cache.get(key) {
            Some(cached) if cached.timestamp.elapsed() <= self.ttl => {
                return Some(cached.entry.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            self.cache.remove(key);
        }
        None
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }
}

impl Default for SummaryCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(3600))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn entry(text: &str) -> CachedEntry {
        CachedEntry {
            id: Some(1),
            text: text.to_string(),
            source: "rule_based".to_string(),
        }
    }

    #[test]
    fn test_cache_insert_and_get() {
        let cache = SummaryCache::default();
        cache.insert("abc".to_string(), entry("hello"));

        assert_eq!(cache.get("abc"), Some(entry("hello")));
        assert_eq!(cache.get("missing"), None);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_ttl_expiration() {
        let cache = SummaryCache::new(Duration::from_millis(100));
        cache.insert("abc".to_string(), entry("hello"));

        assert!(cache.get("abc").is_some());

        thread::sleep(Duration::from_millis(200));

        // Should be evicted
        assert_eq!(cache.get("abc"), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_insert_replaces_entry() {
        let cache = SummaryCache::default();
        cache.insert("a".to_string(), entry("1"));
        cache.insert("a".to_string(), entry("2"));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("a"), Some(entry("2")));
    }
}

use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Cached value with its insertion instant.
pub struct CacheEntry<T> {
    pub data: T,
    pub cached_at: Instant,
}

/// TTL cache over a concurrent map. Writers use insert-wins semantics;
/// readers treat expired entries as absent.
pub struct TtlCache<T: Clone> {
    map: DashMap<String, CacheEntry<T>>,
    ttl: Duration,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        TtlCache { map: DashMap::new(), ttl }
    }

    pub fn get(&self, key: &str) -> Option<T> {
        let entry = self.map.get(key)?;
        if entry.cached_at.elapsed() < self.ttl {
            Some(entry.data.clone())
        } else {
            drop(entry);
            self.map.remove(key);
            None
        }
    }

    pub fn put(&self, key: String, value: T) {
        self.map.insert(key, CacheEntry { data: value, cached_at: Instant::now() });
    }

    pub fn invalidate(&self, key: &str) {
        self.map.remove(key);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.map.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_within_ttl_miss_after() {
        let cache = TtlCache::new(Duration::from_millis(50));
        cache.put("AAPL".into(), 42u32);
        assert_eq!(cache.get("AAPL"), Some(42));
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(cache.get("AAPL"), None);
        // Expired entry was evicted on read.
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn invalidate_removes() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.put("600519".into(), "x".to_string());
        cache.invalidate("600519");
        assert_eq!(cache.get("600519"), None);
    }
}

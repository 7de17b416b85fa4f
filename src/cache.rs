//! Response cache consulted by the sources before going to the network
//!
//! Keys are built by each source from every request parameter that changes the
//! response. Past FX observations never change, so ordinary entries are kept until
//! evicted for space. Responses whose window reaches today are stored with
//! [`ResponseCache::put_volatile`] and expire after a TTL.

use crate::config::CacheSettings;
use hashbrown::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Key to blob store shared by all sources
pub trait ResponseCache: Send + Sync {
    fn get(&self, key: &str) -> Option<Vec<u8>>;

    fn put(&self, key: &str, blob: Vec<u8>);

    /// Store a response that may still change upstream
    fn put_volatile(&self, key: &str, blob: Vec<u8>) {
        self.put(key, blob);
    }
}

/// Cache that never stores anything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

impl ResponseCache for NoCache {
    fn get(&self, _key: &str) -> Option<Vec<u8>> {
        None
    }

    fn put(&self, _key: &str, _blob: Vec<u8>) {}
}

#[derive(Debug, Clone)]
struct CacheEntry {
    blob: Vec<u8>,
    inserted_at: Instant,
    ttl: Option<Duration>,
}

impl CacheEntry {
    fn is_valid(&self, now: Instant) -> bool {
        match self.ttl {
            Some(ttl) => now.duration_since(self.inserted_at) < ttl,
            None => true,
        }
    }
}

/// Bounded in-memory cache with TTL on volatile entries
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    volatile_ttl: Duration,
    max_entries: usize,
}

impl MemoryCache {
    pub fn new(volatile_ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            volatile_ttl,
            max_entries: max_entries.max(1),
        }
    }

    pub fn from_settings(settings: &CacheSettings) -> Self {
        Self::new(
            Duration::from_secs(settings.volatile_ttl_secs),
            settings.max_entries,
        )
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn insert(&self, key: &str, blob: Vec<u8>, ttl: Option<Duration>) {
        let now = Instant::now();
        let mut entries = self.lock();

        if !entries.contains_key(key) && entries.len() >= self.max_entries {
            entries.retain(|_, entry| entry.is_valid(now));

            if entries.len() >= self.max_entries {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.inserted_at)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    log::debug!("cache full, evicting {}", oldest);
                    entries.remove(&oldest);
                }
            }
        }

        entries.insert(
            key.to_string(),
            CacheEntry {
                blob,
                inserted_at: now,
                ttl,
            },
        );
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::from_settings(&CacheSettings::default())
    }
}

impl ResponseCache for MemoryCache {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        let now = Instant::now();
        let mut entries = self.lock();

        let valid = entries.get(key).map(|entry| entry.is_valid(now))?;
        if valid {
            entries.get(key).map(|entry| entry.blob.clone())
        } else {
            log::debug!("cache entry expired: {}", key);
            entries.remove(key);
            None
        }
    }

    fn put(&self, key: &str, blob: Vec<u8>) {
        self.insert(key, blob, None);
    }

    fn put_volatile(&self, key: &str, blob: Vec<u8>) {
        self.insert(key, blob, Some(self.volatile_ttl));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_insert_and_get() {
        let cache = MemoryCache::default();
        cache.put("k", b"payload".to_vec());
        assert_eq!(cache.get("k").unwrap(), b"payload".to_vec());
        assert!(cache.get("missing").is_none());
    }

    #[test]
    fn test_volatile_entries_expire() {
        let cache = MemoryCache::new(Duration::from_millis(30), 10);
        cache.put_volatile("today", b"a".to_vec());
        cache.put("past", b"b".to_vec());

        assert!(cache.get("today").is_some());
        sleep(Duration::from_millis(50));

        assert!(cache.get("today").is_none());
        assert!(cache.get("past").is_some());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_bounded_size_evicts_oldest() {
        let cache = MemoryCache::new(Duration::from_secs(60), 2);
        cache.put("first", vec![1]);
        sleep(Duration::from_millis(2));
        cache.put("second", vec![2]);
        sleep(Duration::from_millis(2));
        cache.put("third", vec![3]);

        assert_eq!(cache.len(), 2);
        assert!(cache.get("first").is_none());
        assert!(cache.get("third").is_some());
    }

    #[test]
    fn test_full_cache_drops_expired_before_oldest() {
        let cache = MemoryCache::new(Duration::from_millis(5), 2);
        cache.put("stable", vec![1]);
        sleep(Duration::from_millis(2));
        cache.put_volatile("live", vec![2]);
        sleep(Duration::from_millis(20));
        cache.put("next", vec![3]);

        assert_eq!(cache.len(), 2);
        assert!(cache.get("stable").is_some());
        assert!(cache.get("next").is_some());
    }

    #[test]
    fn test_overwrite_does_not_evict() {
        let cache = MemoryCache::new(Duration::from_secs(60), 2);
        cache.put("a", vec![1]);
        cache.put("b", vec![2]);
        cache.put("a", vec![3]);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a").unwrap(), vec![3]);
        assert!(cache.get("b").is_some());
    }

    #[test]
    fn test_no_cache() {
        let cache = NoCache;
        cache.put("k", vec![1]);
        assert!(cache.get("k").is_none());
    }
}

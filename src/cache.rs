use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct CacheEntry<K, V> {
    pub key: K,
    pub data: V,
    pub fetched_at: Instant,
}

/// Cloning yields another handle onto the same store.
#[derive(Clone)]
pub struct TtlCache<K, V> {
    entries: Arc<RwLock<HashMap<K, CacheEntry<K, V>>>>,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    pub fn get(&self, key: &K) -> Option<CacheEntry<K, V>> {
        self.entries.read().get(key).cloned()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.read().contains_key(key)
    }

    // fetched_at never moves backwards for a key
    pub fn set(&self, key: K, data: V) {
        let mut entries = self.entries.write();
        let now = Instant::now();
        let fetched_at = match entries.get(&key) {
            Some(previous) if previous.fetched_at > now => previous.fetched_at,
            _ => now,
        };
        entries.insert(
            key.clone(),
            CacheEntry {
                key,
                data,
                fetched_at,
            },
        );
    }

    pub fn is_fresh(&self, entry: &CacheEntry<K, V>) -> bool {
        entry.fetched_at.elapsed() < self.ttl
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_is_not_an_error() {
        let cache: TtlCache<&str, Vec<u32>> = TtlCache::new(Duration::from_secs(300));
        assert!(cache.get(&"services").is_none());
        assert!(!cache.contains(&"services"));
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn entries_go_stale_after_ttl() {
        let cache = TtlCache::new(Duration::from_secs(300));
        cache.set("services", vec![1, 2]);

        let entry = cache.get(&"services").unwrap();
        assert!(cache.is_fresh(&entry));

        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(cache.is_fresh(&entry));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(!cache.is_fresh(&entry));
    }

    #[tokio::test(start_paused = true)]
    async fn set_overwrites_and_advances_timestamp() {
        let cache = TtlCache::new(Duration::from_secs(300));
        cache.set("rentals", vec![1]);
        let first = cache.get(&"rentals").unwrap();

        tokio::time::advance(Duration::from_secs(10)).await;
        cache.set("rentals", vec![2, 3]);
        let second = cache.get(&"rentals").unwrap();

        assert_eq!(second.data, vec![2, 3]);
        assert!(second.fetched_at >= first.fetched_at);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn zero_ttl_is_always_stale() {
        let cache = TtlCache::new(Duration::ZERO);
        cache.set(1_u8, "x");
        let entry = cache.get(&1).unwrap();
        assert!(!cache.is_fresh(&entry));
    }
}

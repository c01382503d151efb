//! Size-bounded in-memory cache.
//!
//! Thread-safe, suitable for sharing across tasks via `Arc`. Entries are
//! evicted least-recently-used once the configured capacity is exceeded, so
//! long-running crawls cannot grow resident memory without bound. Eviction
//! policy lives entirely behind `get`/`add`.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

use tokio::sync::Mutex;

struct Inner<K, V> {
    map: HashMap<K, V>,
    // Recency order, least recently used at the front.
    order: VecDeque<K>,
}

/// A bounded LRU cache keyed by `K`.
pub struct BoundedCache<K, V> {
    inner: Mutex<Inner<K, V>>,
    capacity: usize,
}

impl<K, V> BoundedCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a cache holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner { map: HashMap::new(), order: VecDeque::new() }),
            capacity: capacity.max(1),
        }
    }

    /// Look up `key`, marking it most recently used on a hit.
    pub async fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock().await;
        let value = inner.map.get(key).cloned()?;
        touch(&mut inner.order, key);
        Some(value)
    }

    /// Insert or replace `key`, evicting the least recently used entry when
    /// the cache is full.
    pub async fn add(&self, key: K, value: V) {
        let mut inner = self.inner.lock().await;
        if inner.map.insert(key.clone(), value).is_some() {
            touch(&mut inner.order, &key);
            return;
        }
        inner.order.push_back(key);
        if inner.map.len() > self.capacity {
            if let Some(evicted) = inner.order.pop_front() {
                inner.map.remove(&evicted);
            }
        }
    }

    /// Number of cached entries.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.map.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn touch<K: Eq + Clone>(order: &mut VecDeque<K>, key: &K) {
    if let Some(pos) = order.iter().position(|k| k == key) {
        order.remove(pos);
        order.push_back(key.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::BoundedCache;

    #[tokio::test]
    async fn add_and_get() {
        let cache = BoundedCache::new(4);
        cache.add("a", 1).await;
        assert_eq!(cache.get(&"a").await, Some(1));
        assert_eq!(cache.get(&"b").await, None);
    }

    #[tokio::test]
    async fn evicts_least_recently_used() {
        let cache = BoundedCache::new(2);
        cache.add("a", 1).await;
        cache.add("b", 2).await;
        // Touch "a" so "b" becomes the eviction candidate.
        cache.get(&"a").await;
        cache.add("c", 3).await;
        assert_eq!(cache.get(&"a").await, Some(1));
        assert_eq!(cache.get(&"b").await, None);
        assert_eq!(cache.get(&"c").await, Some(3));
        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test]
    async fn replacing_does_not_evict() {
        let cache = BoundedCache::new(2);
        cache.add("a", 1).await;
        cache.add("b", 2).await;
        cache.add("a", 10).await;
        assert_eq!(cache.get(&"a").await, Some(10));
        assert_eq!(cache.get(&"b").await, Some(2));
    }
}

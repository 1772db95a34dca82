//! Bounded read-through caching.
//!
//! # Purpose
//! [`ReadThroughCache`] fronts a [`CacheLoader`] with a bounded in-process
//! cache. Callers only ever call [`ReadThroughCache::get`]; the eviction policy
//! is a type parameter implementing [`CachePolicy`] and can be swapped without
//! touching them.
//!
//! # Key invariants
//! - Only successful loads are stored. A failed load (including not-found) is
//!   returned to the caller and leaves the cache untouched.
//! - A policy never holds more than its capacity.
//! - Entries are never invalidated explicitly; they live until evicted.
//!
//! # Concurrency
//! The policy sits behind a `parking_lot::Mutex` that is never held across an
//! `.await`. Two concurrent misses for the same key may both hit the loader;
//! the later fill wins, which is harmless because entries are snapshots.
use async_trait::async_trait;
use indexmap::{IndexMap, IndexSet};
use parking_lot::Mutex;
use std::hash::Hash;

/// Eviction policy used by [`ReadThroughCache`].
pub trait CachePolicy<K, V>: Send {
    fn get(&mut self, key: &K) -> Option<V>;
    fn insert(&mut self, key: K, value: V);
    fn len(&self) -> usize;
    fn capacity(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Source of values for a [`ReadThroughCache`].
#[async_trait]
pub trait CacheLoader<K, V>: Send + Sync {
    type Error: Send;

    async fn load(&self, key: &K) -> Result<V, Self::Error>;
}

/// Adaptive replacement cache.
///
/// Resident entries are split between `recent` (seen once) and `frequent`
/// (seen at least twice). Evicted keys are remembered in two ghost lists of
/// the same shape; a later miss on a ghost key shifts `target`, the share of
/// capacity given to `recent`, toward whichever list would have kept it.
/// Every list is ordered least-recently-used first.
#[derive(Debug)]
pub struct AdaptiveCache<K, V> {
    capacity: usize,
    target: usize,
    recent: IndexMap<K, V>,
    frequent: IndexMap<K, V>,
    recent_ghosts: IndexSet<K>,
    frequent_ghosts: IndexSet<K>,
}

impl<K: Hash + Eq + Clone, V: Clone> AdaptiveCache<K, V> {
    /// A zero capacity stores nothing.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            target: 0,
            recent: IndexMap::with_capacity(capacity),
            frequent: IndexMap::with_capacity(capacity),
            recent_ghosts: IndexSet::new(),
            frequent_ghosts: IndexSet::new(),
        }
    }

    pub fn contains(&self, key: &K) -> bool {
        self.recent.contains_key(key) || self.frequent.contains_key(key)
    }

    /// Evict one resident entry into its ghost list.
    fn replace(&mut self, incoming_was_frequent_ghost: bool) {
        let take_recent = !self.recent.is_empty()
            && (self.recent.len() > self.target
                || (incoming_was_frequent_ghost && self.recent.len() == self.target)
                || self.frequent.is_empty());
        if take_recent {
            if let Some((key, _)) = self.recent.shift_remove_index(0) {
                self.recent_ghosts.insert(key);
            }
        } else if let Some((key, _)) = self.frequent.shift_remove_index(0) {
            self.frequent_ghosts.insert(key);
        }
    }

    fn resident(&self) -> usize {
        self.recent.len() + self.frequent.len()
    }

    fn make_room(&mut self, incoming_was_frequent_ghost: bool) {
        if self.resident() >= self.capacity {
            self.replace(incoming_was_frequent_ghost);
        }
    }
}

impl<K, V> CachePolicy<K, V> for AdaptiveCache<K, V>
where
    K: Hash + Eq + Clone + Send,
    V: Clone + Send,
{
    fn get(&mut self, key: &K) -> Option<V> {
        if let Some(value) = self.recent.shift_remove(key) {
            self.frequent.insert(key.clone(), value.clone());
            return Some(value);
        }
        let value = self.frequent.shift_remove(key)?;
        self.frequent.insert(key.clone(), value.clone());
        Some(value)
    }

    fn insert(&mut self, key: K, value: V) {
        if self.capacity == 0 {
            return;
        }
        if self.recent.shift_remove(&key).is_some() || self.frequent.shift_remove(&key).is_some() {
            self.frequent.insert(key, value);
            return;
        }

        if self.recent_ghosts.contains(&key) {
            let step = (self.frequent_ghosts.len() / self.recent_ghosts.len()).max(1);
            self.target = (self.target + step).min(self.capacity);
            self.recent_ghosts.shift_remove(&key);
            self.make_room(false);
            self.frequent.insert(key, value);
            return;
        }

        if self.frequent_ghosts.contains(&key) {
            let step = (self.recent_ghosts.len() / self.frequent_ghosts.len()).max(1);
            self.target = self.target.saturating_sub(step);
            self.frequent_ghosts.shift_remove(&key);
            self.make_room(true);
            self.frequent.insert(key, value);
            return;
        }

        if self.recent.len() + self.recent_ghosts.len() >= self.capacity {
            if self.recent.len() < self.capacity {
                self.recent_ghosts.shift_remove_index(0);
                self.make_room(false);
            } else {
                self.recent.shift_remove_index(0);
            }
        } else {
            let total = self.resident() + self.recent_ghosts.len() + self.frequent_ghosts.len();
            if total >= self.capacity {
                if total >= 2 * self.capacity {
                    self.frequent_ghosts.shift_remove_index(0);
                }
                self.make_room(false);
            }
        }
        self.recent.insert(key, value);
    }

    fn len(&self) -> usize {
        self.resident()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Read-through cache named for metrics (`cache` label).
pub struct ReadThroughCache<K, V, L, P = AdaptiveCache<K, V>> {
    name: &'static str,
    loader: L,
    policy: Mutex<P>,
    _values: std::marker::PhantomData<fn(K) -> V>,
}

impl<K, V, L> ReadThroughCache<K, V, L>
where
    K: Hash + Eq + Clone + Send + Sync,
    V: Clone + Send,
    L: CacheLoader<K, V>,
{
    pub fn adaptive(name: &'static str, capacity: usize, loader: L) -> Self {
        Self::with_policy(name, loader, AdaptiveCache::new(capacity))
    }
}

impl<K, V, L, P> ReadThroughCache<K, V, L, P>
where
    K: Sync + Send,
    V: Clone + Send,
    L: CacheLoader<K, V>,
    P: CachePolicy<K, V>,
{
    pub fn with_policy(name: &'static str, loader: L, policy: P) -> Self {
        Self {
            name,
            loader,
            policy: Mutex::new(policy),
            _values: std::marker::PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Cached value for `key`, loading and storing it on a miss.
    pub async fn get(&self, key: K) -> Result<V, L::Error> {
        if let Some(value) = self.peek(&key) {
            metrics::counter!("dispatch_cache_lookups_total", "cache" => self.name, "result" => "hit")
                .increment(1);
            return Ok(value);
        }
        metrics::counter!("dispatch_cache_lookups_total", "cache" => self.name, "result" => "miss")
            .increment(1);
        let value = self.loader.load(&key).await?;
        self.policy.lock().insert(key, value.clone());
        Ok(value)
    }

    /// Cached value for `key` without consulting the loader.
    pub fn peek(&self, key: &K) -> Option<V> {
        self.policy.lock().get(key)
    }

    pub fn len(&self) -> usize {
        self.policy.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.policy.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.policy.lock().capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn adaptive_cache_never_exceeds_capacity() {
        let mut cache = AdaptiveCache::new(4);
        for round in 0..3 {
            for key in 0..20u32 {
                cache.insert(key, key * round);
                assert!(cache.len() <= 4);
                if key % 3 == 0 {
                    cache.get(&key);
                }
            }
        }
        assert_eq!(cache.len(), 4);
    }

    #[test]
    fn frequently_used_entry_survives_a_scan() {
        let mut cache = AdaptiveCache::new(3);
        cache.insert("hot", 1);
        assert_eq!(cache.get(&"hot"), Some(1));
        assert_eq!(cache.get(&"hot"), Some(1));
        for key in ["a", "b", "c", "d", "e", "f"] {
            cache.insert(key, 0);
        }
        assert_eq!(cache.get(&"hot"), Some(1));
    }

    #[test]
    fn reinserting_a_resident_key_updates_it() {
        let mut cache = AdaptiveCache::new(2);
        cache.insert(1, "one");
        cache.insert(1, "uno");
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&1), Some("uno"));
    }

    #[test]
    fn ghost_hit_readmits_into_frequent_list() {
        let mut cache = AdaptiveCache::new(2);
        cache.insert(1, 1);
        cache.get(&1);
        cache.insert(2, 2);
        cache.insert(3, 3);
        assert!(!cache.contains(&2));
        assert!(cache.recent_ghosts.contains(&2));

        cache.insert(2, 20);
        assert!(cache.frequent.contains_key(&2));
        assert_eq!(cache.target, 1);
        assert!(cache.len() <= 2);
        assert_eq!(cache.get(&2), Some(20));
    }

    #[test]
    fn zero_capacity_stores_nothing() {
        let mut cache = AdaptiveCache::new(0);
        cache.insert(1, 1);
        assert!(cache.is_empty());
        assert_eq!(cache.get(&1), None);
    }

    struct CountingLoader {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CacheLoader<u32, String> for CountingLoader {
        type Error = String;

        async fn load(&self, key: &u32) -> Result<String, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if *key == 0 {
                return Err("missing".to_string());
            }
            Ok(format!("value-{key}"))
        }
    }

    #[tokio::test]
    async fn hit_after_miss_skips_loader() {
        let cache = ReadThroughCache::adaptive(
            "test",
            8,
            CountingLoader {
                calls: AtomicUsize::new(0),
            },
        );
        assert_eq!(cache.get(7).await.expect("load"), "value-7");
        assert_eq!(cache.get(7).await.expect("hit"), "value-7");
        assert_eq!(cache.loader.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn failed_loads_are_not_cached() {
        let cache = ReadThroughCache::adaptive(
            "test",
            8,
            CountingLoader {
                calls: AtomicUsize::new(0),
            },
        );
        assert!(cache.get(0).await.is_err());
        assert!(cache.get(0).await.is_err());
        assert_eq!(cache.loader.calls.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty());
    }
}

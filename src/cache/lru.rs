//! Bounded least-recently-used cache
//!
//! Entries live in a hash map next to their recency stamp; a second ordered
//! map from stamp to key gives the eviction candidate in O(log n). Not
//! synchronized: one instance per single-threaded consumer.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

struct CacheEntry<V> {
    value: V,
    recency: u64,
}

/// Fixed-capacity cache evicting the least recently used key on overflow.
///
/// A capacity of zero disables caching: every lookup calls the factory.
pub struct LruCache<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    order: BTreeMap<u64, K>,
    max_size: usize,
    next_recency: u64,
}

impl<K, V> LruCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    pub fn new(max_size: usize) -> Self {
        LruCache {
            entries: HashMap::new(),
            order: BTreeMap::new(),
            max_size,
            next_recency: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Existence check that leaves recency untouched
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Return the cached value for `key`, computing and storing it on a miss
    pub fn get_or_add<F>(&mut self, key: K, factory: F) -> V
    where
        F: FnOnce(&K) -> V,
    {
        match self.try_get_or_add(key, |k| Ok::<V, std::convert::Infallible>(factory(k))) {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// Like [`get_or_add`](Self::get_or_add) but with a fallible factory.
    ///
    /// A factory error is returned as-is and nothing is cached.
    pub fn try_get_or_add<F, E>(&mut self, key: K, factory: F) -> Result<V, E>
    where
        F: FnOnce(&K) -> Result<V, E>,
    {
        if self.max_size == 0 {
            return factory(&key);
        }

        if let Some(value) = self.touch(&key) {
            return Ok(value);
        }

        let value = factory(&key)?;
        if self.entries.len() >= self.max_size {
            self.evict_oldest();
        }

        let recency = self.bump();
        self.order.insert(recency, key.clone());
        self.entries.insert(
            key,
            CacheEntry {
                value: value.clone(),
                recency,
            },
        );
        Ok(value)
    }

    fn touch(&mut self, key: &K) -> Option<V> {
        let recency = self.bump();
        let entry = self.entries.get_mut(key)?;
        self.order.remove(&entry.recency);
        entry.recency = recency;
        self.order.insert(recency, key.clone());
        Some(entry.value.clone())
    }

    fn evict_oldest(&mut self) {
        if let Some((_, key)) = self.order.pop_first() {
            self.entries.remove(&key);
        }
    }

    fn bump(&mut self) -> u64 {
        self.next_recency += 1;
        self.next_recency
    }
}

//! Display labels for dimension keys
//!
//! Label columns are filled after rows are deduplicated, on the single thread
//! that assembles the final tables, so each resolver gets one LRU cache.

use crate::cache::lru::LruCache;
use crate::error::{ExtractError, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Resolves the label for a key. A missing label is an error, never a silent null.
pub trait LabelResolver: Send + Sync {
    fn resolve(&self, key: &str) -> Result<String>;
}

/// Dictionary-backed resolver, typically loaded from job configuration
#[derive(Debug, Clone, Default)]
pub struct MapLabelResolver {
    name: String,
    labels: HashMap<String, String>,
}

impl MapLabelResolver {
    pub fn new(name: impl Into<String>, labels: HashMap<String, String>) -> Self {
        MapLabelResolver {
            name: name.into(),
            labels,
        }
    }
}

impl LabelResolver for MapLabelResolver {
    fn resolve(&self, key: &str) -> Result<String> {
        self.labels
            .get(key)
            .cloned()
            .ok_or_else(|| ExtractError::LabelNotFound {
                resolver: self.name.clone(),
                key: key.to_string(),
            })
    }
}

/// A resolver fronted by an LRU cache of its answers
pub struct CachedLabelResolver {
    inner: Arc<dyn LabelResolver>,
    cache: LruCache<String, String>,
}

impl CachedLabelResolver {
    pub fn new(inner: Arc<dyn LabelResolver>, max_size: usize) -> Self {
        CachedLabelResolver {
            inner,
            cache: LruCache::new(max_size),
        }
    }

    pub fn resolve(&mut self, key: &str) -> Result<String> {
        let inner = &self.inner;
        self.cache
            .try_get_or_add(key.to_string(), |k| inner.resolve(k))
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

/// Named resolvers, each with its own cache
pub struct LabelSet {
    resolvers: HashMap<String, CachedLabelResolver>,
}

impl LabelSet {
    pub fn new(resolvers: &HashMap<String, Arc<dyn LabelResolver>>, max_size: usize) -> Self {
        LabelSet {
            resolvers: resolvers
                .iter()
                .map(|(name, r)| (name.clone(), CachedLabelResolver::new(r.clone(), max_size)))
                .collect(),
        }
    }

    pub fn contains(&self, resolver: &str) -> bool {
        self.resolvers.contains_key(resolver)
    }

    pub fn resolve(&mut self, resolver: &str, key: &str) -> Result<String> {
        let Some(cached) = self.resolvers.get_mut(resolver) else {
            return Err(ExtractError::config(format!(
                "unknown label resolver '{}'",
                resolver
            )));
        };
        cached.resolve(key)
    }
}

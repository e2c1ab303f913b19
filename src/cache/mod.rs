//! Bounded caching and label resolution

pub mod labels;
pub mod lru;

pub use labels::{CachedLabelResolver, LabelResolver, LabelSet, MapLabelResolver};
pub use lru::LruCache;

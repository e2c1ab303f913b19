//! Job configuration as read from JSON

use crate::error::{ExtractError, Result};
use crate::keys::KeyAlgorithm;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Threading, batching and keying knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Threads reading source partitions
    pub loader_threads: usize,

    /// Threads turning visits into rows
    pub processing_threads: usize,

    /// Visits buffered between loaders and workers
    pub queue_capacity: usize,

    /// Visits a worker processes between flushes of its builders
    pub batch_size: usize,

    pub key_algorithm: KeyAlgorithm,

    /// Entries per label resolver cache; 0 disables caching
    pub label_cache_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            loader_threads: 1,
            processing_threads: 2,
            queue_capacity: 1024,
            batch_size: 10_000,
            key_algorithm: KeyAlgorithm::Fnv1a32,
            label_cache_size: 10_000,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("loader_threads", self.loader_threads),
            ("processing_threads", self.processing_threads),
            ("queue_capacity", self.queue_capacity),
            ("batch_size", self.batch_size),
        ] {
            if value == 0 {
                return Err(ExtractError::config(format!("{} must be at least 1", name)));
            }
        }
        Ok(())
    }
}

/// A registry component: `type` picks the constructor, every other key is a
/// parameter for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentConfig {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(flatten)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

/// Gap filling for a table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SequenceConfig {
    /// One row per calendar day, read from `<prefix>Date`
    Date {
        #[serde(default)]
        prefix: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableConfig {
    pub name: String,

    /// Applied in order; each one fans the rows of the previous out further
    #[serde(default)]
    pub splitters: Vec<ComponentConfig>,

    pub fields: Vec<ComponentConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<SequenceConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub filters: Vec<ComponentConfig>,

    pub tables: Vec<TableConfig>,

    /// Label resolvers by name, each a key to label map
    #[serde(default)]
    pub labels: BTreeMap<String, HashMap<String, String>>,
}

impl JobConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ExtractError::config(format!("invalid job: {}", e)))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
            .map_err(|e| ExtractError::config(format!("{}: {}", path.display(), e)))
    }
}

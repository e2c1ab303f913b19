//! Job configuration, component registry and the threaded runner

pub mod config;
pub mod job;
pub mod registry;
pub mod runner;

pub use config::{ComponentConfig, JobConfig, PipelineConfig, SequenceConfig, TableConfig};
pub use job::{Job, TableSpec};
pub use registry::{parse_params, Params, Registry};
pub use runner::{CancellationToken, Checkpoint, CheckpointHook, JobOutput, Pipeline, RunStatus};

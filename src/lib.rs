//! # xtable - Visitor Analytics Extraction
//!
//! Turns visit records (a visit has ordered pages, each page has ordered
//! events) into aggregated tables of dimensions and facts, ready for a
//! relational or OLAP exporter.
//!
//! ## Modules
//!
//! - **scope**: the context chain a row is built from
//! - **split**: fan-out of one visit into several row-producing scopes
//! - **table**: schemas, field mappers and the deduplicating builders
//! - **keys**: surrogate-key hashing over dimension values
//! - **cache**: bounded LRU cache and label resolution
//! - **source**: visit sources and filters
//! - **pipeline**: job configuration, component registry, threaded runner
//! - **export**: table sinks
//!
//! ## Quick Start
//!
//! ```rust
//! use xtable::pipeline::{CancellationToken, JobConfig, Pipeline, Registry};
//! use xtable::source::MemorySource;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = JobConfig::from_json(r#"{
//!     "tables": [{
//!         "name": "Pages",
//!         "splitters": [{"type": "pages"}],
//!         "fields": [
//!             {"type": "path", "name": "Url", "path": "page.url", "role": "dimension"},
//!             {"type": "path", "name": "Views", "path": "count", "role": "fact"}
//!         ]
//!     }]
//! }"#)?;
//!
//! let pipeline = Pipeline::new(Registry::with_defaults().build(&config)?)?;
//! let mut source = MemorySource::new(Vec::new());
//! let output = pipeline.run(&mut source, &CancellationToken::new())?;
//!
//! assert_eq!(output.tables[0].name(), "Pages");
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use std::io::BufRead;

pub mod cache;
pub mod error;
pub mod export;
pub mod keys;
pub mod pipeline;
pub mod scope;
pub mod source;
pub mod split;
pub mod table;
pub mod types;
pub mod value;

// Re-export commonly used types for convenience
pub use error::ExtractError;
pub use export::{JsonLinesSink, SingleSink, TableSink};
pub use pipeline::{
    CancellationToken, Job, JobConfig, JobOutput, Pipeline, PipelineConfig, Registry, RunStatus,
};
pub use scope::{Context as ScopeContext, ProcessingScope};
pub use source::{DataSource, Filter, JsonLinesSource, MemorySource};
pub use table::{Field, FieldType, Row, TableData, TableSchema};
pub use types::{Page, PageEvent, Visit, VisitRecord};
pub use value::{Value, ValueType};

/// Main entry point: run `job` over newline-delimited visits from `reader`
/// and write every table to `sink`. Lines that do not parse are skipped and
/// counted in [`JobOutput::skipped`].
pub fn extract_json_lines<R: BufRead>(
    reader: R,
    job: &JobConfig,
    sink: &mut dyn TableSink,
) -> Result<JobOutput> {
    let job = Registry::with_defaults().build(job).context("Failed to build job")?;
    let pipeline = Pipeline::new(job)?;

    let (visits, skipped) =
        source::json_lines::read_visits(reader, "input").context("Failed to read visits")?;

    let mut source = MemorySource::new(visits);
    let mut output = pipeline
        .run(&mut source, &CancellationToken::new())
        .context("Extraction failed")?;
    output.skipped += skipped;

    for table in &output.tables {
        sink.write_table(table)
            .with_context(|| format!("Failed to write table {}", table.name()))?;
    }
    sink.flush().context("Failed to flush sink")?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures::{page, visit};

    #[test]
    fn test_basic_extraction() {
        let input: String = [
            visit(1, 1, vec![page("A", &["goal"]), page("B", &[])]),
            visit(2, 2, vec![page("A", &[])]),
        ]
        .into_iter()
        .map(|v| serde_json::to_string(&VisitRecord::from(v)).unwrap() + "\n")
        .collect();

        let job = JobConfig::from_json(
            r#"{"tables": [{
                "name": "Pages",
                "splitters": [{"type": "pages"}],
                "fields": [
                    {"type": "path", "name": "Item", "path": "page.item_id", "role": "dimension"},
                    {"type": "path", "name": "Views", "path": "count", "role": "fact"}
                ]
            }]}"#,
        )
        .unwrap();

        let mut buffer = Vec::new();
        let output = {
            let mut sink = SingleSink::new(&mut buffer);
            extract_json_lines(input.as_bytes(), &job, &mut sink).unwrap()
        };

        assert_eq!(output.records, 2);
        assert_eq!(output.skipped, 0);
        let pages = output.table("Pages").unwrap();
        assert_eq!(pages.rows.len(), 2);
        assert_eq!(String::from_utf8(buffer).unwrap().lines().count(), 2);
    }

    #[test]
    fn test_bad_field_path_fails_before_reading() {
        let job = JobConfig::from_json(
            r#"{"tables": [{
                "name": "Pages",
                "fields": [{"type": "path", "name": "Value", "path": "page.value", "role": "fact"}]
            }]}"#,
        )
        .unwrap();

        let mut sink = SingleSink::new(Vec::new());
        let err = extract_json_lines("not even json\n".as_bytes(), &job, &mut sink).unwrap_err();
        assert!(format!("{:#}", err).contains("unknown field 'value' on 'page'"));
        assert!(err.to_string().contains("Failed to build job"));
    }

    #[test]
    fn test_malformed_line_does_not_abort() {
        let record = VisitRecord::from(visit(1, 1, vec![page("A", &[])]));
        let good = serde_json::to_string(&record).unwrap();
        let input = format!("{}\n{{\"id\": 3\n{}\n", good, good);

        let job = JobConfig::from_json(
            r#"{"tables": [{
                "name": "Sites",
                "fields": [
                    {"type": "path", "name": "Site", "path": "visit.site", "role": "dimension"},
                    {"type": "path", "name": "Visits", "path": "count", "role": "fact"}
                ]
            }]}"#,
        )
        .unwrap();

        let mut sink = SingleSink::new(Vec::new());
        let output = extract_json_lines(input.as_bytes(), &job, &mut sink).unwrap();
        assert_eq!(output.records, 2);
        assert_eq!(output.skipped, 1);
        assert_eq!(output.table("Sites").unwrap().rows[0].values[1], Value::Int(2));
    }
}

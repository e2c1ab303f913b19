//! xtable-run: Extract visit records into aggregated tables
//!
//! Usage:
//!   # JSON array of visits, tables to stdout
//!   xtable-run --job job.json visits.json
//!
//!   # NDJSON from stdin, one .jsonl per table
//!   cat visits.jsonl | xtable-run --job job.json --ndjson --output-dir ./tables
//!
//!   # Incremental update over visits that ended in a window
//!   xtable-run --job job.json --ndjson visits.jsonl \
//!       --update-start 2024-03-01T00:00:00 --update-end 2024-03-02T00:00:00

// Use MiMalloc allocator for better performance (recommended by simd-json)
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{bail, Context, Result};
use chrono::NaiveDateTime;
use clap::Parser;
use std::fs::File;
use std::io::{BufReader, Read};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use xtable::export::{JsonLinesSink, SingleSink, TableSink};
use xtable::pipeline::{CancellationToken, JobConfig, Pipeline, Registry, RunStatus};
use xtable::source::json_lines::read_visits;
use xtable::source::{DataSource, JsonLinesSource, MemorySource};
use xtable::types::{Visit, VisitRecord};

#[derive(Parser, Debug)]
#[command(name = "xtable-run")]
#[command(about = "Extract visit records into aggregated tables", long_about = None)]
struct Args {
    /// Input file (use stdin if omitted)
    #[arg(value_name = "FILE")]
    input: Option<String>,

    /// Job definition (tables, filters, labels, pipeline settings)
    #[arg(long, value_name = "JOB")]
    job: String,

    /// Process newline-delimited JSON (one visit per line)
    #[arg(long)]
    ndjson: bool,

    /// Output directory for one .jsonl file per table
    /// If omitted, writes to stdout as a single stream tagged with the table name
    #[arg(long, short = 'o')]
    output_dir: Option<String>,

    /// Processing threads
    #[arg(long)]
    workers: Option<usize>,

    /// Loader threads (NDJSON files only)
    #[arg(long)]
    loaders: Option<usize>,

    /// Bounded queue size between loaders and workers
    #[arg(long)]
    queue: Option<usize>,

    /// Visits per worker flush
    #[arg(long)]
    batch: Option<usize>,

    /// Only visits whose last activity is at or after this time
    #[arg(long, value_parser = parse_timestamp, requires = "update_end")]
    update_start: Option<NaiveDateTime>,

    /// Only visits whose last activity is before this time
    #[arg(long, value_parser = parse_timestamp, requires = "update_start")]
    update_end: Option<NaiveDateTime>,
}

fn parse_timestamp(s: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = JobConfig::from_file(&args.job).context("Failed to load job")?;
    if let Some(workers) = args.workers {
        config.pipeline.processing_threads = workers;
    }
    if let Some(loaders) = args.loaders {
        config.pipeline.loader_threads = loaders;
    }
    if let Some(queue) = args.queue {
        config.pipeline.queue_capacity = queue;
    }
    if let Some(batch) = args.batch {
        config.pipeline.batch_size = batch;
    }

    let job = Registry::with_defaults().build(&config).context("Invalid job")?;
    let pipeline = Pipeline::new(job)?;

    let mut source = open_source(args.input.as_deref(), args.ndjson)?;
    if let (Some(start), Some(end)) = (args.update_start, args.update_end) {
        if start >= end {
            bail!("--update-start must be before --update-end");
        }
        source.apply_update_filter(start, end);
    }

    let output = pipeline
        .run(source.as_mut(), &CancellationToken::new())
        .context("Extraction failed")?;
    if output.skipped > 0 {
        warn!(skipped = output.skipped, "malformed records were skipped");
    }
    if output.status == RunStatus::Cancelled {
        bail!("extraction was cancelled");
    }

    let mut sink: Box<dyn TableSink> = match &args.output_dir {
        Some(dir) => {
            Box::new(JsonLinesSink::new(dir).context("Failed to create output directory")?)
        }
        None => Box::new(SingleSink::new(std::io::stdout().lock())),
    };
    for table in &output.tables {
        sink.write_table(table)
            .with_context(|| format!("Failed to write table {}", table.name()))?;
        info!(table = table.name(), rows = table.rows.len(), "table written");
    }
    sink.flush()?;

    Ok(())
}

/// NDJSON files stream through a partitioned source; everything else is read
/// into memory, trying SIMD parsing of a JSON array first
fn open_source(input: Option<&str>, ndjson: bool) -> Result<Box<dyn DataSource>> {
    if let (Some(path), true) = (input, ndjson) {
        return Ok(Box::new(JsonLinesSource::new(path)));
    }

    let reader: Box<dyn Read> = match input {
        Some(path) => {
            let file = File::open(path).with_context(|| format!("Failed to open {}", path))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(std::io::stdin()),
    };
    Ok(Box::new(MemorySource::new(load_visits(reader, ndjson)?)))
}

fn load_visits(reader: Box<dyn Read>, ndjson: bool) -> Result<Vec<Visit>> {
    let mut content = Vec::new();
    let mut buf_reader = BufReader::new(reader);
    buf_reader.read_to_end(&mut content)?;

    if !ndjson {
        // Fast path: JSON array with SIMD
        match simd_json::serde::from_slice::<Vec<VisitRecord>>(&mut content.clone()) {
            Ok(records) => return Ok(records.into_iter().map(Visit::from).collect()),
            Err(e) => {
                tracing::debug!(error = %e, "not a JSON array of visits, reading as NDJSON");
            }
        }
    }

    // Fallback for NDJSON
    let (visits, skipped) = read_visits(content.as_slice(), "input")?;
    if skipped > 0 {
        warn!(skipped, "malformed visits were skipped");
    }
    Ok(visits)
}

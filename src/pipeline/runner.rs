//! Running a job: loaders, workers, and the final merge
//!
//! Loader threads drain source partitions into a bounded queue. Workers pull
//! visits off the queue and feed private builders, flushing sorted rows every
//! `batch_size` visits. Malformed records are logged and skipped by the
//! loaders. Once everything has drained, one thread merges the
//! flushed rows per table, fills sequence gaps and resolves labels.

use crate::cache::LabelSet;
use crate::error::{ExtractError, Result};
use crate::keys::KeyFactory;
use crate::pipeline::job::{Job, TableSpec};
use crate::scope::{Context, ProcessingScope};
use crate::source::{estimate_count, DataSource, VisitStream};
use crate::table::{merge_partials, Row, TableBuilder, TableData};
use crate::types::Visit;
use crate::value::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Shared stop flag, checked between records
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    /// Stopped early; tables hold what was processed up to that point
    Cancelled,
}

/// Progress report handed to the checkpoint hook after each worker flush
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    pub worker: usize,
    /// Visits this worker has processed so far
    pub worker_records: u64,
    /// Visits processed by all workers so far
    pub total_records: u64,
}

pub type CheckpointHook = Arc<dyn Fn(&Checkpoint) + Send + Sync>;

#[derive(Debug)]
pub struct JobOutput {
    pub tables: Vec<TableData>,
    pub status: RunStatus,
    /// Visits processed
    pub records: u64,
    /// Malformed records skipped
    pub skipped: u64,
}

impl JobOutput {
    pub fn table(&self, name: &str) -> Option<&TableData> {
        self.tables.iter().find(|t| t.name() == name)
    }
}

pub struct Pipeline {
    job: Job,
    checkpoint: Option<CheckpointHook>,
}

/// Flushed rows of one worker: per table, a list of ascending runs
struct WorkerOutput {
    partials: Vec<Vec<Vec<Row>>>,
    records: u64,
}

impl Pipeline {
    pub fn new(job: Job) -> Result<Self> {
        job.validate()?;
        Ok(Pipeline { job, checkpoint: None })
    }

    pub fn with_checkpoint(mut self, hook: CheckpointHook) -> Self {
        self.checkpoint = Some(hook);
        self
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    pub fn run(
        &self,
        source: &mut dyn DataSource,
        cancel: &CancellationToken,
    ) -> Result<JobOutput> {
        let config = &self.job.pipeline;
        let started = Instant::now();

        for filter in &self.job.filters {
            source.filters_mut().push(Arc::clone(filter));
        }
        info!(
            tables = self.job.tables.len(),
            loaders = config.loader_threads,
            workers = config.processing_threads,
            estimate = ?estimate_count(source),
            "starting extraction"
        );

        let partitions = source.partitions(config.loader_threads)?;
        let keys = config.key_algorithm.factory();
        let skipped = AtomicU64::new(0);
        let outputs = self.process(partitions, &keys, cancel, &skipped)?;

        let records: u64 = outputs.iter().map(|o| o.records).sum();
        let skipped = skipped.into_inner();
        if skipped > 0 {
            warn!(skipped, "malformed records were skipped");
        }
        let status = if cancel.is_cancelled() {
            warn!(records, "extraction cancelled, keeping partial output");
            RunStatus::Cancelled
        } else {
            RunStatus::Completed
        };

        let mut per_table: Vec<Vec<Vec<Row>>> = vec![Vec::new(); self.job.tables.len()];
        for output in outputs {
            for (idx, runs) in output.partials.into_iter().enumerate() {
                per_table[idx].extend(runs);
            }
        }

        let mut labels = LabelSet::new(&self.job.labels, config.label_cache_size);
        let mut tables = Vec::with_capacity(self.job.tables.len());
        for (spec, runs) in self.job.tables.iter().zip(per_table) {
            tables.push(finish_table(spec, runs, &keys, &mut labels, status)?);
        }

        info!(
            records,
            skipped,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "extraction finished"
        );
        Ok(JobOutput {
            tables,
            status,
            records,
            skipped,
        })
    }

    fn process(
        &self,
        partitions: Vec<VisitStream>,
        keys: &Arc<dyn KeyFactory>,
        cancel: &CancellationToken,
        skipped: &AtomicU64,
    ) -> Result<Vec<WorkerOutput>> {
        let config = &self.job.pipeline;
        let (tx, rx) = sync_channel::<Result<Visit>>(config.queue_capacity);
        let failed = AtomicBool::new(false);
        let total = AtomicU64::new(0);

        thread::scope(|s| -> Result<Vec<WorkerOutput>> {
            let mut loaders = Vec::with_capacity(partitions.len());
            for (idx, partition) in partitions.into_iter().enumerate() {
                let tx = tx.clone();
                let failed = &failed;
                let handle = thread::Builder::new()
                    .name(format!("loader-{}", idx))
                    .spawn_scoped(s, move || load(partition, tx, cancel, failed, skipped))?;
                loaders.push(handle);
            }
            drop(tx);

            let rx = Arc::new(Mutex::new(rx));
            let mut workers = Vec::with_capacity(config.processing_threads);
            for idx in 0..config.processing_threads {
                let rx = Arc::clone(&rx);
                let (failed, total) = (&failed, &total);
                let handle = thread::Builder::new()
                    .name(format!("worker-{}", idx))
                    .spawn_scoped(s, move || {
                        let result = self.work(idx, rx, keys, cancel, total);
                        if result.is_err() {
                            failed.store(true, Ordering::SeqCst);
                        }
                        result
                    })?;
                workers.push(handle);
            }
            drop(rx);

            let mut outputs = Vec::with_capacity(workers.len());
            let mut first_error = None;
            for (idx, handle) in workers.into_iter().enumerate() {
                match handle.join() {
                    Ok(Ok(output)) => outputs.push(output),
                    Ok(Err(e)) => {
                        first_error.get_or_insert(e);
                    }
                    Err(_) => {
                        failed.store(true, Ordering::SeqCst);
                        let name = format!("worker-{}", idx);
                        first_error.get_or_insert(ExtractError::WorkerPanicked(name));
                    }
                }
            }
            for (idx, handle) in loaders.into_iter().enumerate() {
                if handle.join().is_err() {
                    let name = format!("loader-{}", idx);
                    first_error.get_or_insert(ExtractError::WorkerPanicked(name));
                }
            }

            match first_error {
                Some(e) => Err(e),
                None => Ok(outputs),
            }
        })
    }

    fn work(
        &self,
        worker: usize,
        rx: Arc<Mutex<Receiver<Result<Visit>>>>,
        keys: &Arc<dyn KeyFactory>,
        cancel: &CancellationToken,
        total: &AtomicU64,
    ) -> Result<WorkerOutput> {
        let batch_size = self.job.pipeline.batch_size as u64;
        let mut builders: Vec<Box<dyn TableBuilder>> = self
            .job
            .tables
            .iter()
            .map(|t| t.builder(Arc::clone(keys)))
            .collect();
        let mut output = WorkerOutput {
            partials: vec![Vec::new(); builders.len()],
            records: 0,
        };

        loop {
            if cancel.is_cancelled() {
                break;
            }
            let next = match rx.lock() {
                Ok(queue) => queue.recv(),
                Err(_) => return Err(ExtractError::WorkerPanicked(format!("worker-{}", worker))),
            };
            let visit = match next {
                Ok(item) => item?,
                Err(_) => break,
            };

            let scope = ProcessingScope::root(Context::Visit(visit));
            for builder in builders.iter_mut() {
                builder.add_from_scope(&scope);
            }
            output.records += 1;
            let processed = total.fetch_add(1, Ordering::Relaxed) + 1;

            if output.records % batch_size == 0 {
                flush(&mut builders, &mut output);
                if let Some(hook) = &self.checkpoint {
                    hook(&Checkpoint {
                        worker,
                        worker_records: output.records,
                        total_records: processed,
                    });
                }
            }
        }

        flush(&mut builders, &mut output);
        debug!(worker, records = output.records, "worker done");
        Ok(output)
    }
}

fn load(
    partition: VisitStream,
    tx: SyncSender<Result<Visit>>,
    cancel: &CancellationToken,
    failed: &AtomicBool,
    skipped: &AtomicU64,
) {
    for item in partition {
        if cancel.is_cancelled() || failed.load(Ordering::SeqCst) {
            break;
        }
        if let Err(e) = &item {
            if e.is_record_error() {
                warn!(error = %e, "skipping malformed record");
                skipped.fetch_add(1, Ordering::Relaxed);
                continue;
            }
        }
        // A closed queue means every worker has stopped
        if tx.send(item).is_err() {
            break;
        }
    }
}

fn flush(builders: &mut [Box<dyn TableBuilder>], output: &mut WorkerOutput) {
    for (idx, builder) in builders.iter_mut().enumerate() {
        let rows = builder.take_rows();
        if !rows.is_empty() {
            output.partials[idx].push(rows);
        }
    }
}

fn finish_table(
    spec: &TableSpec,
    runs: Vec<Vec<Row>>,
    keys: &Arc<dyn KeyFactory>,
    labels: &mut LabelSet,
    status: RunStatus,
) -> Result<TableData> {
    let schema = Arc::clone(spec.mapper.schema());
    let merged = merge_partials(&schema, runs)?;

    let mut builder = spec.builder(Arc::clone(keys));
    for row in merged {
        builder.add_row(row);
    }
    builder.finalize_data();
    let mut rows = builder.take_rows();

    for (label_idx, field) in schema.fields().iter().enumerate() {
        let Some(binding) = &field.label else {
            continue;
        };
        let Some(key_idx) = schema.index_of(&binding.key_field) else {
            continue;
        };
        for row in rows.iter_mut() {
            if row.values[key_idx].is_null() {
                continue;
            }
            let key = row.values[key_idx].to_string();
            row.values[label_idx] = Value::Text(labels.resolve(&binding.resolver, &key)?);
        }
    }

    debug!(table = schema.name(), rows = rows.len(), "table finished");
    Ok(TableData {
        schema,
        rows,
        complete: status == RunStatus::Completed,
    })
}

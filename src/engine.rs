//! Apply coordinator: runs mapping batches on a bounded worker pool and
//! flushes their output to the store.
//!
//! # Pipeline
//!
//! ```text
//! store ──load──▶ partition ──▶ [worker 1..N: apply_batch] ──join_next──▶ buffer ──commit_chunk──▶ store
//! ```
//!
//! Workers are `spawn_blocking` tasks gated by a semaphore sized to the
//! worker count. Results arrive in completion order. The buffer is flushed in
//! chunks of whole batch results; each chunk writes its Standard rows and
//! marks its source rows processed in one transaction, so a source row is
//! never flagged without its output. A failed chunk is retried once and then
//! left unprocessed for the next run.
//!
//! A cooperative stop flag ([`ApplyHandle`]) prevents new batches from being
//! dispatched. Batches already running finish and are flushed before
//! [`apply_mappings`] returns.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use versemap_core::apply::{
    apply_batch, partition, ApplyError, BatchPlan, BatchResult, MappingIndex, TypeCounts,
};
use versemap_core::models::{RowId, StandardVerseRow};
use versemap_core::store::VersificationStore;

use crate::progress::{ApplyProgressEvent, ApplyProgressReporter};

/// Knobs for a single apply run.
#[derive(Debug, Clone)]
pub struct ApplyOptions {
    pub workers: usize,
    pub plan: BatchPlan,
    pub flush_chunk_rows: usize,
    pub target_tradition: String,
    /// Compute the report without writing anything.
    pub dry_run: bool,
}

/// Cooperative stop flag shared with whoever started the run.
#[derive(Debug, Clone, Default)]
pub struct ApplyHandle {
    stop: Arc<AtomicBool>,
}

impl ApplyHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the run to stop dispatching batches.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

/// End-of-run summary.
#[derive(Debug, Clone, Default)]
pub struct ApplyReport {
    pub run_id: String,
    pub started_at: i64,
    pub finished_at: i64,
    pub workers: usize,
    pub rows_loaded: u64,
    pub mappings_indexed: u64,
    /// Mappings aimed at a tradition other than the run's target.
    pub mappings_ignored: u64,
    pub batches_total: u64,
    pub batches_succeeded: u64,
    pub batches_skipped: u64,
    /// Batches never started because the run was stopped.
    pub batches_not_dispatched: u64,
    /// Standard rows produced by successful batches.
    pub rows_produced: u64,
    /// Standard rows inserted or updated in the store.
    pub rows_written: u64,
    /// Source rows flipped to processed.
    pub rows_marked: u64,
    pub normalization_misses: u64,
    pub chunks_committed: u64,
    pub chunks_failed: u64,
    pub by_type: TypeCounts,
    pub stopped: bool,
    pub dry_run: bool,
}

/// Batch results waiting to be committed.
#[derive(Default)]
struct FlushBuffer {
    rows: Vec<StandardVerseRow>,
    ids: Vec<RowId>,
    batches: Vec<usize>,
}

impl FlushBuffer {
    fn push(&mut self, result: BatchResult) {
        self.rows.extend(result.rows);
        self.ids.extend(result.processed);
        self.batches.push(result.batch_id);
    }

    fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}

/// Run every pending source row through the mapping index and persist the
/// results.
///
/// Fails only when the initial load fails. Batch errors, worker panics and
/// commit failures are logged and counted in the report.
pub async fn apply_mappings(
    store: &dyn VersificationStore,
    options: &ApplyOptions,
    handle: &ApplyHandle,
    progress: &dyn ApplyProgressReporter,
) -> Result<ApplyReport> {
    let run_id = uuid::Uuid::new_v4().to_string();
    let workers = options.workers.max(1);
    let mut report = ApplyReport {
        run_id: run_id.clone(),
        started_at: chrono::Utc::now().timestamp(),
        workers,
        dry_run: options.dry_run,
        ..Default::default()
    };

    progress.report(ApplyProgressEvent::Loading);
    let rows = store
        .load_unprocessed_source_rows()
        .await
        .context("Failed to load unprocessed source rows")?;
    let mappings = store
        .load_all_mappings()
        .await
        .context("Failed to load mappings")?;

    let index = Arc::new(MappingIndex::build_for(mappings, &options.target_tradition));
    report.rows_loaded = rows.len() as u64;
    report.mappings_indexed = index.len() as u64;
    report.mappings_ignored = index.ignored() as u64;

    let plan = BatchPlan { workers, ..options.plan };
    let batches = partition(rows, &plan);
    report.batches_total = batches.len() as u64;

    info!(
        run_id = %run_id,
        rows = report.rows_loaded,
        mappings = report.mappings_indexed,
        batches = report.batches_total,
        workers,
        dry_run = options.dry_run,
        "apply started"
    );

    let semaphore = Arc::new(Semaphore::new(workers));
    let mut set: JoinSet<(usize, Result<BatchResult, ApplyError>)> = JoinSet::new();
    let mut pending = batches.into_iter();
    let mut buffer = FlushBuffer::default();
    let mut returned = 0u64;

    loop {
        while !handle.is_stopped() {
            let Ok(permit) = semaphore.clone().try_acquire_owned() else {
                break;
            };
            let Some(batch) = pending.next() else {
                break;
            };
            let index = Arc::clone(&index);
            set.spawn(async move {
                let batch_id = batch.id;
                let joined = tokio::task::spawn_blocking(move || apply_batch(&index, &batch)).await;
                drop(permit);
                let result = match joined {
                    Ok(result) => result,
                    Err(e) => Err(ApplyError::Worker {
                        batch_id,
                        message: e.to_string(),
                    }),
                };
                (batch_id, result)
            });
        }

        let Some(joined) = set.join_next().await else {
            break;
        };
        returned += 1;
        progress.report(ApplyProgressEvent::Applying {
            n: returned,
            total: report.batches_total,
        });

        match joined {
            Ok((batch_id, Ok(result))) => {
                for miss in &result.misses {
                    warn!(
                        run_id = %run_id,
                        batch_id,
                        row_id = miss.row_id,
                        book = %miss.book_id,
                        "book did not normalize; row left unprocessed"
                    );
                }
                debug!(run_id = %run_id, batch_id, rows = result.rows.len(), "batch done");
                report.batches_succeeded += 1;
                report.normalization_misses += result.misses.len() as u64;
                report.rows_produced += result.rows.len() as u64;
                report.by_type.merge(&result.by_type);
                buffer.push(result);
                if buffer.rows.len() >= options.flush_chunk_rows {
                    flush(store, &mut buffer, options, &mut report, progress).await;
                }
            }
            Ok((batch_id, Err(e))) => {
                error!(run_id = %run_id, batch_id, error = %e, "batch skipped");
                report.batches_skipped += 1;
            }
            Err(e) => {
                // The wrapper task itself never panics, so this is a cancellation.
                error!(run_id = %run_id, error = %e, "batch task lost");
                report.batches_skipped += 1;
            }
        }
    }

    flush(store, &mut buffer, options, &mut report, progress).await;

    report.batches_not_dispatched = pending.count() as u64;
    report.stopped = handle.is_stopped();
    report.finished_at = chrono::Utc::now().timestamp();

    info!(
        run_id = %run_id,
        succeeded = report.batches_succeeded,
        skipped = report.batches_skipped,
        not_dispatched = report.batches_not_dispatched,
        written = report.rows_written,
        marked = report.rows_marked,
        misses = report.normalization_misses,
        stopped = report.stopped,
        "apply finished"
    );

    Ok(report)
}

async fn flush(
    store: &dyn VersificationStore,
    buffer: &mut FlushBuffer,
    options: &ApplyOptions,
    report: &mut ApplyReport,
    progress: &dyn ApplyProgressReporter,
) {
    if buffer.is_empty() {
        return;
    }
    let chunk = std::mem::take(buffer);
    if options.dry_run {
        return;
    }

    progress.report(ApplyProgressEvent::Flushing {
        rows: chunk.rows.len() as u64,
    });

    let mut attempt = store.commit_chunk(&chunk.rows, &chunk.ids).await;
    if let Err(e) = &attempt {
        warn!(
            run_id = %report.run_id,
            batches = ?chunk.batches,
            error = %e,
            "chunk commit failed; retrying once"
        );
        attempt = store.commit_chunk(&chunk.rows, &chunk.ids).await;
    }

    match attempt {
        Ok(commit) => {
            report.chunks_committed += 1;
            report.rows_written += commit.written;
            report.rows_marked += commit.marked;
        }
        Err(e) => {
            error!(
                run_id = %report.run_id,
                batches = ?chunk.batches,
                source_rows = chunk.ids.len(),
                error = %e,
                "chunk commit failed twice; source rows stay unprocessed"
            );
            report.chunks_failed += 1;
        }
    }
}

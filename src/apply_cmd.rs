//! `vmap apply`: wire config, store, progress and Ctrl-C to the coordinator.

use anyhow::Result;
use tracing::warn;

use versemap_core::models::MappingType;

use crate::config::Config;
use crate::db;
use crate::engine::{apply_mappings, ApplyHandle, ApplyOptions, ApplyReport};
use crate::progress::ProgressMode;
use crate::sqlite_store::{ApplyRunRecord, SqliteStore};

pub fn options_from_config(config: &Config, workers: Option<usize>, dry_run: bool) -> ApplyOptions {
    let workers = config.apply.workers(workers);
    ApplyOptions {
        workers,
        plan: config.apply.batch_plan(workers),
        flush_chunk_rows: config.apply.flush_chunk_rows,
        target_tradition: config.apply.target_tradition.clone(),
        dry_run,
    }
}

pub async fn run_apply(
    config: &Config,
    dry_run: bool,
    workers: Option<usize>,
    progress: ProgressMode,
) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);
    let options = options_from_config(config, workers, dry_run);

    let handle = ApplyHandle::new();
    let on_signal = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; finishing in-flight batches");
            on_signal.stop();
        }
    });

    let reporter = progress.reporter();
    let report = apply_mappings(&store, &options, &handle, reporter.as_ref()).await?;

    if !dry_run {
        store.record_apply_run(&run_record(&report)).await?;
    }

    print_report(&report);
    store.pool().close().await;
    Ok(())
}

fn run_record(report: &ApplyReport) -> ApplyRunRecord {
    ApplyRunRecord {
        run_id: report.run_id.clone(),
        started_at: report.started_at,
        finished_at: report.finished_at,
        rows_loaded: report.rows_loaded,
        rows_written: report.rows_written,
        rows_marked: report.rows_marked,
        batches_succeeded: report.batches_succeeded,
        batches_skipped: report.batches_skipped,
        normalization_misses: report.normalization_misses,
        stopped: report.stopped,
    }
}

fn print_report(report: &ApplyReport) {
    if report.dry_run {
        println!("apply (dry-run)");
    } else {
        println!("apply");
    }
    println!("  run id: {}", report.run_id);
    println!("  workers: {}", report.workers);
    println!("  source rows: {}", report.rows_loaded);
    println!(
        "  mappings indexed: {} ({} for other traditions)",
        report.mappings_indexed, report.mappings_ignored
    );
    println!(
        "  batches: {} ok, {} skipped, {} not started",
        report.batches_succeeded, report.batches_skipped, report.batches_not_dispatched
    );
    for mapping_type in MappingType::ALL {
        let n = report.by_type.get(mapping_type);
        if n > 0 {
            println!("    {}: {}", mapping_type, n);
        }
    }
    println!("  standard rows produced: {}", report.rows_produced);
    if !report.dry_run {
        println!("  standard rows written: {}", report.rows_written);
        println!("  source rows marked: {}", report.rows_marked);
        if report.chunks_failed > 0 {
            println!("  chunks failed: {}", report.chunks_failed);
        }
    }
    println!("  normalization misses: {}", report.normalization_misses);
    if report.stopped {
        println!("stopped");
    } else {
        println!("ok");
    }
}

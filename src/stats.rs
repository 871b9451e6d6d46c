//! Database statistics and health overview.
//!
//! Summarises what is loaded: mapping tables, source rows per tradition and
//! how many of them are processed, the size of the Standard table, and the
//! most recent dataset and apply run. Used by `vmap stats`.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::db;
use crate::progress::format_number;

struct TraditionStats {
    tradition: String,
    total: i64,
    processed: i64,
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    let mappings: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM versification_mappings")
        .fetch_one(&pool)
        .await?;
    let rules: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM versification_rules")
        .fetch_one(&pool)
        .await?;
    let docs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM versification_documentation")
        .fetch_one(&pool)
        .await?;
    let standard: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM standard_table")
        .fetch_one(&pool)
        .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Versemap Database Stats");
    println!("=======================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Mappings:    {}", format_number(mappings as u64));
    println!("  Rules:       {}", format_number(rules as u64));
    println!("  Docs:        {}", format_number(docs as u64));
    println!("  Standard:    {}", format_number(standard as u64));

    let type_rows = sqlx::query(
        "SELECT mapping_type, COUNT(*) AS n FROM versification_mappings GROUP BY mapping_type ORDER BY n DESC",
    )
    .fetch_all(&pool)
    .await?;
    if !type_rows.is_empty() {
        println!();
        println!("  By mapping type:");
        for row in &type_rows {
            let mapping_type: String = row.get("mapping_type");
            let n: i64 = row.get("n");
            println!("  {:<12} {:>8}", mapping_type, format_number(n as u64));
        }
    }

    let tradition_rows = sqlx::query(
        r#"
        SELECT source_tradition, COUNT(*) AS total, SUM(dealt_with) AS processed
        FROM source_table
        GROUP BY source_tradition
        ORDER BY total DESC
        "#,
    )
    .fetch_all(&pool)
    .await?;

    let traditions: Vec<TraditionStats> = tradition_rows
        .iter()
        .map(|row| TraditionStats {
            tradition: row.get("source_tradition"),
            total: row.get("total"),
            processed: row.try_get::<Option<i64>, _>("processed").ok().flatten().unwrap_or(0),
        })
        .collect();

    if !traditions.is_empty() {
        println!();
        println!("  By source tradition:");
        println!("  {:<20} {:>10} {:>10} {:>10}", "TRADITION", "ROWS", "PROCESSED", "PENDING");
        println!("  {}", "-".repeat(54));
        for t in &traditions {
            println!(
                "  {:<20} {:>10} {:>10} {:>10}",
                t.tradition,
                format_number(t.total as u64),
                format_number(t.processed as u64),
                format_number((t.total - t.processed) as u64)
            );
        }
    }

    let last_dataset = sqlx::query(
        "SELECT sha256, path, ingested_at FROM dataset_versions ORDER BY ingested_at DESC LIMIT 1",
    )
    .fetch_optional(&pool)
    .await?;
    if let Some(row) = last_dataset {
        let sha256: String = row.get("sha256");
        let path: String = row.get("path");
        let ingested_at: i64 = row.get("ingested_at");
        println!();
        println!(
            "  Last dataset: {} ({}, {})",
            path,
            &sha256[..sha256.len().min(12)],
            format_ts_iso(ingested_at)
        );
    }

    let last_run = sqlx::query(
        r#"
        SELECT run_id, finished_at, rows_written, rows_marked, batches_skipped, stopped
        FROM apply_runs
        ORDER BY finished_at DESC
        LIMIT 1
        "#,
    )
    .fetch_optional(&pool)
    .await?;
    if let Some(row) = last_run {
        let run_id: String = row.get("run_id");
        let finished_at: i64 = row.get("finished_at");
        let written: i64 = row.get("rows_written");
        let marked: i64 = row.get("rows_marked");
        let skipped: i64 = row.get("batches_skipped");
        let stopped: bool = row.get("stopped");
        println!(
            "  Last apply:   {} at {}: {} written, {} marked, {} batches skipped{}",
            run_id,
            format_ts_iso(finished_at),
            written,
            marked,
            skipped,
            if stopped { " (stopped)" } else { "" }
        );
    }

    println!();

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_are_humanised() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn timestamps_format_as_utc() {
        assert_eq!(format_ts_iso(0), "1970-01-01 00:00");
    }
}

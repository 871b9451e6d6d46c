use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index. Safe to run repeatedly.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    // Per-tradition verse text awaiting normalization
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS source_table (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_tradition TEXT NOT NULL,
            book_id TEXT NOT NULL,
            chapter INTEGER NOT NULL,
            verse INTEGER NOT NULL,
            subverse TEXT NOT NULL DEFAULT '',
            text TEXT NOT NULL,
            dealt_with INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_source_pending ON source_table(dealt_with, source_tradition, book_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS versification_mappings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_tradition TEXT NOT NULL,
            target_tradition TEXT NOT NULL,
            source_book TEXT NOT NULL,
            source_chapter INTEGER NOT NULL,
            source_verse INTEGER NOT NULL,
            source_subverse TEXT,
            target_book TEXT NOT NULL,
            target_chapter INTEGER NOT NULL,
            target_verse INTEGER NOT NULL,
            target_subverse TEXT,
            mapping_type TEXT NOT NULL,
            category TEXT NOT NULL,
            manuscript_marker TEXT,
            note_marker TEXT,
            ancient_versions TEXT,
            notes TEXT NOT NULL DEFAULT '',
            source_range_note TEXT,
            target_range_note TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS versification_rules (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            rule_type TEXT NOT NULL,
            source_tradition TEXT NOT NULL,
            target_tradition TEXT NOT NULL,
            pattern TEXT NOT NULL,
            description TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS versification_documentation (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            section_title TEXT,
            content TEXT NOT NULL,
            category TEXT NOT NULL,
            related_sections TEXT,
            notes TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Canonical output; subverse is '' when the verse has none so the
    // unique key also covers whole verses.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS standard_table (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            target_tradition TEXT NOT NULL,
            book_id TEXT NOT NULL,
            chapter INTEGER NOT NULL,
            verse INTEGER NOT NULL,
            subverse TEXT NOT NULL DEFAULT '',
            text TEXT NOT NULL,
            notes TEXT NOT NULL DEFAULT '',
            write_mode TEXT NOT NULL DEFAULT 'upsert',
            source_tradition TEXT NOT NULL DEFAULT '',
            updated_at INTEGER NOT NULL,
            UNIQUE(target_tradition, book_id, chapter, verse, subverse)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Databases created before rows carried their origin.
    add_column_if_missing(pool, "standard_table", "write_mode", "TEXT NOT NULL DEFAULT 'upsert'").await?;
    add_column_if_missing(pool, "standard_table", "source_tradition", "TEXT NOT NULL DEFAULT ''").await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS dataset_versions (
            sha256 TEXT PRIMARY KEY,
            path TEXT NOT NULL,
            mappings INTEGER NOT NULL,
            rules INTEGER NOT NULL,
            docs INTEGER NOT NULL,
            issues INTEGER NOT NULL,
            ingested_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS apply_runs (
            run_id TEXT PRIMARY KEY,
            started_at INTEGER NOT NULL,
            finished_at INTEGER NOT NULL,
            rows_loaded INTEGER NOT NULL,
            rows_written INTEGER NOT NULL,
            rows_marked INTEGER NOT NULL,
            batches_succeeded INTEGER NOT NULL,
            batches_skipped INTEGER NOT NULL,
            normalization_misses INTEGER NOT NULL,
            stopped INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn add_column_if_missing(pool: &SqlitePool, table: &str, column: &str, definition: &str) -> Result<()> {
    let present: bool =
        sqlx::query_scalar("SELECT COUNT(*) > 0 FROM pragma_table_info(?) WHERE name = ?")
            .bind(table)
            .bind(column)
            .fetch_one(pool)
            .await?;
    if !present {
        sqlx::query(&format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, definition))
            .execute(pool)
            .await?;
    }
    Ok(())
}

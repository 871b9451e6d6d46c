//! SQLite-backed [`VersificationStore`] implementation.
//!
//! Maps each store operation onto the schema created by
//! [`migrate`](crate::migrate). Optional subverses are stored as `''` so the
//! natural key of `standard_table` can be a plain `UNIQUE` constraint.
//! Standard rows keep their write mode and source tradition so a later run
//! settles collisions exactly as the in-memory store does.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

use versemap_core::books::{normalize_book, BookCode};
use versemap_core::models::{
    Documentation, Mapping, NewSourceRow, RowId, Rule, SourceVerseRow, StandardVerseRow,
};
use versemap_core::resolve::settle;
use versemap_core::store::{ChunkCommit, VersificationStore};
use versemap_core::validate::Validate;

/// SQLite implementation of the [`VersificationStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

/// Summary of one ingested dataset file, keyed by content hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetVersion {
    pub sha256: String,
    pub path: String,
    pub mappings: u64,
    pub rules: u64,
    pub docs: u64,
    pub issues: u64,
}

/// One row of `apply_runs`.
#[derive(Debug, Clone)]
pub struct ApplyRunRecord {
    pub run_id: String,
    pub started_at: i64,
    pub finished_at: i64,
    pub rows_loaded: u64,
    pub rows_written: u64,
    pub rows_marked: u64,
    pub batches_succeeded: u64,
    pub batches_skipped: u64,
    pub normalization_misses: u64,
    pub stopped: bool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Whether a dataset with this content hash was ingested before.
    pub async fn dataset_seen(&self, sha256: &str) -> Result<bool> {
        let seen: bool =
            sqlx::query_scalar("SELECT COUNT(*) > 0 FROM dataset_versions WHERE sha256 = ?")
                .bind(sha256)
                .fetch_one(&self.pool)
                .await?;
        Ok(seen)
    }

    pub async fn record_dataset(&self, version: &DatasetVersion) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO dataset_versions (sha256, path, mappings, rules, docs, issues, ingested_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(sha256) DO UPDATE SET
                path = excluded.path,
                mappings = excluded.mappings,
                rules = excluded.rules,
                docs = excluded.docs,
                issues = excluded.issues,
                ingested_at = excluded.ingested_at
            "#,
        )
        .bind(&version.sha256)
        .bind(&version.path)
        .bind(version.mappings as i64)
        .bind(version.rules as i64)
        .bind(version.docs as i64)
        .bind(version.issues as i64)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn record_apply_run(&self, run: &ApplyRunRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO apply_runs (run_id, started_at, finished_at, rows_loaded, rows_written,
                                    rows_marked, batches_succeeded, batches_skipped,
                                    normalization_misses, stopped)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&run.run_id)
        .bind(run.started_at)
        .bind(run.finished_at)
        .bind(run.rows_loaded as i64)
        .bind(run.rows_written as i64)
        .bind(run.rows_marked as i64)
        .bind(run.batches_succeeded as i64)
        .bind(run.batches_skipped as i64)
        .bind(run.normalization_misses as i64)
        .bind(run.stopped)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn subverse_to_db(subverse: &Option<String>) -> &str {
    subverse.as_deref().unwrap_or("")
}

fn subverse_from_db(raw: Option<String>) -> Option<String> {
    raw.filter(|s| !s.is_empty())
}

fn get_u32(row: &SqliteRow, column: &str) -> Result<u32> {
    let value: i64 = row.try_get(column)?;
    u32::try_from(value).with_context(|| format!("{} out of range: {}", column, value))
}

fn get_book(row: &SqliteRow, column: &str) -> Result<BookCode> {
    let raw: String = row.try_get(column)?;
    normalize_book(&raw).ok_or_else(|| anyhow!("unknown book in {}: {}", column, raw))
}

fn mapping_from_row(row: &SqliteRow) -> Result<Mapping> {
    let mapping_type: String = row.try_get("mapping_type")?;
    let category: String = row.try_get("category")?;
    Ok(Mapping {
        source_tradition: row.try_get("source_tradition")?,
        target_tradition: row.try_get("target_tradition")?,
        source_book: get_book(row, "source_book")?,
        source_chapter: get_u32(row, "source_chapter")?,
        source_verse: get_u32(row, "source_verse")?,
        source_subverse: subverse_from_db(row.try_get("source_subverse")?),
        target_book: get_book(row, "target_book")?,
        target_chapter: get_u32(row, "target_chapter")?,
        target_verse: get_u32(row, "target_verse")?,
        target_subverse: subverse_from_db(row.try_get("target_subverse")?),
        mapping_type: mapping_type.parse()?,
        category: category.parse()?,
        manuscript_marker: row.try_get("manuscript_marker")?,
        note_marker: row.try_get("note_marker")?,
        ancient_versions: row.try_get("ancient_versions")?,
        notes: row.try_get("notes")?,
        source_range_note: row.try_get("source_range_note")?,
        target_range_note: row.try_get("target_range_note")?,
    })
}

fn standard_from_row(row: &SqliteRow) -> Result<StandardVerseRow> {
    let write_mode: String = row.try_get("write_mode")?;
    Ok(StandardVerseRow {
        target_tradition: row.try_get("target_tradition")?,
        book_id: get_book(row, "book_id")?,
        chapter: get_u32(row, "chapter")?,
        verse: get_u32(row, "verse")?,
        subverse: subverse_from_db(row.try_get("subverse")?),
        text: row.try_get("text")?,
        notes: row.try_get("notes")?,
        write_mode: write_mode.parse()?,
        source_tradition: row.try_get("source_tradition")?,
    })
}

/// Settle each row against what is stored at its key, in order. Runs inside
/// the caller's connection so a chunk sees its own earlier writes.
async fn write_standard(conn: &mut SqliteConnection, rows: &[StandardVerseRow]) -> Result<u64> {
    let now = chrono::Utc::now().timestamp();
    let mut written = 0;
    for row in rows {
        let stored = sqlx::query(
            r#"
            SELECT target_tradition, book_id, chapter, verse, subverse, text, notes,
                   write_mode, source_tradition
            FROM standard_table
            WHERE target_tradition = ? AND book_id = ? AND chapter = ? AND verse = ? AND subverse = ?
            "#,
        )
        .bind(&row.target_tradition)
        .bind(row.book_id.as_str())
        .bind(row.chapter as i64)
        .bind(row.verse as i64)
        .bind(subverse_to_db(&row.subverse))
        .fetch_optional(&mut *conn)
        .await?;
        let existing = stored.as_ref().map(standard_from_row).transpose()?;

        let Some(next) = settle(existing.as_ref(), row) else {
            continue;
        };
        sqlx::query(
            r#"
            INSERT INTO standard_table (target_tradition, book_id, chapter, verse, subverse,
                                        text, notes, write_mode, source_tradition, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(target_tradition, book_id, chapter, verse, subverse) DO UPDATE SET
                text = excluded.text,
                notes = excluded.notes,
                write_mode = excluded.write_mode,
                source_tradition = excluded.source_tradition,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&next.target_tradition)
        .bind(next.book_id.as_str())
        .bind(next.chapter as i64)
        .bind(next.verse as i64)
        .bind(subverse_to_db(&next.subverse))
        .bind(&next.text)
        .bind(&next.notes)
        .bind(next.write_mode.as_str())
        .bind(&next.source_tradition)
        .bind(now)
        .execute(&mut *conn)
        .await?;
        written += 1;
    }
    Ok(written)
}

async fn mark_processed(conn: &mut SqliteConnection, ids: &[RowId]) -> Result<u64> {
    let mut marked = 0;
    for id in ids {
        let result = sqlx::query("UPDATE source_table SET dealt_with = 1 WHERE id = ? AND dealt_with = 0")
            .bind(*id)
            .execute(&mut *conn)
            .await?;
        marked += result.rows_affected();
    }
    Ok(marked)
}

#[async_trait]
impl VersificationStore for SqliteStore {
    async fn load_unprocessed_source_rows(&self) -> Result<Vec<SourceVerseRow>> {
        let rows = sqlx::query(
            r#"
            SELECT id, source_tradition, book_id, chapter, verse, subverse, text, dealt_with
            FROM source_table
            WHERE dealt_with = 0
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<SourceVerseRow> {
                Ok(SourceVerseRow {
                    id: row.try_get("id")?,
                    source_tradition: row.try_get("source_tradition")?,
                    book_id: row.try_get("book_id")?,
                    chapter: get_u32(row, "chapter")?,
                    verse: get_u32(row, "verse")?,
                    subverse: subverse_from_db(row.try_get("subverse")?),
                    text: row.try_get("text")?,
                    dealt_with: row.try_get("dealt_with")?,
                })
            })
            .collect()
    }

    async fn load_all_mappings(&self) -> Result<Vec<Mapping>> {
        let rows = sqlx::query("SELECT * FROM versification_mappings ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(mapping_from_row).collect()
    }

    async fn upsert_standard_rows(&self, rows: &[StandardVerseRow]) -> Result<u64> {
        let mut conn = self.pool.acquire().await?;
        write_standard(&mut conn, rows).await
    }

    async fn mark_source_rows_processed(&self, ids: &[RowId]) -> Result<u64> {
        let mut conn = self.pool.acquire().await?;
        mark_processed(&mut conn, ids).await
    }

    async fn commit_chunk(&self, rows: &[StandardVerseRow], ids: &[RowId]) -> Result<ChunkCommit> {
        let mut tx = self.pool.begin().await?;
        let written = write_standard(&mut tx, rows).await?;
        let marked = mark_processed(&mut tx, ids).await?;
        tx.commit().await?;
        Ok(ChunkCommit { written, marked })
    }

    async fn replace_mapping_tables(
        &self,
        mappings: &[Mapping],
        rules: &[Rule],
        docs: &[Documentation],
    ) -> Result<()> {
        for m in mappings {
            m.validate()?;
        }
        for r in rules {
            r.validate()?;
        }
        for d in docs {
            d.validate()?;
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM versification_mappings")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM versification_rules")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM versification_documentation")
            .execute(&mut *tx)
            .await?;

        for m in mappings {
            sqlx::query(
                r#"
                INSERT INTO versification_mappings (
                    source_tradition, target_tradition,
                    source_book, source_chapter, source_verse, source_subverse,
                    target_book, target_chapter, target_verse, target_subverse,
                    mapping_type, category, manuscript_marker, note_marker,
                    ancient_versions, notes, source_range_note, target_range_note)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&m.source_tradition)
            .bind(&m.target_tradition)
            .bind(m.source_book.as_str())
            .bind(m.source_chapter as i64)
            .bind(m.source_verse as i64)
            .bind(&m.source_subverse)
            .bind(m.target_book.as_str())
            .bind(m.target_chapter as i64)
            .bind(m.target_verse as i64)
            .bind(&m.target_subverse)
            .bind(m.mapping_type.as_str())
            .bind(m.category.as_str())
            .bind(&m.manuscript_marker)
            .bind(&m.note_marker)
            .bind(&m.ancient_versions)
            .bind(&m.notes)
            .bind(&m.source_range_note)
            .bind(&m.target_range_note)
            .execute(&mut *tx)
            .await?;
        }

        for r in rules {
            sqlx::query(
                r#"
                INSERT INTO versification_rules (rule_type, source_tradition, target_tradition,
                                                 pattern, description)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(r.rule_type.as_str())
            .bind(&r.source_tradition)
            .bind(&r.target_tradition)
            .bind(&r.pattern)
            .bind(&r.description)
            .execute(&mut *tx)
            .await?;
        }

        for d in docs {
            let related = d
                .related_sections
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;
            sqlx::query(
                r#"
                INSERT INTO versification_documentation (section_title, content, category,
                                                         related_sections, notes)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&d.section_title)
            .bind(&d.content)
            .bind(&d.category)
            .bind(related)
            .bind(&d.notes)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn insert_source_rows(&self, rows: &[NewSourceRow]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO source_table (source_tradition, book_id, chapter, verse, subverse, text)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&row.source_tradition)
            .bind(&row.book_id)
            .bind(row.chapter as i64)
            .bind(row.verse as i64)
            .bind(subverse_to_db(&row.subverse))
            .bind(&row.text)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(rows.len() as u64)
    }

    async fn load_standard_rows(&self) -> Result<Vec<StandardVerseRow>> {
        let rows = sqlx::query(
            r#"
            SELECT target_tradition, book_id, chapter, verse, subverse, text, notes,
                   write_mode, source_tradition
            FROM standard_table
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut out = rows
            .iter()
            .map(standard_from_row)
            .collect::<Result<Vec<_>>>()?;

        // Canonical book order is not alphabetical, so sort here.
        out.sort_by(|a, b| {
            (a.book_id.ordinal(), a.chapter, a.verse, &a.subverse)
                .cmp(&(b.book_id.ordinal(), b.chapter, b.verse, &b.subverse))
        });
        Ok(out)
    }
}

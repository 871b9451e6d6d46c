//! Storage abstraction for versemap.
//!
//! The [`VersificationStore`] trait is the persistence boundary of the
//! engine: it owns `source_table`, the three mapping tables, and
//! `standard_table`. The core never assumes a particular database; the
//! native crate provides a SQLite implementation and [`memory`] provides an
//! in-process one for tests.
//!
//! Implementations must be `Send + Sync` so one store can be shared by the
//! coordinator across an async runtime.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Documentation, Mapping, NewSourceRow, RowId, Rule, SourceVerseRow, StandardVerseRow};

/// Counts from one committed chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkCommit {
    /// Standard rows inserted or updated.
    pub written: u64,
    /// Source rows flipped to `dealt_with = true`.
    pub marked: u64,
}

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`load_unprocessed_source_rows`](VersificationStore::load_unprocessed_source_rows) | Rows with `dealt_with = false` |
/// | [`load_all_mappings`](VersificationStore::load_all_mappings) | The whole mapping table |
/// | [`upsert_standard_rows`](VersificationStore::upsert_standard_rows) | Write Standard rows by natural key |
/// | [`mark_source_rows_processed`](VersificationStore::mark_source_rows_processed) | Flip `dealt_with` |
/// | [`commit_chunk`](VersificationStore::commit_chunk) | Both of the above in one transaction |
/// | [`replace_mapping_tables`](VersificationStore::replace_mapping_tables) | Truncate and reload mappings, rules, docs |
/// | [`insert_source_rows`](VersificationStore::insert_source_rows) | Load per-tradition verse text |
#[async_trait]
pub trait VersificationStore: Send + Sync {
    async fn load_unprocessed_source_rows(&self) -> Result<Vec<SourceVerseRow>>;

    async fn load_all_mappings(&self) -> Result<Vec<Mapping>>;

    /// Write rows keyed by `(target_tradition, book_id, chapter, verse, subverse)`.
    ///
    /// A row that meets an existing one is settled with
    /// [`resolve::settle`](crate::resolve::settle): `Upsert` replaces, `Append`
    /// joins onto the stored text, `InsertIfAbsent` only fills empty keys, and
    /// rows from different source traditions are ranked instead of merged.
    /// Returns the number of rows actually written.
    async fn upsert_standard_rows(&self, rows: &[StandardVerseRow]) -> Result<u64>;

    /// Returns the number of rows that changed from unprocessed to processed.
    async fn mark_source_rows_processed(&self, ids: &[RowId]) -> Result<u64>;

    /// Upsert `rows` and mark `ids` processed atomically. On error nothing
    /// from the chunk is visible.
    async fn commit_chunk(&self, rows: &[StandardVerseRow], ids: &[RowId]) -> Result<ChunkCommit>;

    /// Replace the mapping, rule and documentation tables wholesale.
    async fn replace_mapping_tables(
        &self,
        mappings: &[Mapping],
        rules: &[Rule],
        docs: &[Documentation],
    ) -> Result<()>;

    /// Append source rows; returns how many were inserted.
    async fn insert_source_rows(&self, rows: &[NewSourceRow]) -> Result<u64>;

    /// All Standard rows, ordered by book, chapter, verse and subverse.
    async fn load_standard_rows(&self) -> Result<Vec<StandardVerseRow>>;
}

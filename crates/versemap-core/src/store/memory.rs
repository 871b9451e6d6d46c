//! In-memory [`VersificationStore`] for tests and dry runs.
//!
//! Tables are plain collections behind `std::sync::RwLock`. A chunk commit
//! takes every write lock it needs before touching anything, so a commit is
//! all-or-nothing from the point of view of other callers.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::models::{
    Documentation, Mapping, NewSourceRow, RowId, Rule, SourceVerseRow, StandardKey,
    StandardVerseRow,
};
use crate::resolve::settle;
use crate::validate::Validate;

use super::{ChunkCommit, VersificationStore};

/// In-memory store. Source row ids are assigned from 1 in insertion order.
pub struct InMemoryStore {
    sources: RwLock<BTreeMap<RowId, SourceVerseRow>>,
    mappings: RwLock<Vec<Mapping>>,
    rules: RwLock<Vec<Rule>>,
    docs: RwLock<Vec<Documentation>>,
    standard: RwLock<BTreeMap<StandardKey, StandardVerseRow>>,
    failing_commits: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            sources: RwLock::new(BTreeMap::new()),
            mappings: RwLock::new(Vec::new()),
            rules: RwLock::new(Vec::new()),
            docs: RwLock::new(Vec::new()),
            standard: RwLock::new(BTreeMap::new()),
            failing_commits: AtomicUsize::new(0),
        }
    }

    /// Make the next `n` calls to `commit_chunk` fail without writing.
    pub fn fail_next_commits(&self, n: usize) {
        self.failing_commits.store(n, Ordering::SeqCst);
    }

    /// Snapshot of every source row, processed or not.
    pub fn source_rows(&self) -> Vec<SourceVerseRow> {
        self.sources.read().unwrap().values().cloned().collect()
    }

    pub fn rules(&self) -> Vec<Rule> {
        self.rules.read().unwrap().clone()
    }

    pub fn docs(&self) -> Vec<Documentation> {
        self.docs.read().unwrap().clone()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn write_standard(table: &mut BTreeMap<StandardKey, StandardVerseRow>, rows: &[StandardVerseRow]) -> u64 {
    let mut written = 0;
    for row in rows {
        let key = row.key();
        if let Some(next) = settle(table.get(&key), row) {
            table.insert(key, next);
            written += 1;
        }
    }
    written
}

fn mark(table: &mut BTreeMap<RowId, SourceVerseRow>, ids: &[RowId]) -> u64 {
    let mut marked = 0;
    for id in ids {
        if let Some(row) = table.get_mut(id) {
            if !row.dealt_with {
                row.dealt_with = true;
                marked += 1;
            }
        }
    }
    marked
}

#[async_trait]
impl VersificationStore for InMemoryStore {
    async fn load_unprocessed_source_rows(&self) -> Result<Vec<SourceVerseRow>> {
        let sources = self.sources.read().unwrap();
        Ok(sources.values().filter(|r| !r.dealt_with).cloned().collect())
    }

    async fn load_all_mappings(&self) -> Result<Vec<Mapping>> {
        Ok(self.mappings.read().unwrap().clone())
    }

    async fn upsert_standard_rows(&self, rows: &[StandardVerseRow]) -> Result<u64> {
        let mut standard = self.standard.write().unwrap();
        Ok(write_standard(&mut standard, rows))
    }

    async fn mark_source_rows_processed(&self, ids: &[RowId]) -> Result<u64> {
        let mut sources = self.sources.write().unwrap();
        Ok(mark(&mut sources, ids))
    }

    async fn commit_chunk(&self, rows: &[StandardVerseRow], ids: &[RowId]) -> Result<ChunkCommit> {
        let failing = self.failing_commits.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_commits.store(failing - 1, Ordering::SeqCst);
            bail!("injected commit failure");
        }
        let mut standard = self.standard.write().unwrap();
        let mut sources = self.sources.write().unwrap();
        Ok(ChunkCommit {
            written: write_standard(&mut standard, rows),
            marked: mark(&mut sources, ids),
        })
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
        *self.mappings.write().unwrap() = mappings.to_vec();
        *self.rules.write().unwrap() = rules.to_vec();
        *self.docs.write().unwrap() = docs.to_vec();
        Ok(())
    }

    async fn insert_source_rows(&self, rows: &[NewSourceRow]) -> Result<u64> {
        let mut sources = self.sources.write().unwrap();
        let mut next_id = sources.keys().next_back().copied().unwrap_or(0) + 1;
        for row in rows {
            sources.insert(
                next_id,
                SourceVerseRow {
                    id: next_id,
                    source_tradition: row.source_tradition.clone(),
                    book_id: row.book_id.clone(),
                    chapter: row.chapter,
                    verse: row.verse,
                    subverse: row.subverse.clone(),
                    text: row.text.clone(),
                    dealt_with: false,
                },
            );
            next_id += 1;
        }
        Ok(rows.len() as u64)
    }

    async fn load_standard_rows(&self) -> Result<Vec<StandardVerseRow>> {
        let mut rows: Vec<StandardVerseRow> = self.standard.read().unwrap().values().cloned().collect();
        rows.sort_by(|a, b| {
            (a.book_id.ordinal(), a.chapter, a.verse, &a.subverse)
                .cmp(&(b.book_id.ordinal(), b.chapter, b.verse, &b.subverse))
        });
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::books::normalize_book;
    use crate::models::WriteMode;

    fn standard(verse: u32, text: &str, write_mode: WriteMode) -> StandardVerseRow {
        StandardVerseRow {
            target_tradition: "Standard".into(),
            book_id: normalize_book("Gen").unwrap(),
            chapter: 1,
            verse,
            subverse: None,
            text: text.into(),
            notes: String::new(),
            write_mode,
            source_tradition: "Hebrew".into(),
        }
    }

    fn new_row(verse: u32) -> NewSourceRow {
        NewSourceRow {
            source_tradition: "Hebrew".into(),
            book_id: "Gen".into(),
            chapter: 1,
            verse,
            subverse: None,
            text: format!("verse {}", verse),
        }
    }

    #[tokio::test]
    async fn upsert_replaces_and_insert_if_absent_does_not() {
        let store = InMemoryStore::new();
        assert_eq!(store.upsert_standard_rows(&[standard(1, "a", WriteMode::Upsert)]).await.unwrap(), 1);
        assert_eq!(store.upsert_standard_rows(&[standard(1, "b", WriteMode::Upsert)]).await.unwrap(), 1);
        assert_eq!(
            store.upsert_standard_rows(&[standard(1, "c", WriteMode::InsertIfAbsent)]).await.unwrap(),
            0
        );
        let rows = store.load_standard_rows().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].text, "b");
    }

    #[tokio::test]
    async fn append_joins_text_stored_by_an_earlier_write() {
        let store = InMemoryStore::new();
        store.upsert_standard_rows(&[standard(1, "first", WriteMode::Upsert)]).await.unwrap();
        assert_eq!(
            store.upsert_standard_rows(&[standard(1, "second", WriteMode::Append)]).await.unwrap(),
            1
        );
        let rows = store.load_standard_rows().await.unwrap();
        assert_eq!(rows[0].text, "first second");
    }

    #[tokio::test]
    async fn marking_is_counted_once() {
        let store = InMemoryStore::new();
        store.insert_source_rows(&[new_row(1), new_row(2)]).await.unwrap();
        assert_eq!(store.load_unprocessed_source_rows().await.unwrap().len(), 2);
        assert_eq!(store.mark_source_rows_processed(&[1]).await.unwrap(), 1);
        assert_eq!(store.mark_source_rows_processed(&[1, 99]).await.unwrap(), 0);
        let left = store.load_unprocessed_source_rows().await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, 2);
    }

    #[tokio::test]
    async fn failed_commit_writes_nothing() {
        let store = InMemoryStore::new();
        store.insert_source_rows(&[new_row(1)]).await.unwrap();
        store.fail_next_commits(1);
        assert!(store.commit_chunk(&[standard(1, "a", WriteMode::Upsert)], &[1]).await.is_err());
        assert!(store.load_standard_rows().await.unwrap().is_empty());
        let commit = store.commit_chunk(&[standard(1, "a", WriteMode::Upsert)], &[1]).await.unwrap();
        assert_eq!(commit, ChunkCommit { written: 1, marked: 1 });
    }

    #[tokio::test]
    async fn replace_rejects_invalid_documentation() {
        let store = InMemoryStore::new();
        let doc = Documentation {
            section_title: None,
            content: "text".into(),
            category: "nonsense".into(),
            related_sections: None,
            notes: None,
        };
        let err = store.replace_mapping_tables(&[], &[], &[doc]).await.unwrap_err();
        assert!(err.to_string().contains("category"));
    }
}

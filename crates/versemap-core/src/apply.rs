//! Mapping application: turning source-tradition verses into Standard verses.
//!
//! This module is the pure half of the engine. It builds an immutable
//! [`MappingIndex`] once per run, cuts the unprocessed rows into [`Batch`]es,
//! and transforms one batch at a time with [`apply_batch`]. Scheduling,
//! persistence, and retries live in the native crate's coordinator.
//!
//! # Lookup order
//!
//! For a row `(tradition, book, chapter, verse, subverse)` the index tries
//! the exact subverse key, then the verse key without subverse, then falls
//! back to the tradition-wide default, which keeps the verse unchanged.
//!
//! # Consolidation
//!
//! Rows are grouped by `(tradition, book)` and a group is never split across
//! batches. Inside a batch, output rows landing on the same Standard key are
//! combined in source order with [`crate::resolve::settle`], the same policy
//! the stores apply on write. `Merged` verses are written in
//! [`WriteMode::Append`] and join their neighbour's text; rows from different
//! traditions never concatenate.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use thiserror::Error;

use crate::books::{normalize_book, BookCode};
use crate::models::{
    tradition_key, Mapping, MappingType, RowId, SourceVerseRow, StandardKey, StandardVerseRow,
    WriteMode, STANDARD_TRADITION,
};
use crate::reference::parse_ref_span;
use crate::resolve::{join_notes, settle};

/// Longest source span a range mapping is expanded over. Longer spans keep
/// only their start verse.
pub const MAX_RANGE_VERSES: u32 = 200;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApplyError {
    #[error("split of {source_ref} lists subverse '{subverse}' more than once")]
    ConflictingSplit { source_ref: String, subverse: String },
    #[error("batch {batch_id} failed: {message}")]
    Worker { batch_id: usize, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct LookupKey {
    tradition: String,
    book: BookCode,
    chapter: u32,
    verse: u32,
    subverse: Option<String>,
}

/// Read-only lookup table over every mapping that targets the Standard
/// tradition. Shared between workers behind an `Arc`.
#[derive(Debug, Default)]
pub struct MappingIndex {
    entries: HashMap<LookupKey, Vec<Mapping>>,
    target_tradition: String,
    indexed: usize,
    ignored: usize,
}

impl MappingIndex {
    pub fn build(mappings: impl IntoIterator<Item = Mapping>) -> Self {
        Self::build_for(mappings, STANDARD_TRADITION)
    }

    /// Build an index for mappings whose target is `target_tradition`.
    /// Mappings aimed at any other tradition are counted and ignored.
    pub fn build_for(mappings: impl IntoIterator<Item = Mapping>, target_tradition: &str) -> Self {
        let mut index = MappingIndex {
            target_tradition: target_tradition.to_string(),
            ..Default::default()
        };
        let target_key = tradition_key(target_tradition);
        for mapping in mappings {
            if tradition_key(&mapping.target_tradition) != target_key {
                index.ignored += 1;
                continue;
            }
            for expanded in expand_range(mapping) {
                index.insert(expanded);
            }
        }
        index
    }

    fn insert(&mut self, mapping: Mapping) {
        let key = LookupKey {
            tradition: tradition_key(&mapping.source_tradition),
            book: mapping.source_book,
            chapter: mapping.source_chapter,
            verse: mapping.source_verse,
            subverse: mapping.source_subverse.clone(),
        };
        self.indexed += 1;
        self.entries.entry(key).or_default().push(mapping);
    }

    /// Number of per-verse entries after range expansion.
    pub fn len(&self) -> usize {
        self.indexed
    }

    pub fn is_empty(&self) -> bool {
        self.indexed == 0
    }

    /// Mappings skipped because they target another tradition.
    pub fn ignored(&self) -> usize {
        self.ignored
    }

    pub fn target_tradition(&self) -> &str {
        &self.target_tradition
    }

    /// Most specific mappings for a verse, or `None` for the default (keep).
    pub fn lookup(
        &self,
        tradition: &str,
        book: BookCode,
        chapter: u32,
        verse: u32,
        subverse: Option<&str>,
    ) -> Option<&[Mapping]> {
        let mut key = LookupKey {
            tradition: tradition_key(tradition),
            book,
            chapter,
            verse,
            subverse: subverse.map(str::to_string),
        };
        if key.subverse.is_some() {
            if let Some(found) = self.entries.get(&key) {
                return Some(found.as_slice());
            }
            key.subverse = None;
        }
        self.entries.get(&key).map(Vec::as_slice)
    }
}

/// Expand a range mapping into per-verse mappings where the shape allows it:
/// equal-length spans pair verse by verse, and a span collapsing onto one
/// target verse sends every source verse there. Other shapes, and spans
/// longer than [`MAX_RANGE_VERSES`], keep only the start verse.
fn expand_range(mapping: Mapping) -> Vec<Mapping> {
    let (Some(source_raw), Some(target_raw)) =
        (mapping.source_range_note.clone(), mapping.target_range_note.clone())
    else {
        return vec![mapping];
    };
    let (Ok(source), Ok(target)) = (parse_ref_span(&source_raw), parse_ref_span(&target_raw)) else {
        return vec![mapping];
    };
    let has_subverses = mapping.source_subverse.is_some() || mapping.target_subverse.is_some();
    let (Some(source_len), Some(target_len)) = (source.len_within_chapter(), target.len_within_chapter())
    else {
        return vec![mapping];
    };
    if has_subverses || source_len <= 1 || source_len > MAX_RANGE_VERSES {
        return vec![mapping];
    }

    let step_target = if target_len == source_len {
        true
    } else if target_len == 1 {
        false
    } else {
        return vec![mapping];
    };

    (0..source_len)
        .map(|offset| {
            let mut m = mapping.clone();
            m.source_verse = mapping.source_verse + offset;
            if step_target {
                m.target_verse = mapping.target_verse + offset;
            }
            m
        })
        .collect()
}

/// A unit of work: whole `(tradition, book)` groups of source rows.
#[derive(Debug, Clone)]
pub struct Batch {
    pub id: usize,
    pub rows: Vec<SourceVerseRow>,
}

/// How rows are cut into batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPlan {
    pub workers: usize,
    pub batches_per_worker: usize,
    pub min_batch_size: usize,
}

impl BatchPlan {
    /// Target rows per batch: about `batches_per_worker` batches per worker,
    /// never below the floor.
    pub fn target_size(&self, total_rows: usize) -> usize {
        let batch_count = (self.workers * self.batches_per_worker).max(1);
        total_rows.div_ceil(batch_count).max(self.min_batch_size).max(1)
    }
}

/// Group rows by `(tradition, book)` and pack the groups into batches.
///
/// Rows inside each batch are sorted by chapter, verse, subverse and id so
/// consolidation is deterministic.
pub fn partition(rows: Vec<SourceVerseRow>, plan: &BatchPlan) -> Vec<Batch> {
    let target = plan.target_size(rows.len());

    let mut groups: BTreeMap<(String, usize, String), Vec<SourceVerseRow>> = BTreeMap::new();
    for row in rows {
        let (ordinal, book) = match normalize_book(&row.book_id) {
            Some(code) => (code.ordinal(), code.as_str().to_string()),
            None => (usize::MAX, row.book_id.trim().to_lowercase()),
        };
        groups
            .entry((tradition_key(&row.source_tradition), ordinal, book))
            .or_default()
            .push(row);
    }

    let mut batches = Vec::new();
    let mut current: Vec<SourceVerseRow> = Vec::new();
    for (_, mut group) in groups {
        group.sort_by(|a, b| {
            (a.chapter, a.verse, &a.subverse, a.id).cmp(&(b.chapter, b.verse, &b.subverse, b.id))
        });
        current.append(&mut group);
        if current.len() >= target {
            batches.push(Batch {
                id: batches.len(),
                rows: std::mem::take(&mut current),
            });
        }
    }
    if !current.is_empty() {
        batches.push(Batch {
            id: batches.len(),
            rows: current,
        });
    }
    batches
}

/// Per-type counters for reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TypeCounts(BTreeMap<MappingType, u64>);

impl TypeCounts {
    pub fn add(&mut self, mapping_type: MappingType, n: u64) {
        *self.0.entry(mapping_type).or_default() += n;
    }

    pub fn get(&self, mapping_type: MappingType) -> u64 {
        self.0.get(&mapping_type).copied().unwrap_or(0)
    }

    pub fn merge(&mut self, other: &TypeCounts) {
        for (t, n) in &other.0 {
            self.add(*t, *n);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (MappingType, u64)> + '_ {
        self.0.iter().map(|(t, n)| (*t, *n))
    }
}

/// A source row whose book could not be normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizationMiss {
    pub row_id: RowId,
    pub book_id: String,
}

/// What one batch produced.
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub batch_id: usize,
    /// Consolidated output, at most one row per Standard key.
    pub rows: Vec<StandardVerseRow>,
    /// Source rows that may be flagged `dealt_with`.
    pub processed: Vec<RowId>,
    pub misses: Vec<NormalizationMiss>,
    pub by_type: TypeCounts,
}

/// Output of a single source row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowResult {
    pub source_id: RowId,
    pub mapping_type: MappingType,
    pub rows: Vec<StandardVerseRow>,
}

/// Apply the index to one row. `Ok(None)` means the book did not normalize.
pub fn apply_row(index: &MappingIndex, row: &SourceVerseRow) -> Result<Option<RowResult>, ApplyError> {
    let Some(book) = normalize_book(&row.book_id) else {
        return Ok(None);
    };
    let target = index.target_tradition();
    let found = index.lookup(
        &row.source_tradition,
        book,
        row.chapter,
        row.verse,
        row.subverse.as_deref(),
    );

    let Some(mappings) = found.filter(|m| !m.is_empty()) else {
        return Ok(Some(RowResult {
            source_id: row.id,
            mapping_type: MappingType::Standard,
            rows: vec![keep(row, book, target, String::new())],
        }));
    };

    let primary = &mappings[0];
    let rows = match primary.mapping_type {
        MappingType::Standard => vec![keep(row, book, target, primary.notes.clone())],
        MappingType::Renumber => vec![moved(row, primary, target, WriteMode::Upsert)],
        MappingType::Merged => vec![moved(row, primary, target, WriteMode::Append)],
        MappingType::IfEmpty => vec![moved(row, primary, target, WriteMode::InsertIfAbsent)],
        MappingType::Split => split(row, book, mappings, target)?,
        MappingType::Absent => Vec::new(),
        MappingType::Missing => vec![StandardVerseRow {
            target_tradition: target.to_string(),
            book_id: primary.target_book,
            chapter: primary.target_chapter,
            verse: primary.target_verse,
            subverse: primary.target_subverse.clone(),
            text: String::new(),
            notes: join_notes(&primary.notes, &format!("absent from {} text", row.source_tradition)),
            write_mode: WriteMode::InsertIfAbsent,
            source_tradition: row.source_tradition.clone(),
        }],
    };

    Ok(Some(RowResult {
        source_id: row.id,
        mapping_type: primary.mapping_type,
        rows,
    }))
}

/// Apply the index to every row of a batch and consolidate the output.
pub fn apply_batch(index: &MappingIndex, batch: &Batch) -> Result<BatchResult, ApplyError> {
    let mut result = BatchResult {
        batch_id: batch.id,
        ..Default::default()
    };
    let mut consolidated = Consolidator::default();

    for row in &batch.rows {
        match apply_row(index, row)? {
            Some(outcome) => {
                result.by_type.add(outcome.mapping_type, 1);
                result.processed.push(outcome.source_id);
                for out in outcome.rows {
                    consolidated.push(out);
                }
            }
            None => result.misses.push(NormalizationMiss {
                row_id: row.id,
                book_id: row.book_id.clone(),
            }),
        }
    }

    result.rows = consolidated.finish();
    Ok(result)
}

fn provenance(row: &SourceVerseRow, book: BookCode) -> String {
    let mut s = format!("{} {}.{}:{}", row.source_tradition, book, row.chapter, row.verse);
    if let Some(sub) = &row.subverse {
        s.push('!');
        s.push_str(sub);
    }
    s
}

fn keep(row: &SourceVerseRow, book: BookCode, target: &str, notes: String) -> StandardVerseRow {
    StandardVerseRow {
        target_tradition: target.to_string(),
        book_id: book,
        chapter: row.chapter,
        verse: row.verse,
        subverse: row.subverse.clone(),
        text: row.text.clone(),
        notes,
        write_mode: WriteMode::Upsert,
        source_tradition: row.source_tradition.clone(),
    }
}

fn moved(row: &SourceVerseRow, mapping: &Mapping, target: &str, write_mode: WriteMode) -> StandardVerseRow {
    let book = mapping.source_book;
    StandardVerseRow {
        target_tradition: target.to_string(),
        book_id: mapping.target_book,
        chapter: mapping.target_chapter,
        verse: mapping.target_verse,
        subverse: mapping.target_subverse.clone().or_else(|| {
            // A verse-level mapping carries the row's own subverse along.
            mapping.source_subverse.is_none().then(|| row.subverse.clone()).flatten()
        }),
        text: row.text.clone(),
        notes: join_notes(&mapping.notes, &format!("from {}", provenance(row, book))),
        write_mode,
        source_tradition: row.source_tradition.clone(),
    }
}

fn split(
    row: &SourceVerseRow,
    book: BookCode,
    mappings: &[Mapping],
    target: &str,
) -> Result<Vec<StandardVerseRow>, ApplyError> {
    let mut parts: Vec<&Mapping> = mappings
        .iter()
        .filter(|m| m.mapping_type == MappingType::Split)
        .collect();
    parts.sort_by(|a, b| a.target_subverse.cmp(&b.target_subverse));
    for pair in parts.windows(2) {
        if pair[0].target_subverse == pair[1].target_subverse
            && pair[0].target_chapter == pair[1].target_chapter
            && pair[0].target_verse == pair[1].target_verse
        {
            return Err(ApplyError::ConflictingSplit {
                source_ref: provenance(row, book),
                subverse: pair[0].target_subverse.clone().unwrap_or_default(),
            });
        }
    }

    let pieces = split_text(&row.text, parts.len());
    Ok(parts
        .into_iter()
        .zip(pieces)
        .map(|(m, text)| StandardVerseRow {
            target_tradition: target.to_string(),
            book_id: m.target_book,
            chapter: m.target_chapter,
            verse: m.target_verse,
            subverse: m.target_subverse.clone(),
            text,
            notes: join_notes(&m.notes, &format!("split from {}", provenance(row, book))),
            write_mode: WriteMode::Upsert,
            source_tradition: row.source_tradition.clone(),
        })
        .collect())
}

/// Partition text into `parts` word-aligned pieces of near-equal word count.
/// The first pieces get the shorter share when words don't divide evenly.
pub fn split_text(text: &str, parts: usize) -> Vec<String> {
    if parts == 0 {
        return Vec::new();
    }
    let words: Vec<&str> = text.split_whitespace().collect();
    let n = words.len();
    (0..parts)
        .map(|i| words[i * n / parts..(i + 1) * n / parts].join(" "))
        .collect()
}

/// Combines output rows that share a Standard key, in arrival order.
#[derive(Default)]
struct Consolidator {
    rows: Vec<StandardVerseRow>,
    positions: HashMap<StandardKey, usize>,
}

impl Consolidator {
    fn push(&mut self, incoming: StandardVerseRow) {
        let key = incoming.key();
        let Some(&pos) = self.positions.get(&key) else {
            self.positions.insert(key, self.rows.len());
            self.rows.push(incoming);
            return;
        };
        if let Some(next) = settle(Some(&self.rows[pos]), &incoming) {
            self.rows[pos] = next;
        }
    }

    fn finish(self) -> Vec<StandardVerseRow> {
        self.rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;

    fn book(s: &str) -> BookCode {
        normalize_book(s).unwrap()
    }

    fn source(id: RowId, tradition: &str, b: &str, chapter: u32, verse: u32, text: &str) -> SourceVerseRow {
        SourceVerseRow {
            id,
            source_tradition: tradition.into(),
            book_id: b.into(),
            chapter,
            verse,
            subverse: None,
            text: text.into(),
            dealt_with: false,
        }
    }

    fn mapping(
        tradition: &str,
        from: (&str, u32, u32),
        to: (&str, u32, u32, Option<&str>),
        mapping_type: MappingType,
    ) -> Mapping {
        Mapping {
            source_tradition: tradition.into(),
            target_tradition: "Standard".into(),
            source_book: book(from.0),
            source_chapter: from.1,
            source_verse: from.2,
            source_subverse: None,
            target_book: book(to.0),
            target_chapter: to.1,
            target_verse: to.2,
            target_subverse: to.3.map(str::to_string),
            mapping_type,
            category: Category::Necessary,
            manuscript_marker: None,
            note_marker: None,
            ancient_versions: None,
            notes: String::new(),
            source_range_note: None,
            target_range_note: None,
        }
    }

    fn one_batch(rows: Vec<SourceVerseRow>) -> Batch {
        Batch { id: 0, rows }
    }

    #[test]
    fn unmapped_row_is_kept() {
        let index = MappingIndex::build(vec![]);
        let row = source(1, "Hebrew", "Gen", 1, 1, "In the beginning");
        let out = apply_row(&index, &row).unwrap().unwrap();
        assert_eq!(out.mapping_type, MappingType::Standard);
        assert_eq!(out.rows.len(), 1);
        let s = &out.rows[0];
        assert_eq!(s.target_tradition, "Standard");
        assert_eq!((s.book_id.as_str(), s.chapter, s.verse), ("Gen", 1, 1));
        assert_eq!(s.text, "In the beginning");
        assert_eq!(s.write_mode, WriteMode::Upsert);
    }

    #[test]
    fn renumber_moves_the_verse() {
        let index = MappingIndex::build(vec![mapping(
            "Latin",
            ("Psa", 142, 12),
            ("Psa", 143, 12, None),
            MappingType::Renumber,
        )]);
        let row = source(7, "latin", "Ps", 142, 12, "text");
        let out = apply_row(&index, &row).unwrap().unwrap();
        assert_eq!(out.source_id, 7);
        assert_eq!(out.rows.len(), 1);
        assert_eq!((out.rows[0].chapter, out.rows[0].verse), (143, 12));
        assert_eq!(out.rows[0].notes, "from latin Psa.142:12");
    }

    #[test]
    fn unknown_book_is_a_miss() {
        let index = MappingIndex::build(vec![]);
        let batch = one_batch(vec![
            source(1, "Latin", "Xyz", 1, 1, "?"),
            source(2, "Latin", "Gen", 1, 1, "ok"),
        ]);
        let result = apply_batch(&index, &batch).unwrap();
        assert_eq!(result.misses, vec![NormalizationMiss { row_id: 1, book_id: "Xyz".into() }]);
        assert_eq!(result.processed, vec![2]);
        assert_eq!(result.rows.len(), 1);
    }

    #[test]
    fn split_into_two_subverses() {
        let index = MappingIndex::build(vec![
            mapping("Greek", ("Psa", 13, 6), ("Psa", 13, 6, Some("b")), MappingType::Split),
            mapping("Greek", ("Psa", 13, 6), ("Psa", 13, 6, Some("a")), MappingType::Split),
        ]);
        let row = source(3, "Greek", "Psa", 13, 6, "one two three four five");
        let out = apply_row(&index, &row).unwrap().unwrap();
        assert_eq!(out.mapping_type, MappingType::Split);
        let subs: Vec<_> = out.rows.iter().map(|r| r.subverse.as_deref()).collect();
        assert_eq!(subs, vec![Some("a"), Some("b")]);
        assert_eq!(out.rows[0].text, "one two");
        assert_eq!(out.rows[1].text, "three four five");

        // Same input, same partition.
        let again = apply_row(&index, &row).unwrap().unwrap();
        assert_eq!(out, again);
    }

    #[test]
    fn duplicate_split_subverse_fails_the_batch() {
        let index = MappingIndex::build(vec![
            mapping("Greek", ("Psa", 13, 6), ("Psa", 13, 6, Some("a")), MappingType::Split),
            mapping("Greek", ("Psa", 13, 6), ("Psa", 13, 6, Some("a")), MappingType::Split),
        ]);
        let batch = one_batch(vec![source(3, "Greek", "Psa", 13, 6, "x y")]);
        assert!(matches!(
            apply_batch(&index, &batch),
            Err(ApplyError::ConflictingSplit { .. })
        ));
    }

    #[test]
    fn merged_verses_concatenate_in_order() {
        let index = MappingIndex::build(vec![mapping(
            "Hebrew",
            ("Jol", 3, 2),
            ("Jol", 3, 1, None),
            MappingType::Merged,
        )]);
        let batch = partition(
            vec![
                source(2, "Hebrew", "Joel", 3, 2, "second"),
                source(1, "Hebrew", "Joel", 3, 1, "first"),
            ],
            &BatchPlan { workers: 1, batches_per_worker: 4, min_batch_size: 1 },
        );
        assert_eq!(batch.len(), 1);
        let result = apply_batch(&index, &batch[0]).unwrap();
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0].verse, 1);
        assert_eq!(result.rows[0].text, "first second");
        assert_eq!(result.processed, vec![1, 2]);
        assert_eq!(result.by_type.get(MappingType::Merged), 1);
        assert_eq!(result.by_type.get(MappingType::Standard), 1);
    }

    #[test]
    fn if_empty_yields_to_existing_row() {
        let index = MappingIndex::build(vec![mapping(
            "Latin",
            ("Dan", 3, 91),
            ("Dan", 4, 1, None),
            MappingType::IfEmpty,
        )]);
        let alone = apply_batch(&index, &one_batch(vec![source(1, "Latin", "Dan", 3, 91, "fill")])).unwrap();
        assert_eq!(alone.rows.len(), 1);
        assert_eq!(alone.rows[0].write_mode, WriteMode::InsertIfAbsent);

        let with_existing = apply_batch(
            &index,
            &one_batch(vec![
                source(1, "Latin", "Dan", 3, 91, "fill"),
                source(2, "Latin", "Dan", 4, 1, "real"),
            ]),
        )
        .unwrap();
        assert_eq!(with_existing.rows.len(), 1);
        assert_eq!(with_existing.rows[0].text, "real");
        assert_eq!(with_existing.rows[0].write_mode, WriteMode::Upsert);
        assert_eq!(with_existing.processed, vec![1, 2]);
    }

    #[test]
    fn absent_and_missing() {
        let index = MappingIndex::build(vec![
            mapping("Latin", ("Mrk", 16, 9), ("Mrk", 16, 9, None), MappingType::Absent),
            mapping("Latin", ("Act", 8, 37), ("Act", 8, 37, None), MappingType::Missing),
        ]);
        let result = apply_batch(
            &index,
            &one_batch(vec![
                source(1, "Latin", "Mrk", 16, 9, "dropped"),
                source(2, "Latin", "Act", 8, 37, ""),
            ]),
        )
        .unwrap();
        assert_eq!(result.processed, vec![1, 2]);
        assert_eq!(result.rows.len(), 1);
        let placeholder = &result.rows[0];
        assert_eq!(placeholder.book_id.as_str(), "Act");
        assert!(placeholder.text.is_empty());
        assert!(placeholder.notes.contains("absent from Latin text"));
    }

    #[test]
    fn exact_subverse_wins_over_verse() {
        let mut sub = mapping("Greek", ("Est", 1, 1), ("Est", 1, 2, None), MappingType::Renumber);
        sub.source_subverse = Some("a".into());
        let index = MappingIndex::build(vec![
            mapping("Greek", ("Est", 1, 1), ("Est", 1, 5, None), MappingType::Renumber),
            sub,
        ]);
        let mut row = source(1, "Greek", "Est", 1, 1, "x");
        row.subverse = Some("a".into());
        let hit = apply_row(&index, &row).unwrap().unwrap();
        assert_eq!(hit.rows[0].verse, 2);

        row.subverse = Some("b".into());
        let fallback = apply_row(&index, &row).unwrap().unwrap();
        assert_eq!(fallback.rows[0].verse, 5);
        assert_eq!(fallback.rows[0].subverse.as_deref(), Some("b"));
    }

    #[test]
    fn ranges_expand_when_lengths_match() {
        let mut m = mapping("Greek", ("Psa", 9, 22), ("Psa", 10, 1, None), MappingType::Renumber);
        m.source_range_note = Some("Psa.9:22-39".into());
        m.target_range_note = Some("Psa.10:1-18".into());
        let index = MappingIndex::build(vec![m]);
        assert_eq!(index.len(), 18);
        let found = index.lookup("Greek", book("Psa"), 9, 30, None).unwrap();
        assert_eq!((found[0].target_chapter, found[0].target_verse), (10, 9));
    }

    #[test]
    fn oversized_range_keeps_start_verse() {
        let mut m = mapping("Latin", ("Psa", 1, 1), ("Psa", 1, 1, None), MappingType::Renumber);
        m.source_range_note = Some("Psa.1:1-4000000000".into());
        m.target_range_note = Some("Psa.1:1".into());
        let index = MappingIndex::build(vec![m]);
        assert_eq!(index.len(), 1);
        assert!(index.lookup("Latin", book("Psa"), 1, 1, None).is_some());
        assert!(index.lookup("Latin", book("Psa"), 1, 2, None).is_none());
    }

    #[test]
    fn range_at_the_cap_still_expands() {
        let mut m = mapping("Latin", ("Psa", 1, 1), ("Psa", 2, 1, None), MappingType::Renumber);
        m.source_range_note = Some(format!("Psa.1:1-{}", MAX_RANGE_VERSES));
        m.target_range_note = Some(format!("Psa.2:1-{}", MAX_RANGE_VERSES));
        let index = MappingIndex::build(vec![m]);
        assert_eq!(index.len(), MAX_RANGE_VERSES as usize);
    }

    #[test]
    fn merged_row_is_written_in_append_mode() {
        let index = MappingIndex::build(vec![mapping(
            "Latin",
            ("Psa", 9, 2),
            ("Psa", 9, 1, None),
            MappingType::Merged,
        )]);
        let out = apply_row(&index, &source(1, "Latin", "Psa", 9, 2, "second")).unwrap().unwrap();
        assert_eq!(out.rows[0].write_mode, WriteMode::Append);
        assert_eq!(out.rows[0].source_tradition, "Latin");
    }

    #[test]
    fn traditions_sharing_a_batch_do_not_concatenate() {
        let index = MappingIndex::build(vec![]);
        let rows = vec![
            source(1, "Hebrew", "Gen", 1, 1, "HEB"),
            source(2, "Latin", "Gen", 1, 1, "LAT"),
        ];
        let plan = BatchPlan { workers: 1, batches_per_worker: 1, min_batch_size: 500 };
        let batches = partition(rows, &plan);
        assert_eq!(batches.len(), 1);

        let result = apply_batch(&index, &batches[0]).unwrap();
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0].text, "HEB");
        assert_eq!(result.processed, vec![1, 2]);
    }

    #[test]
    fn non_standard_targets_are_ignored() {
        let mut m = mapping("Latin", ("Psa", 1, 1), ("Psa", 1, 2, None), MappingType::Renumber);
        m.target_tradition = "Hebrew".into();
        let index = MappingIndex::build(vec![m]);
        assert!(index.is_empty());
        assert_eq!(index.ignored(), 1);
    }

    #[test]
    fn partition_keeps_groups_whole() {
        let mut rows = Vec::new();
        for v in 1..=30 {
            rows.push(source(v as i64, "Latin", "Gen", 1, v, "g"));
            rows.push(source(100 + v as i64, "Latin", "Exo", 1, v, "e"));
            rows.push(source(200 + v as i64, "Greek", "Gen", 1, v, "g"));
        }
        let plan = BatchPlan { workers: 2, batches_per_worker: 4, min_batch_size: 10 };
        assert_eq!(plan.target_size(90), 12);
        let batches = partition(rows, &plan);
        assert_eq!(batches.len(), 3);
        for (i, b) in batches.iter().enumerate() {
            assert_eq!(b.id, i);
            assert_eq!(b.rows.len(), 30);
            let first = (&b.rows[0].source_tradition, &b.rows[0].book_id);
            assert!(b.rows.iter().all(|r| (&r.source_tradition, &r.book_id) == first));
        }
    }

    #[test]
    fn batch_plan_floor() {
        let plan = BatchPlan { workers: 8, batches_per_worker: 4, min_batch_size: 500 };
        assert_eq!(plan.target_size(1000), 500);
        assert_eq!(plan.target_size(0), 500);
        assert_eq!(plan.target_size(100_000), 3125);
    }

    #[test]
    fn split_text_is_word_aligned() {
        assert_eq!(split_text("a b c d", 2), vec!["a b", "c d"]);
        assert_eq!(split_text("a b c", 2), vec!["a", "b c"]);
        assert_eq!(split_text("a", 3), vec!["", "", "a"]);
        assert!(split_text("a b", 0).is_empty());
    }
}

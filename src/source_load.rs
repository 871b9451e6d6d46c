//! Loading per-tradition verse text into `source_table`.
//!
//! The input is tab-separated, one verse per line:
//!
//! ```text
//! # tradition	book	chapter	verse	[subverse]	text
//! Latin	Psa	142	12	Domine exaudi orationem meam
//! Hebrew	Psa	13	6	a	But I have trusted in thy mercy
//! ```
//!
//! Five fields mean no subverse; six fields carry one, and an empty subverse
//! field is the same as none. Book names are stored as written; they are
//! normalized when mappings are applied. Blank lines and lines starting with
//! `#` are skipped. A malformed line is reported and skipped.

use std::path::Path;

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::warn;

use versemap_core::models::NewSourceRow;
use versemap_core::store::VersificationStore;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SourceLineError {
    #[error("line {line}: expected 5 or 6 tab-separated fields, found {found}")]
    FieldCount { line: usize, found: usize },
    #[error("line {line}: {field} must be a positive integer, got '{value}'")]
    BadNumber {
        line: usize,
        field: &'static str,
        value: String,
    },
    #[error("line {line}: {field} must not be empty")]
    Empty { line: usize, field: &'static str },
}

/// Parse source text lines. Good rows and per-line errors are both returned.
pub fn parse_source_rows(input: &str) -> (Vec<NewSourceRow>, Vec<SourceLineError>) {
    let mut rows = Vec::new();
    let mut errors = Vec::new();

    for (i, raw) in input.lines().enumerate() {
        let line = i + 1;
        if raw.trim().is_empty() || raw.trim_start().starts_with('#') {
            continue;
        }
        match parse_line(line, raw) {
            Ok(row) => rows.push(row),
            Err(e) => errors.push(e),
        }
    }

    (rows, errors)
}

fn parse_line(line: usize, raw: &str) -> Result<NewSourceRow, SourceLineError> {
    let fields: Vec<&str> = raw.split('\t').collect();
    let (tradition, book, chapter, verse, subverse, text) = match fields.as_slice() {
        [t, b, c, v, text] => (*t, *b, *c, *v, "", *text),
        [t, b, c, v, s, text] => (*t, *b, *c, *v, *s, *text),
        _ => {
            return Err(SourceLineError::FieldCount {
                line,
                found: fields.len(),
            })
        }
    };

    let tradition = tradition.trim();
    if tradition.is_empty() {
        return Err(SourceLineError::Empty {
            line,
            field: "tradition",
        });
    }
    let book = book.trim();
    if book.is_empty() {
        return Err(SourceLineError::Empty { line, field: "book" });
    }
    let subverse = subverse.trim();

    Ok(NewSourceRow {
        source_tradition: tradition.to_string(),
        book_id: book.to_string(),
        chapter: positive(line, "chapter", chapter)?,
        verse: positive(line, "verse", verse)?,
        subverse: (!subverse.is_empty()).then(|| subverse.to_string()),
        text: text.trim().to_string(),
    })
}

fn positive(line: usize, field: &'static str, value: &str) -> Result<u32, SourceLineError> {
    match value.trim().parse::<u32>() {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(SourceLineError::BadNumber {
            line,
            field,
            value: value.trim().to_string(),
        }),
    }
}

/// `vmap load-source <file>`
pub async fn run_load_source(config: &Config, path: &Path) -> Result<()> {
    let input = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read source file: {}", path.display()))?;
    let (rows, errors) = parse_source_rows(&input);
    for e in &errors {
        warn!(file = %path.display(), "{}", e);
    }

    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);
    let inserted = store.insert_source_rows(&rows).await?;

    println!("load-source {}", path.display());
    println!("  rows inserted: {}", inserted);
    println!("  lines skipped: {}", errors.len());
    println!("ok");

    store.pool().close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_and_six_field_lines() {
        let input = "# header\nLatin\tPsa\t142\t12\tDomine\n\nHebrew\tPsa\t13\t6\ta\tBut I\n";
        let (rows, errors) = parse_source_rows(input);
        assert!(errors.is_empty());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].subverse, None);
        assert_eq!(rows[0].text, "Domine");
        assert_eq!(rows[1].subverse.as_deref(), Some("a"));
    }

    #[test]
    fn unknown_books_are_kept_verbatim() {
        let (rows, errors) = parse_source_rows("Latin\tXyz\t1\t1\ttext\n");
        assert!(errors.is_empty());
        assert_eq!(rows[0].book_id, "Xyz");
    }

    #[test]
    fn bad_lines_are_reported_with_line_numbers() {
        let input = "Latin\tPsa\t0\t1\tzero chapter\nLatin\tPsa\t1\nLatin\tPsa\t1\t2\tfine\n";
        let (rows, errors) = parse_source_rows(input);
        assert_eq!(rows.len(), 1);
        assert_eq!(
            errors,
            vec![
                SourceLineError::BadNumber {
                    line: 1,
                    field: "chapter",
                    value: "0".into()
                },
                SourceLineError::FieldCount { line: 2, found: 3 },
            ]
        );
    }
}

//! Verse reference parsing.
//!
//! References in the dataset look like `Psa.142:12`, `Psa.13:6!a` (subverse
//! `a`) or ranges such as `Psa.9:22-39` and `Psa.9:22-10:3`. The book part
//! goes through [`normalize_book`], so any spelling the normalizer knows is
//! accepted.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::books::{normalize_book, BookCode};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("unknown book: {0}")]
    UnknownBook(String),
    #[error("malformed reference: {0}")]
    Malformed(String),
}

/// A single verse, optionally narrowed to a subverse.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct VerseRef {
    pub book: BookCode,
    pub chapter: u32,
    pub verse: u32,
    pub subverse: Option<String>,
}

impl fmt::Display for VerseRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}:{}", self.book, self.chapter, self.verse)?;
        if let Some(sub) = &self.subverse {
            write!(f, "!{}", sub)?;
        }
        Ok(())
    }
}

/// A reference as written in a data row: one verse or an inclusive range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefSpan {
    pub start: VerseRef,
    pub end: Option<VerseRef>,
}

impl RefSpan {
    pub fn is_range(&self) -> bool {
        self.end.is_some()
    }

    /// Number of verses covered when the span stays inside one chapter.
    ///
    /// Cross-chapter spans return `None`: their length depends on chapter
    /// sizes that the dataset row does not carry.
    pub fn len_within_chapter(&self) -> Option<u32> {
        match &self.end {
            None => Some(1),
            Some(end) if end.chapter == self.start.chapter && end.verse >= self.start.verse => {
                Some(end.verse - self.start.verse + 1)
            }
            Some(_) => None,
        }
    }
}

/// Parse a single verse reference. Ranges are rejected.
pub fn parse_verse_ref(input: &str) -> Result<VerseRef, ReferenceError> {
    let span = parse_ref_span(input)?;
    if span.is_range() {
        return Err(ReferenceError::Malformed(format!(
            "expected a single verse, got range '{}'",
            input.trim()
        )));
    }
    Ok(span.start)
}

/// Parse a reference that may be a range.
pub fn parse_ref_span(input: &str) -> Result<RefSpan, ReferenceError> {
    let trimmed = input.trim();
    let malformed = || ReferenceError::Malformed(trimmed.to_string());

    let split_at = trimmed
        .rfind(|c: char| c == '.' || c.is_whitespace())
        .ok_or_else(malformed)?;
    let (book_part, rest) = (&trimmed[..split_at], &trimmed[split_at + 1..]);
    let book = normalize_book(book_part)
        .ok_or_else(|| ReferenceError::UnknownBook(book_part.trim().to_string()))?;

    let (start_part, end_part) = match rest.split_once('-') {
        Some((s, e)) => (s, Some(e)),
        None => (rest, None),
    };

    let (chapter, verse_part) = start_part.split_once(':').ok_or_else(malformed)?;
    let chapter = parse_number(chapter).ok_or_else(malformed)?;
    let (verse, subverse) = parse_verse_part(verse_part).ok_or_else(malformed)?;
    let start = VerseRef {
        book,
        chapter,
        verse,
        subverse,
    };

    let end = match end_part {
        None => None,
        Some(end_part) => {
            let (end_chapter, end_verse_part) = match end_part.split_once(':') {
                Some((c, v)) => (parse_number(c).ok_or_else(malformed)?, v),
                None => (chapter, end_part),
            };
            let (end_verse, end_sub) = parse_verse_part(end_verse_part).ok_or_else(malformed)?;
            Some(VerseRef {
                book,
                chapter: end_chapter,
                verse: end_verse,
                subverse: end_sub,
            })
        }
    };

    Ok(RefSpan { start, end })
}

fn parse_number(s: &str) -> Option<u32> {
    let s = s.trim();
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

fn parse_verse_part(s: &str) -> Option<(u32, Option<String>)> {
    match s.split_once('!') {
        Some((verse, sub)) => {
            let sub = sub.trim();
            if sub.is_empty() || !sub.chars().all(|c| c.is_ascii_alphanumeric()) {
                return None;
            }
            Some((parse_number(verse)?, Some(sub.to_string())))
        }
        None => Some((parse_number(s)?, None)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_reference() {
        let r = parse_verse_ref("Psa.142:12").unwrap();
        assert_eq!(r.book.as_str(), "Psa");
        assert_eq!((r.chapter, r.verse), (142, 12));
        assert_eq!(r.subverse, None);
        assert_eq!(r.to_string(), "Psa.142:12");
    }

    #[test]
    fn parses_subverse_and_alias_book() {
        let r = parse_verse_ref("Joh.3:16!b").unwrap();
        assert_eq!(r.book.as_str(), "Jhn");
        assert_eq!(r.subverse.as_deref(), Some("b"));
        assert_eq!(r.to_string(), "Jhn.3:16!b");
    }

    #[test]
    fn parses_space_separated_book() {
        let r = parse_verse_ref("1 Kings 4:21").unwrap();
        assert_eq!(r.book.as_str(), "1Ki");
        assert_eq!((r.chapter, r.verse), (4, 21));
    }

    #[test]
    fn parses_ranges() {
        let span = parse_ref_span("Psa.9:22-39").unwrap();
        assert!(span.is_range());
        assert_eq!(span.len_within_chapter(), Some(18));

        let cross = parse_ref_span("Mal.3:19-4:6").unwrap();
        let end = cross.end.as_ref().unwrap();
        assert_eq!((end.chapter, end.verse), (4, 6));
        assert_eq!(cross.len_within_chapter(), None);
    }

    #[test]
    fn rejects_malformed_references() {
        assert!(matches!(
            parse_verse_ref("Psa.title"),
            Err(ReferenceError::Malformed(_))
        ));
        assert!(matches!(
            parse_verse_ref("Psa.3:title"),
            Err(ReferenceError::Malformed(_))
        ));
        assert!(matches!(
            parse_verse_ref("Xyz.1:1"),
            Err(ReferenceError::UnknownBook(b)) if b == "Xyz"
        ));
        assert!(parse_verse_ref("Psa.9:22-39").is_err());
        assert!(parse_verse_ref("Psa.1:1!").is_err());
    }
}

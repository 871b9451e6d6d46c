//! Core data models for versification mapping.
//!
//! [`Mapping`], [`Rule`] and [`Documentation`] come out of the dataset
//! parser. [`SourceVerseRow`] and [`StandardVerseRow`] are the shapes the
//! application engine reads from and writes to the store.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::books::BookCode;
use crate::validate::ValidationError;

/// Name of the canonical tradition every source is mapped onto.
pub const STANDARD_TRADITION: &str = "Standard";

/// Controlled vocabulary for [`Documentation::category`].
pub const DOC_CATEGORIES: &[&str] = &["methodology", "overview", "tradition", "changelog", "general"];

/// Store-assigned identifier of a source row.
pub type RowId = i64;

/// How a source verse relates to its Standard counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum MappingType {
    /// Same numbering; the verse is kept as is.
    Standard,
    Renumber,
    Merged,
    IfEmpty,
    Split,
    Absent,
    Missing,
}

impl MappingType {
    pub const ALL: [MappingType; 7] = [
        MappingType::Standard,
        MappingType::Renumber,
        MappingType::Merged,
        MappingType::IfEmpty,
        MappingType::Split,
        MappingType::Absent,
        MappingType::Missing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MappingType::Standard => "Standard",
            MappingType::Renumber => "Renumber",
            MappingType::Merged => "Merged",
            MappingType::IfEmpty => "IfEmpty",
            MappingType::Split => "Split",
            MappingType::Absent => "Absent",
            MappingType::Missing => "Missing",
        }
    }
}

impl fmt::Display for MappingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MappingType {
    type Err = ValidationError;

    /// Accepts the canonical names plus the dataset's action wording
    /// (`Keep verse`, `Renumber verse`, `MergedPrev verse`, `Empty verse`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let folded: String = s
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let folded = folded.strip_suffix("verse").unwrap_or(&folded);
        match folded {
            "standard" | "keep" => Ok(MappingType::Standard),
            "renumber" => Ok(MappingType::Renumber),
            "merged" | "mergedprev" | "mergednext" | "merge" => Ok(MappingType::Merged),
            "ifempty" => Ok(MappingType::IfEmpty),
            "split" => Ok(MappingType::Split),
            "absent" => Ok(MappingType::Absent),
            "missing" | "empty" => Ok(MappingType::Missing),
            _ => Err(ValidationError::invalid("mapping_type", s.trim())),
        }
    }
}

/// Whether a mapping must be applied or may be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Category {
    Optional,
    Necessary,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Optional => "Optional",
            Category::Necessary => "Necessary",
        }
    }

    /// Derive the category from a note marker such as `Opt.1` or `Nec.`.
    pub fn from_note_marker(marker: &str) -> Option<Category> {
        let lower = marker.trim().to_lowercase();
        if lower.starts_with("opt") {
            Some(Category::Optional)
        } else if lower.starts_with("nec") {
            Some(Category::Necessary)
        } else {
            None
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "optional" | "opt" => Ok(Category::Optional),
            "necessary" | "nec" => Ok(Category::Necessary),
            _ => Err(ValidationError::invalid("category", s.trim())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RuleType {
    Conditional,
    Structural,
}

impl RuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleType::Conditional => "conditional",
            RuleType::Structural => "structural",
        }
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "conditional" => Ok(RuleType::Conditional),
            "structural" => Ok(RuleType::Structural),
            _ => Err(ValidationError::invalid("rule_type", s.trim())),
        }
    }
}

/// One versification correspondence between a source tradition and a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mapping {
    pub source_tradition: String,
    pub target_tradition: String,
    pub source_book: BookCode,
    pub source_chapter: u32,
    pub source_verse: u32,
    pub source_subverse: Option<String>,
    pub target_book: BookCode,
    pub target_chapter: u32,
    pub target_verse: u32,
    pub target_subverse: Option<String>,
    pub mapping_type: MappingType,
    pub category: Category,
    pub manuscript_marker: Option<String>,
    pub note_marker: Option<String>,
    pub ancient_versions: Option<String>,
    pub notes: String,
    /// Full source range text when the row covers several verses.
    pub source_range_note: Option<String>,
    pub target_range_note: Option<String>,
}

/// A conditional or structural directive from the dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rule {
    pub rule_type: RuleType,
    pub source_tradition: String,
    pub target_tradition: String,
    pub pattern: String,
    pub description: Option<String>,
}

/// Free-text commentary carried alongside the tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Documentation {
    pub section_title: Option<String>,
    pub content: String,
    pub category: String,
    pub related_sections: Option<Vec<String>>,
    pub notes: Option<String>,
}

/// One verse of a source tradition awaiting normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceVerseRow {
    pub id: RowId,
    pub source_tradition: String,
    /// Book as stored by whoever loaded the row; may be any known spelling.
    pub book_id: String,
    pub chapter: u32,
    pub verse: u32,
    pub subverse: Option<String>,
    pub text: String,
    pub dealt_with: bool,
}

/// A source verse before the store has assigned it an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSourceRow {
    pub source_tradition: String,
    pub book_id: String,
    pub chapter: u32,
    pub verse: u32,
    pub subverse: Option<String>,
    pub text: String,
}

/// Case- and whitespace-insensitive form of a tradition name, used for
/// lookups and for ranking traditions against each other.
pub fn tradition_key(tradition: &str) -> String {
    tradition.trim().to_lowercase()
}

/// How a [`StandardVerseRow`] is written. See [`crate::resolve`] for what
/// happens when a row already exists at the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WriteMode {
    /// Insert, or replace text and notes of the existing row.
    Upsert,
    /// Insert, or join onto the text already stored at the key. Produced by
    /// `Merged` mappings.
    Append,
    /// Insert only when nothing exists at the key yet. A row stored this way
    /// is a placeholder that any later `Upsert` or `Append` replaces.
    InsertIfAbsent,
}

impl WriteMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteMode::Upsert => "upsert",
            WriteMode::Append => "append",
            WriteMode::InsertIfAbsent => "insert_if_absent",
        }
    }
}

impl FromStr for WriteMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "upsert" => Ok(WriteMode::Upsert),
            "append" => Ok(WriteMode::Append),
            "insert_if_absent" => Ok(WriteMode::InsertIfAbsent),
            other => Err(ValidationError::invalid("write_mode", other)),
        }
    }
}

/// A verse in the canonical numbering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StandardVerseRow {
    pub target_tradition: String,
    pub book_id: BookCode,
    pub chapter: u32,
    pub verse: u32,
    pub subverse: Option<String>,
    pub text: String,
    pub notes: String,
    pub write_mode: WriteMode,
    /// Tradition whose verse produced this row.
    pub source_tradition: String,
}

/// Natural key of a Standard row.
pub type StandardKey = (String, BookCode, u32, u32, Option<String>);

impl StandardVerseRow {
    pub fn key(&self) -> StandardKey {
        (
            self.target_tradition.clone(),
            self.book_id,
            self.chapter,
            self.verse,
            self.subverse.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping_type_accepts_dataset_wording() {
        assert_eq!("Keep verse".parse::<MappingType>().unwrap(), MappingType::Standard);
        assert_eq!("Renumber verse".parse::<MappingType>().unwrap(), MappingType::Renumber);
        assert_eq!("MergedPrev verse".parse::<MappingType>().unwrap(), MappingType::Merged);
        assert_eq!("IfEmpty Verse".parse::<MappingType>().unwrap(), MappingType::IfEmpty);
        assert_eq!("Empty verse".parse::<MappingType>().unwrap(), MappingType::Missing);
        for t in MappingType::ALL {
            assert_eq!(t.as_str().parse::<MappingType>().unwrap(), t);
        }
    }

    #[test]
    fn unknown_mapping_type_is_an_error() {
        let err = "Shuffle verse".parse::<MappingType>().unwrap_err();
        assert_eq!(err.to_string(), "invalid mapping_type: Shuffle verse");
    }

    #[test]
    fn category_parsing() {
        assert_eq!("Necessary".parse::<Category>().unwrap(), Category::Necessary);
        assert_eq!("opt".parse::<Category>().unwrap(), Category::Optional);
        let err = "Bogus".parse::<Category>().unwrap_err();
        assert!(err.to_string().contains("category"));
        assert_eq!(Category::from_note_marker("Opt.2"), Some(Category::Optional));
        assert_eq!(Category::from_note_marker("Nec."), Some(Category::Necessary));
        assert_eq!(Category::from_note_marker("Acd."), None);
    }

    #[test]
    fn rule_type_parsing() {
        assert_eq!("Structural".parse::<RuleType>().unwrap(), RuleType::Structural);
        assert!("sometimes".parse::<RuleType>().is_err());
    }
}

//! Tolerant line-oriented parser for versification datasets.
//!
//! A dataset is free text with one tabular block embedded in it:
//!
//! ```text
//! Any preamble text, ignored.
//! #DataStart(Expanded)
//! '= comment lines may appear anywhere
//! SourceType	SourceRef	StandardRef	Action	Category	Notes
//! Latin	Psa.142:12	Psa.143:12	Renumber verse	Necessary	Vulgate numbering
//! #DataEnd(Expanded)
//! Anything after the end marker is ignored.
//! ```
//!
//! The parser is a small state machine fed one line at a time:
//!
//! ```text
//! Seeking ──start marker──▶ AwaitingHeader ──first real line──▶ ReadingData ──end marker──▶ Ended
//! ```
//!
//! Fields are separated by a tab, or by a run of two or more spaces when the
//! line has no tabs. A row whose field count differs from the header, that
//! cannot be classified, or that fails validation becomes an [`Issue`] and
//! parsing carries on. So does a `Split` row naming a target subverse that an
//! earlier row already split the same source verse into. The only fatal
//! condition is a missing start marker.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io::BufRead;

use thiserror::Error;
use tracing::debug;

use crate::books::BookCode;
use crate::models::{
    tradition_key, Category, Documentation, Mapping, MappingType, Rule, RuleType,
    STANDARD_TRADITION,
};
use crate::reference::{parse_ref_span, ReferenceError, RefSpan};
use crate::validate::{Validate, ValidationError};

pub const DEFAULT_START_MARKER: &str = "#DataStart(Expanded)";
pub const DEFAULT_END_MARKER: &str = "#DataEnd(Expanded)";
pub const DEFAULT_COMMENT_PREFIX: &str = "'=";

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("start marker '{0}' not found; not a versification dataset")]
    StartMarkerNotFound(String),
    #[error("failed to read dataset: {0}")]
    Io(#[from] std::io::Error),
}

/// Markers and prefixes that frame the tabular block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserOptions {
    pub start_marker: String,
    pub end_marker: String,
    pub comment_prefix: String,
    /// Target tradition used when a row has no `StandardType` column.
    pub default_target_tradition: String,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            start_marker: DEFAULT_START_MARKER.to_string(),
            end_marker: DEFAULT_END_MARKER.to_string(),
            comment_prefix: DEFAULT_COMMENT_PREFIX.to_string(),
            default_target_tradition: STANDARD_TRADITION.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    Seeking,
    AwaitingHeader,
    ReadingData,
    Ended,
}

/// Why a line was not accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueKind {
    ColumnCount { expected: usize, actual: usize },
    Unclassified,
    BadReference(ReferenceError),
    Invalid(ValidationError),
    /// A `Split` row repeats a target subverse for the same source verse.
    DuplicateSplit { subverse: String },
}

/// A line that was read but not turned into a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub line_number: usize,
    pub raw: String,
    pub kind: IssueKind,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: ", self.line_number)?;
        match &self.kind {
            IssueKind::ColumnCount { expected, actual } => {
                write!(f, "expected {} fields, found {}", expected, actual)
            }
            IssueKind::Unclassified => f.write_str("row is not a mapping, rule or documentation"),
            IssueKind::BadReference(e) => write!(f, "{}", e),
            IssueKind::Invalid(e) => write!(f, "{}", e),
            IssueKind::DuplicateSplit { subverse } => {
                write!(f, "split target subverse '{}' is already used for this source verse", subverse)
            }
        }
    }
}

/// A classified, validated row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedRecord {
    Mapping(Mapping),
    Rule(Rule),
    Documentation(Documentation),
}

/// Everything the parser produced, in input order.
#[derive(Debug, Default)]
pub struct ParseOutput {
    pub mappings: Vec<Mapping>,
    pub rules: Vec<Rule>,
    pub docs: Vec<Documentation>,
    pub issues: Vec<Issue>,
    pub lines_read: usize,
    /// Data lines seen inside the block, accepted or not.
    pub rows_seen: usize,
}

impl ParseOutput {
    pub fn accepted(&self) -> usize {
        self.mappings.len() + self.rules.len() + self.docs.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Column {
    RowType,
    SourceType,
    SourceRef,
    TargetType,
    TargetRef,
    Action,
    Category,
    NoteMarker,
    ManuscriptMarker,
    Notes,
    AncientVersions,
    RuleType,
    Pattern,
    Description,
    Section,
    Content,
    DocCategory,
    Related,
    Other(String),
}

impl Column {
    fn from_header(name: &str) -> Column {
        let folded: String = name
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect();
        match folded.as_str() {
            "rowtype" | "recordtype" | "kind" => Column::RowType,
            "sourcetype" | "sourcetradition" => Column::SourceType,
            "sourceref" | "sourcereference" => Column::SourceRef,
            "standardtype" | "targettype" | "targettradition" => Column::TargetType,
            "standardref" | "standardreference" | "targetref" => Column::TargetRef,
            "action" | "mappingtype" => Column::Action,
            "category" => Column::Category,
            "notemarker" => Column::NoteMarker,
            "manuscriptmarker" | "msmarker" => Column::ManuscriptMarker,
            "notes" | "note" | "notea" => Column::Notes,
            "ancientversions" => Column::AncientVersions,
            "ruletype" => Column::RuleType,
            "pattern" => Column::Pattern,
            "description" => Column::Description,
            "section" | "sectiontitle" => Column::Section,
            "content" => Column::Content,
            "doccategory" => Column::DocCategory,
            "related" | "relatedsections" => Column::Related,
            _ => Column::Other(folded),
        }
    }
}

/// One data line zipped against the header.
struct Row<'a> {
    fields: HashMap<&'a Column, &'a str>,
}

impl<'a> Row<'a> {
    /// Trimmed, non-empty value of a column.
    fn get(&self, column: &Column) -> Option<&'a str> {
        self.fields
            .get(column)
            .copied()
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    fn owned(&self, column: &Column) -> Option<String> {
        self.get(column).map(str::to_string)
    }
}

/// Streaming parser; feed it lines, then call [`DatasetParser::finish`].
pub struct DatasetParser {
    options: ParserOptions,
    state: ParserState,
    header: Vec<Column>,
    line_number: usize,
    output: ParseOutput,
    split_targets: HashSet<SplitTarget>,
}

/// One split piece: source verse plus the target verse and subverse it fills.
type SplitTarget = (String, BookCode, u32, u32, Option<String>, u32, u32, Option<String>);

fn split_target(m: &Mapping) -> SplitTarget {
    (
        tradition_key(&m.source_tradition),
        m.source_book,
        m.source_chapter,
        m.source_verse,
        m.source_subverse.clone(),
        m.target_chapter,
        m.target_verse,
        m.target_subverse.clone(),
    )
}

impl DatasetParser {
    pub fn new(options: ParserOptions) -> Self {
        Self {
            options,
            state: ParserState::Seeking,
            header: Vec::new(),
            line_number: 0,
            output: ParseOutput::default(),
            split_targets: HashSet::new(),
        }
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    pub fn feed_line(&mut self, line: &str) {
        self.line_number += 1;
        let line = line.trim_end_matches(['\r', '\n']);
        let trimmed = line.trim();

        match self.state {
            ParserState::Seeking => {
                if trimmed == self.options.start_marker {
                    self.state = ParserState::AwaitingHeader;
                }
            }
            ParserState::AwaitingHeader => {
                if trimmed == self.options.end_marker {
                    self.state = ParserState::Ended;
                } else if !self.is_skippable(trimmed) {
                    self.header = split_fields(line)
                        .into_iter()
                        .map(Column::from_header)
                        .collect();
                    self.state = ParserState::ReadingData;
                }
            }
            ParserState::ReadingData => {
                if trimmed == self.options.end_marker {
                    self.state = ParserState::Ended;
                } else if !self.is_skippable(trimmed) {
                    self.output.rows_seen += 1;
                    match self.parse_data_line(line) {
                        Ok(record) => self.accept(line, record),
                        Err(kind) => self.reject(line, kind),
                    }
                }
            }
            ParserState::Ended => {}
        }
    }

    pub fn finish(mut self) -> Result<ParseOutput, ParseError> {
        if self.state == ParserState::Seeking {
            return Err(ParseError::StartMarkerNotFound(self.options.start_marker));
        }
        self.output.lines_read = self.line_number;
        Ok(self.output)
    }

    fn is_skippable(&self, trimmed: &str) -> bool {
        trimmed.is_empty()
            || trimmed.starts_with(self.options.comment_prefix.as_str())
            || trimmed.starts_with('#')
    }

    fn accept(&mut self, line: &str, record: ParsedRecord) {
        match record {
            ParsedRecord::Mapping(m) if m.mapping_type == MappingType::Split => {
                if self.split_targets.insert(split_target(&m)) {
                    self.output.mappings.push(m);
                } else {
                    let subverse = m.target_subverse.unwrap_or_default();
                    self.reject(line, IssueKind::DuplicateSplit { subverse });
                }
            }
            ParsedRecord::Mapping(m) => self.output.mappings.push(m),
            ParsedRecord::Rule(r) => self.output.rules.push(r),
            ParsedRecord::Documentation(d) => self.output.docs.push(d),
        }
    }

    fn reject(&mut self, line: &str, kind: IssueKind) {
        let issue = Issue {
            line_number: self.line_number,
            raw: line.to_string(),
            kind,
        };
        debug!("dataset issue: {}", issue);
        self.output.issues.push(issue);
    }

    fn parse_data_line(&self, line: &str) -> Result<ParsedRecord, IssueKind> {
        let fields = split_fields(line);
        if fields.len() != self.header.len() {
            return Err(IssueKind::ColumnCount {
                expected: self.header.len(),
                actual: fields.len(),
            });
        }
        let row = Row {
            fields: self.header.iter().zip(fields).collect(),
        };

        let record = match classify(&row)? {
            RowKind::Mapping => ParsedRecord::Mapping(self.build_mapping(&row)?),
            RowKind::Rule => ParsedRecord::Rule(self.build_rule(&row)?),
            RowKind::Documentation => ParsedRecord::Documentation(build_documentation(&row)?),
        };
        Ok(record)
    }

    fn target_tradition(&self, row: &Row<'_>) -> String {
        row.owned(&Column::TargetType)
            .unwrap_or_else(|| self.options.default_target_tradition.clone())
    }

    fn build_mapping(&self, row: &Row<'_>) -> Result<Mapping, IssueKind> {
        let source_raw = row
            .get(&Column::SourceRef)
            .ok_or(IssueKind::Invalid(ValidationError::MissingField("source_reference")))?;
        let source = parse_ref_span(source_raw).map_err(IssueKind::BadReference)?;
        let (target_raw, target) = match row.get(&Column::TargetRef) {
            Some(raw) => (raw, parse_ref_span(raw).map_err(IssueKind::BadReference)?),
            None => (source_raw, source.clone()),
        };

        let mapping_type: MappingType = row
            .get(&Column::Action)
            .ok_or(ValidationError::MissingField("mapping_type"))
            .and_then(|raw| raw.parse())
            .map_err(IssueKind::Invalid)?;

        let note_marker = row.owned(&Column::NoteMarker);
        let category = match row.get(&Column::Category) {
            Some(raw) => raw.parse::<Category>().map_err(IssueKind::Invalid)?,
            None => note_marker
                .as_deref()
                .and_then(Category::from_note_marker)
                .ok_or(IssueKind::Invalid(ValidationError::MissingField("category")))?,
        };

        let (source_range_note, target_range_note) = range_notes(&source, source_raw, &target, target_raw);

        let mapping = Mapping {
            source_tradition: row.owned(&Column::SourceType).unwrap_or_default(),
            target_tradition: self.target_tradition(row),
            source_book: source.start.book,
            source_chapter: source.start.chapter,
            source_verse: source.start.verse,
            source_subverse: source.start.subverse.clone(),
            target_book: target.start.book,
            target_chapter: target.start.chapter,
            target_verse: target.start.verse,
            target_subverse: target.start.subverse.clone(),
            mapping_type,
            category,
            manuscript_marker: row.owned(&Column::ManuscriptMarker),
            note_marker,
            ancient_versions: row.owned(&Column::AncientVersions),
            notes: row.owned(&Column::Notes).unwrap_or_default(),
            source_range_note,
            target_range_note,
        };
        mapping.validate().map_err(IssueKind::Invalid)?;
        Ok(mapping)
    }

    fn build_rule(&self, row: &Row<'_>) -> Result<Rule, IssueKind> {
        let rule_type: RuleType = row
            .get(&Column::RuleType)
            .ok_or(ValidationError::MissingField("rule_type"))
            .and_then(|raw| raw.parse())
            .map_err(IssueKind::Invalid)?;
        let rule = Rule {
            rule_type,
            source_tradition: row.owned(&Column::SourceType).unwrap_or_default(),
            target_tradition: self.target_tradition(row),
            pattern: row.owned(&Column::Pattern).unwrap_or_default(),
            description: row.owned(&Column::Description),
        };
        rule.validate().map_err(IssueKind::Invalid)?;
        Ok(rule)
    }
}

enum RowKind {
    Mapping,
    Rule,
    Documentation,
}

fn classify(row: &Row<'_>) -> Result<RowKind, IssueKind> {
    if let Some(kind) = row.get(&Column::RowType) {
        return match kind.to_lowercase().as_str() {
            "mapping" | "map" => Ok(RowKind::Mapping),
            "rule" => Ok(RowKind::Rule),
            "doc" | "docs" | "documentation" => Ok(RowKind::Documentation),
            _ => Err(IssueKind::Unclassified),
        };
    }
    if row.get(&Column::Pattern).is_some() {
        Ok(RowKind::Rule)
    } else if row.get(&Column::Content).is_some() {
        Ok(RowKind::Documentation)
    } else if row.get(&Column::SourceRef).is_some() {
        Ok(RowKind::Mapping)
    } else {
        Err(IssueKind::Unclassified)
    }
}

fn build_documentation(row: &Row<'_>) -> Result<Documentation, IssueKind> {
    let category = row
        .get(&Column::DocCategory)
        .or_else(|| row.get(&Column::Category))
        .map(str::to_lowercase)
        .unwrap_or_else(|| "general".to_string());
    let related_sections = row.get(&Column::Related).and_then(|raw| {
        let parts: Vec<String> = raw
            .split([',', ';'])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        (!parts.is_empty()).then_some(parts)
    });
    let doc = Documentation {
        section_title: row.owned(&Column::Section),
        content: row.owned(&Column::Content).unwrap_or_default(),
        category,
        related_sections,
        notes: row.owned(&Column::Notes),
    };
    doc.validate().map_err(IssueKind::Invalid)?;
    Ok(doc)
}

/// Range notes are kept on both sides whenever either side is a range.
fn range_notes(
    source: &RefSpan,
    source_raw: &str,
    target: &RefSpan,
    target_raw: &str,
) -> (Option<String>, Option<String>) {
    if source.is_range() || target.is_range() {
        (Some(source_raw.to_string()), Some(target_raw.to_string()))
    } else {
        (None, None)
    }
}

/// Split a line on tabs, or on runs of two or more spaces if it has no tabs.
fn split_fields(line: &str) -> Vec<&str> {
    if line.contains('\t') {
        return line.split('\t').map(str::trim).collect();
    }
    let mut fields = Vec::new();
    let mut rest = line.trim();
    while let Some(pos) = rest.find("  ") {
        fields.push(rest[..pos].trim());
        rest = rest[pos..].trim_start();
    }
    if !rest.is_empty() || fields.is_empty() {
        fields.push(rest);
    }
    fields
}

/// Parse a whole dataset held in memory.
pub fn parse_str(input: &str, options: &ParserOptions) -> Result<ParseOutput, ParseError> {
    let mut parser = DatasetParser::new(options.clone());
    for line in input.lines() {
        parser.feed_line(line);
    }
    parser.finish()
}

/// Parse a dataset from any buffered reader, line by line.
pub fn parse_reader<R: BufRead>(reader: R, options: &ParserOptions) -> Result<ParseOutput, ParseError> {
    let mut parser = DatasetParser::new(options.clone());
    for line in reader.lines() {
        parser.feed_line(&line?);
    }
    parser.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "SourceType\tSourceRef\tStandardRef\tAction\tCategory\tNotes";

    fn dataset(rows: &[&str]) -> String {
        let mut s = String::from("Preamble about the dataset.\n#DataStart(Expanded)\n'= comment\n\n");
        s.push_str(HEADER);
        s.push('\n');
        for row in rows {
            s.push_str(row);
            s.push('\n');
        }
        s.push_str("#DataEnd(Expanded)\nLatin\tPsa.1:1\tPsa.1:1\tKeep verse\tNecessary\tafter end\n");
        s
    }

    fn parse(input: &str) -> ParseOutput {
        parse_str(input, &ParserOptions::default()).unwrap()
    }

    #[test]
    fn parses_mappings_between_markers() {
        let out = parse(&dataset(&[
            "Latin\tPsa.142:12\tPsa.143:12\tRenumber verse\tNecessary\tVulgate numbering",
            "Hebrew\tMal.3:19\tMal.4:1\tRenumber verse\tOptional\t",
        ]));
        assert_eq!(out.mappings.len(), 2);
        assert!(out.issues.is_empty());
        assert_eq!(out.rows_seen, 2);

        let m = &out.mappings[0];
        assert_eq!(m.source_tradition, "Latin");
        assert_eq!(m.target_tradition, "Standard");
        assert_eq!((m.source_chapter, m.source_verse), (142, 12));
        assert_eq!((m.target_chapter, m.target_verse), (143, 12));
        assert_eq!(m.mapping_type, MappingType::Renumber);
        assert_eq!(m.category, Category::Necessary);
        assert_eq!(m.notes, "Vulgate numbering");
        assert_eq!(out.mappings[1].notes, "");
    }

    #[test]
    fn extra_field_becomes_one_issue() {
        let input = dataset(&[
            "Latin\tPsa.142:12\tPsa.143:12\tRenumber verse\tNecessary\tok",
            "Latin\tPsa.142:13\tPsa.143:13\tRenumber verse\tNecessary\tok\textra",
            "Latin\tPsa.142:14\tPsa.143:14\tRenumber verse\tNecessary\tok",
        ]);
        let out = parse(&input);
        assert_eq!(out.mappings.len(), 2);
        assert_eq!(out.issues.len(), 1);
        let issue = &out.issues[0];
        // preamble, start, comment, blank, header, row 1, row 2
        assert_eq!(issue.line_number, 7);
        assert_eq!(issue.kind, IssueKind::ColumnCount { expected: 6, actual: 7 });
        assert!(issue.raw.contains("Psa.142:13"));
        assert!(issue.to_string().starts_with("line 7:"));
    }

    #[test]
    fn bogus_category_is_rejected() {
        let out = parse(&dataset(&[
            "Latin\tPsa.142:12\tPsa.143:12\tRenumber verse\tBogus\t",
        ]));
        assert!(out.mappings.is_empty());
        assert_eq!(out.issues.len(), 1);
        match &out.issues[0].kind {
            IssueKind::Invalid(e) => assert!(e.to_string().contains("category")),
            other => panic!("unexpected issue: {:?}", other),
        }
    }

    #[test]
    fn invalid_chapter_and_book_are_issues() {
        let out = parse(&dataset(&[
            "Latin\tPsa.0:12\tPsa.143:12\tRenumber verse\tNecessary\t",
            "Latin\tXyz.1:1\tPsa.1:1\tKeep verse\tNecessary\t",
            "\tPsa.1:1\tPsa.1:1\tKeep verse\tNecessary\t",
        ]));
        assert!(out.mappings.is_empty());
        assert_eq!(out.issues.len(), 3);
        assert_eq!(
            out.issues[0].kind,
            IssueKind::Invalid(ValidationError::invalid("source_chapter", 0))
        );
        assert!(matches!(
            out.issues[1].kind,
            IssueKind::BadReference(ReferenceError::UnknownBook(_))
        ));
        assert_eq!(
            out.issues[2].kind,
            IssueKind::Invalid(ValidationError::MissingField("source_tradition"))
        );
    }

    #[test]
    fn repeated_split_target_is_an_issue() {
        let out = parse(&dataset(&[
            "Greek\tPsa.13:6\tPsa.13:6!a\tSplit verse\tNecessary\t",
            "Greek\tPsa.13:6\tPsa.13:6!b\tSplit verse\tNecessary\t",
            "Greek\tPsa.13:6\tPsa.13:6!a\tSplit verse\tNecessary\tagain",
            "Latin\tPsa.13:6\tPsa.13:6!a\tSplit verse\tNecessary\t",
        ]));
        assert_eq!(out.mappings.len(), 3);
        assert_eq!(out.issues.len(), 1);
        assert_eq!(
            out.issues[0].kind,
            IssueKind::DuplicateSplit { subverse: "a".into() }
        );
        assert!(out.issues[0].raw.ends_with("again"));
        assert!(out.issues[0].to_string().contains("'a'"));
    }

    #[test]
    fn missing_start_marker_is_fatal() {
        let err = parse_str("SourceType\tSourceRef\nLatin\tPsa.1:1\n", &ParserOptions::default())
            .unwrap_err();
        assert!(matches!(err, ParseError::StartMarkerNotFound(_)));
    }

    #[test]
    fn missing_end_marker_keeps_rows() {
        let input = format!(
            "#DataStart(Expanded)\n{}\nLatin\tPsa.1:1\tPsa.1:1\tKeep verse\tNecessary\t\n",
            HEADER
        );
        let out = parse(&input);
        assert_eq!(out.mappings.len(), 1);
    }

    #[test]
    fn multi_space_delimiter() {
        let input = "#DataStart(Expanded)\n\
            SourceType  SourceRef  StandardRef  Action  NoteMarker\n\
            English KJV  Psa.3:1  Psa.3:1  Keep verse  Opt.1\n\
            #DataEnd(Expanded)\n";
        let out = parse(input);
        assert_eq!(out.issues, vec![]);
        assert_eq!(out.mappings.len(), 1);
        assert_eq!(out.mappings[0].source_tradition, "English KJV");
        assert_eq!(out.mappings[0].category, Category::Optional);
        assert_eq!(out.mappings[0].note_marker.as_deref(), Some("Opt.1"));
    }

    #[test]
    fn classifies_rules_and_documentation() {
        let input = "#DataStart(Expanded)\n\
            RowType\tSourceType\tSourceRef\tStandardRef\tAction\tCategory\tRuleType\tPattern\tSection\tContent\tRelated\n\
            mapping\tGreek\tPsa.9:22-39\tPsa.10:1-18\tRenumber verse\tNecessary\t\t\t\t\t\n\
            rule\tGreek\t\t\t\t\tconditional\tif Psa.9 has 39 verses\t\t\t\n\
            doc\t\t\t\t\tmethodology\t\t\tIntro\tHow the tables are built.\tOverview, Sources\n\
            widget\t\t\t\t\t\t\t\t\t\t\n\
            #DataEnd(Expanded)\n";
        let out = parse(input);
        assert_eq!(out.mappings.len(), 1);
        assert_eq!(out.rules.len(), 1);
        assert_eq!(out.docs.len(), 1);
        assert_eq!(out.issues.len(), 1);
        assert_eq!(out.issues[0].kind, IssueKind::Unclassified);

        let m = &out.mappings[0];
        assert_eq!(m.source_range_note.as_deref(), Some("Psa.9:22-39"));
        assert_eq!(m.target_range_note.as_deref(), Some("Psa.10:1-18"));

        assert_eq!(out.rules[0].rule_type, RuleType::Conditional);
        assert_eq!(out.rules[0].pattern, "if Psa.9 has 39 verses");

        let doc = &out.docs[0];
        assert_eq!(doc.category, "methodology");
        assert_eq!(doc.section_title.as_deref(), Some("Intro"));
        assert_eq!(
            doc.related_sections,
            Some(vec!["Overview".to_string(), "Sources".to_string()])
        );
    }

    #[test]
    fn inferred_kinds_without_row_type_column() {
        let input = "#DataStart(Expanded)\n\
            SourceType\tSourceRef\tAction\tNoteMarker\tRuleType\tPattern\tContent\n\
            Latin\tPsa.1:1\tKeep\tNec.\t\t\t\n\
            Latin\t\t\t\tstructural\tpsalm titles are verse 0\t\n\
            \t\t\t\t\t\tFree text.\n\
            \t\t\t\t\t\t\n\
            Latin\t\t\t\t\t\t\n\
            #DataEnd(Expanded)\n";
        let out = parse(input);
        assert_eq!(out.mappings.len(), 1);
        assert_eq!(out.mappings[0].target_book.as_str(), "Psa");
        assert_eq!(out.rules.len(), 1);
        assert_eq!(out.docs.len(), 1);
        assert_eq!(out.docs[0].category, "general");
        // The tab-only line is blank; the tradition-only line has nothing to classify.
        assert_eq!(out.issues.len(), 1);
        assert_eq!(out.issues[0].kind, IssueKind::Unclassified);
    }

    #[test]
    fn state_transitions() {
        let mut parser = DatasetParser::new(ParserOptions::default());
        parser.feed_line("intro");
        assert_eq!(parser.state(), ParserState::Seeking);
        parser.feed_line("#DataStart(Expanded)");
        assert_eq!(parser.state(), ParserState::AwaitingHeader);
        parser.feed_line("'= still a comment");
        parser.feed_line("");
        assert_eq!(parser.state(), ParserState::AwaitingHeader);
        parser.feed_line(HEADER);
        assert_eq!(parser.state(), ParserState::ReadingData);
        parser.feed_line("#DataEnd(Expanded)");
        assert_eq!(parser.state(), ParserState::Ended);
        parser.feed_line("Latin\tPsa.1:1\tPsa.1:1\tKeep verse\tNecessary\t");
        let out = parser.finish().unwrap();
        assert_eq!(out.rows_seen, 0);
        assert_eq!(out.lines_read, 7);
    }

    #[test]
    fn reader_and_str_agree() {
        let input = dataset(&["Latin\tPsa.142:12\tPsa.143:12\tRenumber verse\tNecessary\tx"]);
        let a = parse(&input);
        let b = parse_reader(input.as_bytes(), &ParserOptions::default()).unwrap();
        assert_eq!(a.mappings, b.mappings);
        assert_eq!(a.lines_read, b.lines_read);
    }

    #[test]
    fn split_fields_on_spaces() {
        assert_eq!(split_fields("a  b   c"), vec!["a", "b", "c"]);
        assert_eq!(split_fields("English KJV  Psa.1:1"), vec!["English KJV", "Psa.1:1"]);
        assert_eq!(split_fields("a\t\tc"), vec!["a", "", "c"]);
    }
}

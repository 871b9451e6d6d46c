//! Field-level and cross-field validation for the versification records.
//!
//! The parser validates every record right after building it and routes
//! failures to its issue list, so one bad row never blocks the rest of an
//! ingest. Store implementations validate again before writing.

use thiserror::Error;

use crate::models::{Documentation, Mapping, Rule, DOC_CATEGORIES};

/// Why a record was rejected. Messages always name the offending field.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("required field {0} is missing")]
    MissingField(&'static str),
    #[error("invalid {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
    #[error("source_range_note and target_range_note must be present together")]
    UnpairedRangeNotes,
}

impl ValidationError {
    pub fn invalid(field: &'static str, value: impl ToString) -> Self {
        ValidationError::InvalidValue {
            field,
            value: value.to_string(),
        }
    }

    /// The field the error is about, if any.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            ValidationError::MissingField(f) => Some(f),
            ValidationError::InvalidValue { field, .. } => Some(field),
            ValidationError::UnpairedRangeNotes => None,
        }
    }
}

pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::MissingField(field))
    } else {
        Ok(())
    }
}

fn positive(field: &'static str, value: u32) -> Result<(), ValidationError> {
    if value == 0 {
        Err(ValidationError::invalid(field, value))
    } else {
        Ok(())
    }
}

impl Validate for Mapping {
    fn validate(&self) -> Result<(), ValidationError> {
        require("source_tradition", &self.source_tradition)?;
        require("target_tradition", &self.target_tradition)?;
        positive("source_chapter", self.source_chapter)?;
        positive("source_verse", self.source_verse)?;
        positive("target_chapter", self.target_chapter)?;
        positive("target_verse", self.target_verse)?;
        for (field, sub) in [
            ("source_subverse", &self.source_subverse),
            ("target_subverse", &self.target_subverse),
        ] {
            if let Some(s) = sub {
                if s.trim().is_empty() {
                    return Err(ValidationError::invalid(field, "''"));
                }
            }
        }
        if self.source_range_note.is_some() != self.target_range_note.is_some() {
            return Err(ValidationError::UnpairedRangeNotes);
        }
        Ok(())
    }
}

impl Validate for Rule {
    fn validate(&self) -> Result<(), ValidationError> {
        require("source_tradition", &self.source_tradition)?;
        require("pattern", &self.pattern)?;
        Ok(())
    }
}

impl Validate for Documentation {
    fn validate(&self) -> Result<(), ValidationError> {
        require("content", &self.content)?;
        if !DOC_CATEGORIES.contains(&self.category.as_str()) {
            return Err(ValidationError::invalid("category", &self.category));
        }
        Ok(())
    }
}

//! What happens when a Standard row lands on a key that is already taken.
//!
//! Batch consolidation and both stores go through [`settle`], so the final
//! content of `standard_table` is the same however rows were packed into
//! batches, whichever worker finished first, and however many runs it took.
//!
//! | Stored row | Incoming row | Outcome |
//! |------------|--------------|---------|
//! | none | any | insert |
//! | placeholder (`InsertIfAbsent`) | `Upsert` / `Append` | replace |
//! | placeholder | placeholder | replace if the incoming tradition ranks higher |
//! | settled (`Upsert` / `Append`) | placeholder | keep |
//! | settled, same tradition | `Upsert` onto `Upsert` | replace |
//! | settled, same tradition | any other pair | join text in arrival order |
//! | settled, other tradition | `Upsert` / `Append` | replace if the incoming tradition ranks higher |
//!
//! Traditions rank by [`tradition_key`]: a source written in the target
//! tradition itself ranks first, then names in ascending order.

use crate::models::{tradition_key, StandardVerseRow, WriteMode};

/// Decision for one incoming row against the row already stored at its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Insert,
    Keep,
    Replace,
    Join,
}

fn rank(row: &StandardVerseRow) -> (bool, String) {
    let key = tradition_key(&row.source_tradition);
    (key != tradition_key(&row.target_tradition), key)
}

fn outranks(incoming: &StandardVerseRow, existing: &StandardVerseRow) -> bool {
    rank(incoming) < rank(existing)
}

fn same_tradition(a: &StandardVerseRow, b: &StandardVerseRow) -> bool {
    tradition_key(&a.source_tradition) == tradition_key(&b.source_tradition)
}

pub fn resolve(existing: Option<&StandardVerseRow>, incoming: &StandardVerseRow) -> Resolution {
    let Some(existing) = existing else {
        return Resolution::Insert;
    };
    let placeholder = existing.write_mode == WriteMode::InsertIfAbsent;
    match (placeholder, incoming.write_mode) {
        (true, WriteMode::InsertIfAbsent) if outranks(incoming, existing) => Resolution::Replace,
        (true, WriteMode::InsertIfAbsent) => Resolution::Keep,
        (true, _) => Resolution::Replace,
        (false, WriteMode::InsertIfAbsent) => Resolution::Keep,
        (false, _) if same_tradition(existing, incoming) => {
            if existing.write_mode == WriteMode::Upsert && incoming.write_mode == WriteMode::Upsert {
                Resolution::Replace
            } else {
                Resolution::Join
            }
        }
        (false, _) if outranks(incoming, existing) => Resolution::Replace,
        (false, _) => Resolution::Keep,
    }
}

/// The row to store after `incoming` arrives, or `None` to leave the stored
/// row untouched.
pub fn settle(existing: Option<&StandardVerseRow>, incoming: &StandardVerseRow) -> Option<StandardVerseRow> {
    match (resolve(existing, incoming), existing) {
        (Resolution::Keep, _) => None,
        (Resolution::Join, Some(existing)) => Some(join(existing, incoming)),
        _ => Some(incoming.clone()),
    }
}

fn join(existing: &StandardVerseRow, incoming: &StandardVerseRow) -> StandardVerseRow {
    let write_mode = if existing.write_mode == WriteMode::Upsert || incoming.write_mode == WriteMode::Upsert {
        WriteMode::Upsert
    } else {
        WriteMode::Append
    };
    StandardVerseRow {
        text: join_text(&existing.text, &incoming.text),
        notes: join_notes(&existing.notes, &incoming.notes),
        write_mode,
        ..existing.clone()
    }
}

pub(crate) fn join_text(a: &str, b: &str) -> String {
    match (a.is_empty(), b.is_empty()) {
        (true, _) => b.to_string(),
        (false, true) => a.to_string(),
        (false, false) => format!("{} {}", a, b),
    }
}

pub(crate) fn join_notes(a: &str, b: &str) -> String {
    match (a.trim().is_empty(), b.trim().is_empty()) {
        (true, _) => b.trim().to_string(),
        (false, true) => a.trim().to_string(),
        (false, false) => format!("{}; {}", a.trim(), b.trim()),
    }
}

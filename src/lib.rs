//! # Versemap
//!
//! **Versification mapping for Bible textual traditions.**
//!
//! Versemap reads a tabular dataset describing how verse numbering differs
//! between traditions (Hebrew, Greek, Latin, English editions), stores it in
//! SQLite, and rewrites per-tradition verse text onto a single canonical
//! numbering, the Standard tradition.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌────────────────────────┐
//! │ dataset file │──▶│    parser    │──▶│ versification_mappings │
//! └──────────────┘   └──────────────┘   └───────────┬────────────┘
//!                                                   │
//! ┌──────────────┐                      ┌───────────▼────────────┐   ┌────────────────┐
//! │ source_table │─────────────────────▶│ engine (worker pool)   │──▶│ standard_table │
//! └──────────────┘                      └────────────────────────┘   └────────────────┘
//! ```
//!
//! The pure logic (book normalization, parsing, validation, per-row mapping,
//! the store trait) lives in `versemap-core`. This crate adds the SQLite
//! store, the apply coordinator, configuration and the `vmap` CLI.
//!
//! ## Quick Start
//!
//! ```bash
//! vmap init
//! vmap ingest ./data/versification.txt
//! vmap load-source ./data/latin.tsv
//! vmap apply
//! vmap stats
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite implementation of the store trait |
//! | [`ingest`] | Dataset ingestion |
//! | [`source_load`] | Loading per-tradition verse text |
//! | [`engine`] | Parallel apply coordinator |
//! | [`apply_cmd`] | `vmap apply` wiring |
//! | [`progress`] | Apply progress reporting |
//! | [`stats`] | Database summary |
//! | [`book`] | Book name lookup |

pub mod apply_cmd;
pub mod book;
pub mod config;
pub mod db;
pub mod engine;
pub mod ingest;
pub mod migrate;
pub mod progress;
pub mod source_load;
pub mod sqlite_store;
pub mod stats;

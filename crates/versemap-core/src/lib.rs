//! # Versemap Core
//!
//! Pure logic for versemap: book normalization, reference parsing, the
//! versification dataset parser, mapping validation, the per-row mapping
//! engine, and the storage abstraction.
//!
//! This crate contains no tokio runtime, sqlx, or filesystem I/O beyond
//! reading from a caller-supplied `BufRead`. The native crate wires it to
//! SQLite and runs batches on a worker pool.

pub mod apply;
pub mod books;
pub mod models;
pub mod parser;
pub mod reference;
pub mod resolve;
pub mod store;
pub mod validate;

//! `vmap book <name>`: resolve a book name the way the engine does.

use anyhow::Result;

use versemap_core::books::{all_books, normalize_book};

pub fn run_book(name: &str) -> Result<()> {
    match normalize_book(name) {
        Some(code) => {
            println!("{}\t{}", code, code.name());
            Ok(())
        }
        None => anyhow::bail!("unknown book: {}", name.trim()),
    }
}

/// Print the full canonical book table in order.
pub fn run_book_list() {
    for code in all_books() {
        println!("{:>3}  {}\t{}", code.ordinal() + 1, code, code.name());
    }
}

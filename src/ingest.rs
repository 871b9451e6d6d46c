//! Dataset ingestion: parse a versification file and reload the mapping
//! tables from it.
//!
//! Each file is fingerprinted with SHA-256. Re-ingesting a file whose
//! fingerprint is already in `dataset_versions` is a no-op unless `--force`
//! is given. Record-level issues are logged and counted; only a missing start
//! marker aborts the command.

use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use versemap_core::parser::{parse_reader, ParseOutput};
use versemap_core::store::VersificationStore;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::{DatasetVersion, SqliteStore};

/// Hex SHA-256 of a dataset's bytes.
pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Parse dataset bytes with the configured markers.
pub fn parse_dataset(config: &Config, bytes: &[u8]) -> Result<ParseOutput> {
    let options = config.parser.options(&config.apply.target_tradition);
    let output = parse_reader(bytes, &options)?;
    Ok(output)
}

/// `vmap ingest <file>`
pub async fn run_ingest(config: &Config, path: &Path, dry_run: bool, force: bool) -> Result<()> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read dataset: {}", path.display()))?;
    let sha256 = fingerprint(&bytes);

    let output = parse_dataset(config, &bytes)
        .with_context(|| format!("Failed to parse dataset: {}", path.display()))?;

    for issue in &output.issues {
        warn!(file = %path.display(), "{}", issue);
    }

    if dry_run {
        println!("ingest {} (dry-run)", path.display());
        print_counts(&output);
        return Ok(());
    }

    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);

    if !force && store.dataset_seen(&sha256).await? {
        println!("ingest {}", path.display());
        println!("  unchanged (sha256 {}); use --force to reload", &sha256[..12]);
        println!("ok");
        store.pool().close().await;
        return Ok(());
    }

    store
        .replace_mapping_tables(&output.mappings, &output.rules, &output.docs)
        .await
        .context("Failed to replace mapping tables")?;
    store
        .record_dataset(&DatasetVersion {
            sha256: sha256.clone(),
            path: path.display().to_string(),
            mappings: output.mappings.len() as u64,
            rules: output.rules.len() as u64,
            docs: output.docs.len() as u64,
            issues: output.issues.len() as u64,
        })
        .await?;

    info!(
        file = %path.display(),
        sha256 = %sha256,
        mappings = output.mappings.len(),
        rules = output.rules.len(),
        docs = output.docs.len(),
        "dataset ingested"
    );

    println!("ingest {}", path.display());
    print_counts(&output);
    println!("  sha256: {}", sha256);
    println!("ok");

    store.pool().close().await;
    Ok(())
}

fn print_counts(output: &ParseOutput) {
    println!("  lines read: {}", output.lines_read);
    println!("  rows seen: {}", output.rows_seen);
    println!("  mappings: {}", output.mappings.len());
    println!("  rules: {}", output.rules.len());
    println!("  docs: {}", output.docs.len());
    println!("  issues: {}", output.issues.len());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_hex() {
        let a = fingerprint(b"#DataStart(Expanded)\n");
        assert_eq!(a.len(), 64);
        assert_eq!(a, fingerprint(b"#DataStart(Expanded)\n"));
        assert_ne!(a, fingerprint(b"#DataStart(Expanded)\n\n"));
    }

    #[test]
    fn missing_start_marker_is_fatal() {
        let err = parse_dataset(&Config::minimal(), b"just prose\n").unwrap_err();
        assert!(err.to_string().contains("start marker"));
    }
}

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use versemap_core::apply::BatchPlan;
use versemap_core::models::STANDARD_TRADITION;
use versemap_core::parser::{
    ParserOptions, DEFAULT_COMMENT_PREFIX, DEFAULT_END_MARKER, DEFAULT_START_MARKER,
};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub parser: ParserConfig,
    #[serde(default)]
    pub apply: ApplyConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Framing of the tabular block inside a dataset file.
#[derive(Debug, Deserialize, Clone)]
pub struct ParserConfig {
    #[serde(default = "default_start_marker")]
    pub start_marker: String,
    #[serde(default = "default_end_marker")]
    pub end_marker: String,
    #[serde(default = "default_comment_prefix")]
    pub comment_prefix: String,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            start_marker: default_start_marker(),
            end_marker: default_end_marker(),
            comment_prefix: default_comment_prefix(),
        }
    }
}

fn default_start_marker() -> String {
    DEFAULT_START_MARKER.to_string()
}
fn default_end_marker() -> String {
    DEFAULT_END_MARKER.to_string()
}
fn default_comment_prefix() -> String {
    DEFAULT_COMMENT_PREFIX.to_string()
}

impl ParserConfig {
    pub fn options(&self, target_tradition: &str) -> ParserOptions {
        ParserOptions {
            start_marker: self.start_marker.clone(),
            end_marker: self.end_marker.clone(),
            comment_prefix: self.comment_prefix.clone(),
            default_target_tradition: target_tradition.to_string(),
        }
    }
}

/// Worker pool and flush sizing for `vmap apply`.
#[derive(Debug, Deserialize, Clone)]
pub struct ApplyConfig {
    /// Upper bound on workers; the effective count is also capped by cores.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_batches_per_worker")]
    pub batches_per_worker: usize,
    #[serde(default = "default_min_batch_size")]
    pub min_batch_size: usize,
    /// Rows per store transaction when flushing results.
    #[serde(default = "default_flush_chunk_rows")]
    pub flush_chunk_rows: usize,
    #[serde(default = "default_target_tradition")]
    pub target_tradition: String,
}

impl Default for ApplyConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            batches_per_worker: default_batches_per_worker(),
            min_batch_size: default_min_batch_size(),
            flush_chunk_rows: default_flush_chunk_rows(),
            target_tradition: default_target_tradition(),
        }
    }
}

fn default_max_workers() -> usize {
    8
}
fn default_batches_per_worker() -> usize {
    4
}
fn default_min_batch_size() -> usize {
    500
}
fn default_flush_chunk_rows() -> usize {
    5000
}
fn default_target_tradition() -> String {
    STANDARD_TRADITION.to_string()
}

impl ApplyConfig {
    /// Effective worker count: `min(cores, max_workers)`, or the explicit
    /// override when one is given. `max_workers` caps both.
    pub fn workers(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or_else(num_cpus::get)
            .min(self.max_workers)
            .max(1)
    }

    pub fn batch_plan(&self, workers: usize) -> BatchPlan {
        BatchPlan {
            workers,
            batches_per_worker: self.batches_per_worker,
            min_batch_size: self.min_batch_size,
        }
    }
}

impl Config {
    /// In-code defaults for commands that run without a config file.
    pub fn minimal() -> Self {
        Self {
            db: DbConfig {
                path: PathBuf::from("./data/versemap.sqlite"),
            },
            parser: ParserConfig::default(),
            apply: ApplyConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &Config) -> Result<()> {
    if config.parser.start_marker.trim().is_empty() {
        anyhow::bail!("parser.start_marker must not be empty");
    }
    if config.parser.end_marker.trim().is_empty() {
        anyhow::bail!("parser.end_marker must not be empty");
    }
    if config.parser.start_marker.trim() == config.parser.end_marker.trim() {
        anyhow::bail!("parser.start_marker and parser.end_marker must differ");
    }
    if config.parser.comment_prefix.is_empty() {
        anyhow::bail!("parser.comment_prefix must not be empty");
    }

    if config.apply.max_workers == 0 {
        anyhow::bail!("apply.max_workers must be > 0");
    }
    if config.apply.batches_per_worker == 0 {
        anyhow::bail!("apply.batches_per_worker must be > 0");
    }
    if config.apply.min_batch_size == 0 {
        anyhow::bail!("apply.min_batch_size must be > 0");
    }
    if config.apply.flush_chunk_rows == 0 {
        anyhow::bail!("apply.flush_chunk_rows must be > 0");
    }
    if config.apply.target_tradition.trim().is_empty() {
        anyhow::bail!("apply.target_tradition must not be empty");
    }

    Ok(())
}

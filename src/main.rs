//! # Versemap CLI (`vmap`)
//!
//! ## Usage
//!
//! ```bash
//! vmap --config ./config/versemap.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `vmap init` | Create the SQLite database and run schema migrations |
//! | `vmap ingest <file>` | Parse a versification dataset and reload the mapping tables |
//! | `vmap load-source <file>` | Append per-tradition verse text to `source_table` |
//! | `vmap apply` | Normalize pending source rows onto the Standard numbering |
//! | `vmap stats` | Summarise tables, traditions and the last run |
//! | `vmap book <name>` | Resolve a book name to its canonical code |
//!
//! Logs go to stderr and are filtered with `RUST_LOG` (default
//! `versemap=info`). Command summaries go to stdout.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use versemap::progress::ProgressMode;
use versemap::{apply_cmd, book, config, ingest, migrate, source_load, stats};

/// Versemap CLI: map verse numbering across Bible textual traditions.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/versemap.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "vmap",
    about = "Versemap: normalize verse text from many traditions onto one numbering",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/versemap.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Parse a versification dataset and replace the mapping, rule and
    /// documentation tables with its contents.
    Ingest {
        file: PathBuf,

        /// Parse and report counts without touching the database.
        #[arg(long)]
        dry_run: bool,

        /// Reload even if this exact file was ingested before.
        #[arg(long)]
        force: bool,
    },

    /// Load tab-separated verse text into the source table.
    LoadSource { file: PathBuf },

    /// Apply mappings to every unprocessed source row.
    Apply {
        /// Compute the report without writing.
        #[arg(long)]
        dry_run: bool,

        /// Worker count; defaults to the core count. Capped by apply.max_workers.
        #[arg(long)]
        workers: Option<usize>,

        /// Progress on stderr: off, human, or json. Defaults to human on a TTY.
        #[arg(long)]
        progress: Option<String>,
    },

    /// Show table counts and processing status.
    Stats,

    /// Resolve a book name or abbreviation. Without a name, list all books.
    Book { name: Option<String> },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "versemap=info,versemap_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Book { name } = &cli.command {
        match name {
            Some(name) => book::run_book(name)?,
            None => book::run_book_list(),
        }
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest {
            file,
            dry_run,
            force,
        } => {
            ingest::run_ingest(&cfg, &file, dry_run, force).await?;
        }
        Commands::LoadSource { file } => {
            source_load::run_load_source(&cfg, &file).await?;
        }
        Commands::Apply {
            dry_run,
            workers,
            progress,
        } => {
            let mode = ProgressMode::from_flag(progress.as_deref())?;
            apply_cmd::run_apply(&cfg, dry_run, workers, mode).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Book { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}

//! Command-line interface for journal-abbrev.
//!
//! This module implements the CLI using clap. Available commands:
//!
//! - **db**: Inspect and maintain the journal store (info, list, get, add, remove, rebuild-index, verify)
//! - **resolve**: Resolve free-text journal names to canonical records
//! - **abbreviate**: Rewrite journal-name fields to their abbreviations
//!
//! ## Usage
//!
//! ```text
//! # Import candidates (JSON object, array, or JSON lines)
//! journal-abbrev db add journals.json
//!
//! # Resolve names
//! journal-abbrev resolve "The Journal of Chemical Physics" "Phys. Rev. Lett."
//!
//! # Rewrite fields: one `entry_id<TAB>journal` per line
//! journal-abbrev abbreviate fields.tsv --style iso4 > rewritten.tsv
//!
//! # JSON output for scripting
//! journal-abbrev resolve "Nature" --format json
//! ```

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

use crate::catalog::store::JournalStore;
use crate::config::Settings;

pub mod abbreviate;
pub mod db;
pub mod resolve;

#[derive(Parser)]
#[command(name = "journal-abbrev")]
#[command(version)]
#[command(about = "Resolve journal names and rewrite them to standard abbreviations")]
#[command(
    long_about = "journal-abbrev keeps a catalog of journals with their full names, aliases and ISO 4 abbreviations.\n\nIt merges name lists from sources of differing reliability, resolves free-text journal names (exactly, by abbreviation, or fuzzily), and rewrites bibliography journal fields to their abbreviations."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Store directory (defaults to $JOURNAL_ABBREV_DB or the user data directory)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// JSON settings file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Inspect and maintain the journal store
    Db(db::DbArgs),

    /// Resolve journal names to canonical records
    Resolve(resolve::ResolveArgs),

    /// Rewrite journal-name fields to abbreviations
    Abbreviate(abbreviate::AbbreviateArgs),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Tsv,
}

/// Settings and global options shared by every command
pub struct Context {
    pub settings: Settings,
    pub db_dir: PathBuf,
    pub format: OutputFormat,
    pub verbose: bool,
}

impl Context {
    /// Resolve settings: file values first, command-line flags on top
    ///
    /// # Errors
    ///
    /// Returns an error if the settings file cannot be loaded.
    pub fn from_cli(cli: &Cli) -> anyhow::Result<Self> {
        let settings = match &cli.config {
            Some(path) => Settings::load_from(path)?,
            None => Settings::default(),
        };
        let db_dir = cli.db.clone().unwrap_or_else(|| settings.db_dir());
        debug!("Using store at {}", db_dir.display());

        Ok(Self {
            settings,
            db_dir,
            format: cli.format,
            verbose: cli.verbose,
        })
    }

    /// Open the configured store
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened.
    pub fn open_store(&self) -> anyhow::Result<JournalStore> {
        JournalStore::open(&self.db_dir, self.settings.trust.clone())
            .with_context(|| format!("Failed to open journal store at {}", self.db_dir.display()))
    }
}

/// Read a whole input file, or stdin for `None` / `-`
pub(crate) fn open_input(path: Option<&PathBuf>) -> anyhow::Result<Box<dyn std::io::BufRead>> {
    match path {
        Some(path) if path.as_os_str() != "-" => {
            let file = std::fs::File::open(path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            Ok(Box::new(std::io::BufReader::new(file)))
        }
        _ => Ok(Box::new(std::io::BufReader::new(std::io::stdin()))),
    }
}

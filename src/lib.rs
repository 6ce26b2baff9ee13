//! # journal-abbrev
//!
//! A library for resolving free-text journal names to canonical records and
//! rewriting bibliography journal fields with standard abbreviations.
//!
//! Journal names arrive in many shapes: "The Journal of Chemical Physics",
//! "J. Chem. Phys.", "{Journal of chemical physics}", or a slightly misspelled
//! variant. `journal-abbrev` keeps a catalog of journals merged from sources of
//! differing reliability and maps each of those shapes to one record.
//!
//! ## Features
//!
//! - **Normalized keys**: Case, accents, punctuation and stop words are folded away
//! - **Trust-ranked merging**: Registry data outranks scraped data outranks user input
//! - **Conflict detection**: A candidate matching two records is rejected, not guessed
//! - **Fuzzy matching**: Prefiltered token similarity with a confidence threshold
//! - **Parallel rewriting**: Field rewrites run on a thread pool over one snapshot
//! - **Durable store**: Records and index are written atomically and self-repair
//!
//! ## Example
//!
//! ```rust,no_run
//! use journal_abbrev::{CandidateRecord, JournalStore, Resolver, ResolverConfig, TrustPolicy};
//!
//! let store = JournalStore::open("journals", TrustPolicy::default()).unwrap();
//! store
//!     .apply_merge(
//!         &CandidateRecord::new("The Journal of Chemical Physics", "registry")
//!             .with_abbreviation("J. Chem. Phys."),
//!     )
//!     .unwrap();
//!
//! let snapshot = store.snapshot();
//! let resolver = Resolver::new(&snapshot, ResolverConfig::default());
//! let result = resolver.resolve_default("journal of chemical physics").unwrap();
//! println!("{:?} ({}, {:.2})", result.journal_id, result.strategy, result.confidence);
//! ```
//!
//! ## Modules
//!
//! - [`catalog`]: Journal store, snapshots, indexes and persistence
//! - [`core`]: Records, candidates, identifiers and name normalization
//! - [`merge`]: Trust policy and the merge engine
//! - [`matching`]: Resolver and similarity scoring
//! - [`rewrite`]: Parallel rewriting of journal-name fields
//! - [`config`]: Settings file and store location
//! - [`cli`]: Command-line interface implementation

pub mod catalog;
pub mod cli;
pub mod config;
pub mod core;
pub mod matching;
pub mod merge;
pub mod rewrite;
pub mod utils;

// Re-export commonly used types for convenience
pub use catalog::snapshot::CatalogSnapshot;
pub use catalog::store::{ImportSummary, JournalStore, StoreError, StoreStats};
pub use core::candidate::CandidateRecord;
pub use core::record::{JournalRecord, Provenance};
pub use core::types::*;
pub use matching::engine::{ResolutionResult, Resolver, ResolverConfig};
pub use matching::scoring::{ScorerKind, SimilarityScorer};
pub use merge::{ConflictError, MergeEngine, MergeMode, MergePlan, TrustPolicy};
pub use rewrite::pass::{FieldText, RewriteConfig, RewritePass, RewriteReport, RewriteStatus};

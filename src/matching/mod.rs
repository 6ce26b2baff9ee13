//! Journal-name resolution and similarity scoring.
//!
//! - [`Resolver`]: maps free-text names to canonical records
//! - [`SimilarityScorer`]: pluggable bounded similarity used for fuzzy matching
//!
//! ## Resolution order
//!
//! 1. **Exact**: the full-name key of the query is a record's full name or alias
//! 2. **Abbreviation**: the abbreviation key of the query is a known abbreviation
//! 3. **Fuzzy**: candidates sharing tokens or token prefixes with the query are
//!    scored against every name they carry; the best one wins if it reaches the
//!    minimum confidence
//!
//! Ties in fuzzy scoring prefer a record's full name over an alias, then the
//! smaller id, so results never depend on index iteration order.
//!
//! ## Example
//!
//! ```rust,no_run
//! use journal_abbrev::{JournalStore, Resolver, ResolverConfig, TrustPolicy};
//!
//! let store = JournalStore::open("journals-db", TrustPolicy::default()).unwrap();
//! let snapshot = store.snapshot();
//! let resolver = Resolver::new(&snapshot, ResolverConfig::default());
//!
//! let result = resolver.resolve("J. Chem. Phys.", 0.8).unwrap();
//! println!("{:?} {} {:.2}", result.journal_id, result.strategy, result.confidence);
//! ```

pub mod engine;
pub mod scoring;

pub use engine::{ResolutionResult, Resolver, ResolverConfig};
pub use scoring::{ScorerKind, SimilarityScorer};

//! Canonical journal record storage and indexing.
//!
//! - [`JournalStore`](store::JournalStore): the owned, persistent catalog with
//!   its single merge write path
//! - [`CatalogSnapshot`](snapshot::CatalogSnapshot): records plus derived
//!   indexes, shared read-only with resolvers
//! - [`CandidateFinder`](index::CandidateFinder): coarse prefilter for fuzzy
//!   resolution
//!
//! ## Indexes
//!
//! | Index        | Key                                | Value           |
//! |--------------|------------------------------------|-----------------|
//! | name         | full-name key of each name/alias   | one record id   |
//! | abbreviation | abbreviation key of each abbrev.   | record ids      |
//! | token        | whole tokens and 3-char prefixes   | record ids      |
//!
//! The name and abbreviation partitions are persisted next to the records and
//! rebuilt from them whenever they disagree; the token index lives in memory.
//!
//! ## Example
//!
//! ```rust,no_run
//! use journal_abbrev::{CandidateRecord, JournalStore, TrustPolicy};
//!
//! let store = JournalStore::open("journals-db", TrustPolicy::default()).unwrap();
//! let candidate = CandidateRecord::new("Journal of Examples", "registry")
//!     .with_abbreviation("J. Examp.");
//! let (id, created) = store.apply_merge(&candidate).unwrap();
//! println!("{id} created: {created}");
//! ```

pub mod index;
pub mod persist;
pub mod snapshot;
pub mod store;

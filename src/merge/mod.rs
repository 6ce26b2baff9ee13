//! Merging incoming candidates into canonical records.
//!
//! - [`MergeEngine`](engine::MergeEngine): plans how one candidate changes the catalog
//! - [`TrustPolicy`](policy::TrustPolicy): explicit source ranking
//! - [`FIELD_RULES`](policy::FIELD_RULES): per-field conflict rules
//!
//! ## Targets
//!
//! The candidate's full name and explicit aliases are normalized in full-name
//! mode and looked up in the name index:
//!
//! | Distinct records matched | Result                  |
//! |--------------------------|-------------------------|
//! | 0                        | a new record is created |
//! | 1                        | fields are merged       |
//! | 2 or more                | [`ConflictError`]       |
//!
//! Planning never mutates anything; the store commits the resulting
//! [`MergePlan`](engine::MergePlan) atomically.

pub mod engine;
pub mod policy;

use thiserror::Error;

use crate::core::types::JournalId;

pub use engine::{MergeEngine, MergeMode, MergePlan};
pub use policy::TrustPolicy;

/// A candidate whose names point at more than one existing record
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("'{candidate}' matches {} distinct records: {}", .matches.len(), describe_matches(.matches))]
pub struct ConflictError {
    /// The candidate's full name
    pub candidate: String,
    /// Each matched record with the key that matched it, ordered by id
    pub matches: Vec<(JournalId, String)>,
}

fn describe_matches(matches: &[(JournalId, String)]) -> String {
    matches
        .iter()
        .map(|(id, key)| format!("{id} via \"{key}\""))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Error, Debug)]
pub enum MergeError {
    #[error("Merge conflict: {0}")]
    Conflict(#[from] ConflictError),

    #[error("Invalid candidate: {0}")]
    InvalidCandidate(String),

    /// The name index points at a record the catalog does not hold
    #[error("Name index entry '{key}' points at missing record {id}")]
    DanglingIndex { key: String, id: JournalId },
}

//! Trust ranking and per-field conflict rules.
//!
//! Each field of a [`JournalRecord`](crate::core::record::JournalRecord) is
//! merged by the rule listed for it in [`FIELD_RULES`]. The rules themselves are
//! pure functions of the existing value, the incoming value and the two trust
//! ranks; the engine only looks the rule up and applies its outcome.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::core::normalize::{normalize_abbreviation, normalize_full_name};
use crate::core::types::{Field, SourceTag};

/// Ordering of sources by reliability, most trusted first.
///
/// Sources not listed rank below every listed source (rank 0).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<SourceTag>", into = "Vec<SourceTag>")]
pub struct TrustPolicy {
    order: Vec<SourceTag>,
}

impl TrustPolicy {
    pub fn new<I, S>(order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = BTreeSet::new();
        let order = order
            .into_iter()
            .map(SourceTag::new)
            .filter(|tag| !tag.as_str().is_empty() && seen.insert(tag.clone()))
            .collect();
        Self { order }
    }

    /// Rank of a source; higher is more trusted
    #[must_use]
    pub fn rank(&self, source: &SourceTag) -> u32 {
        self.order
            .iter()
            .position(|s| s == source)
            .map_or(0, |pos| {
                #[allow(clippy::cast_possible_truncation)] // a handful of sources
                {
                    (self.order.len() - pos) as u32
                }
            })
    }

    /// Rank of a field's recorded source; a field with no provenance ranks 0
    #[must_use]
    pub fn rank_of(&self, source: Option<&SourceTag>) -> u32 {
        source.map_or(0, |s| self.rank(s))
    }

    /// Sources in trust order
    #[must_use]
    pub fn order(&self) -> &[SourceTag] {
        &self.order
    }
}

impl Default for TrustPolicy {
    fn default() -> Self {
        Self::new(["registry", "scraped", "user"])
    }
}

impl From<Vec<SourceTag>> for TrustPolicy {
    fn from(order: Vec<SourceTag>) -> Self {
        Self::new(order.into_iter().map(|s| s.0))
    }
}

impl From<TrustPolicy> for Vec<SourceTag> {
    fn from(policy: TrustPolicy) -> Self {
        policy.order
    }
}

/// How a field reconciles existing and incoming values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRule {
    /// Single value, replaced only by a strictly more trusted source
    Outrank,
    /// Preferred value plus alternates; incoming joins the alternates and is
    /// promoted on strict outrank
    Promote,
    /// Set of values; incoming values with unseen keys are added
    Union,
}

/// The merge rule for every record field
pub const FIELD_RULES: &[(Field, FieldRule)] = &[
    (Field::FullName, FieldRule::Outrank),
    (Field::Abbreviation, FieldRule::Promote),
    (Field::Aliases, FieldRule::Union),
    (Field::Coden, FieldRule::Outrank),
    (Field::IssnPrint, FieldRule::Outrank),
    (Field::IssnWeb, FieldRule::Outrank),
];

/// Outcome of [`resolve_outrank`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutrankOutcome {
    Keep,
    /// Take the incoming value and its provenance
    Adopt,
}

/// Single-valued fields: keep unless the incoming source strictly outranks.
///
/// An empty field adopts any incoming value. A strictly more trusted source
/// confirming the same value is still adopted so its provenance is recorded.
#[must_use]
pub fn resolve_outrank(
    existing: Option<&str>,
    existing_rank: u32,
    incoming: Option<&str>,
    incoming_rank: u32,
) -> OutrankOutcome {
    match (existing, incoming) {
        (_, None) => OutrankOutcome::Keep,
        (None, Some(_)) => OutrankOutcome::Adopt,
        (Some(_), Some(_)) if incoming_rank > existing_rank => OutrankOutcome::Adopt,
        _ => OutrankOutcome::Keep,
    }
}

/// Outcome of [`resolve_promote`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromoteOutcome {
    Keep,
    /// Add the incoming value to the alternates
    AddAlternate,
    /// Make the incoming value preferred; `demote` is the previous preferred
    /// value when it should move to the alternates
    Promote { demote: Option<String> },
}

/// Abbreviations: preferred + alternates, compared by abbreviation key.
#[must_use]
pub fn resolve_promote(
    preferred: Option<&str>,
    preferred_rank: u32,
    alternates: &BTreeSet<String>,
    incoming: Option<&str>,
    incoming_rank: u32,
) -> PromoteOutcome {
    let Some(incoming) = incoming else {
        return PromoteOutcome::Keep;
    };
    let Some(preferred) = preferred else {
        return PromoteOutcome::Promote { demote: None };
    };

    let incoming_key = normalize_abbreviation(incoming);
    let outranks = incoming_rank > preferred_rank;

    if normalize_abbreviation(preferred) == incoming_key {
        // Same abbreviation; a more trusted source may restyle it
        return if outranks {
            PromoteOutcome::Promote { demote: None }
        } else {
            PromoteOutcome::Keep
        };
    }

    let known = alternates
        .iter()
        .any(|a| normalize_abbreviation(a) == incoming_key);

    match (outranks, known) {
        (true, _) => PromoteOutcome::Promote {
            demote: Some(preferred.to_string()),
        },
        (false, true) => PromoteOutcome::Keep,
        (false, false) => PromoteOutcome::AddAlternate,
    }
}

/// Names: return the incoming names whose full-name key is not yet present.
///
/// `existing_keys` holds the keys already owned; the result is in input order
/// without key duplicates.
#[must_use]
pub fn resolve_union<'a, I>(existing_keys: &BTreeSet<String>, incoming: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = existing_keys.clone();
    let mut added = Vec::new();
    for name in incoming {
        let key = normalize_full_name(name);
        if !key.is_empty() && seen.insert(key) {
            added.push(name.to_string());
        }
    }
    added
}

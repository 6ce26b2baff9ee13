use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use crate::catalog::snapshot::CatalogSnapshot;
use crate::core::candidate::CandidateRecord;
use crate::core::normalize::{normalize_abbreviation, normalize_full_name, tidy_abbreviation};
use crate::core::record::{JournalRecord, Provenance};
use crate::core::types::{Field, JournalId, SourceTag};
use crate::utils::validation::{check_name_length, normalize_coden, normalize_issn, MAX_ALIASES};

use super::policy::{
    resolve_outrank, resolve_promote, resolve_union, FieldRule, OutrankOutcome, PromoteOutcome,
    TrustPolicy, FIELD_RULES,
};
use super::{ConflictError, MergeError};

/// What committing a candidate would do to the catalog
#[derive(Debug, Clone, PartialEq)]
pub enum MergePlan {
    /// Insert a new record under a freshly allocated id
    Create(JournalRecord),
    /// Replace the record with the same id
    Update(JournalRecord),
    /// The candidate adds nothing; no write is needed
    Unchanged(JournalId),
}

impl MergePlan {
    #[must_use]
    pub fn id(&self) -> JournalId {
        match self {
            Self::Create(record) | Self::Update(record) => record.id,
            Self::Unchanged(id) => *id,
        }
    }

    #[must_use]
    pub fn was_created(&self) -> bool {
        matches!(self, Self::Create(_))
    }

    /// The record to write, if any
    #[must_use]
    pub fn record(&self) -> Option<&JournalRecord> {
        match self {
            Self::Create(record) | Self::Update(record) => Some(record),
            Self::Unchanged(_) => None,
        }
    }
}

/// How a candidate combines with the record it matches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeMode {
    /// Field by field under the trust policy
    #[default]
    Merge,
    /// Replace the matched record's content with the candidate's, keeping its id
    Overwrite,
}

/// A candidate with its values cleaned and validated
#[derive(Debug)]
struct PreparedCandidate {
    full_name: String,
    full_key: String,
    abbreviation: Option<String>,
    aliases: Vec<(String, String)>,
    coden: Option<String>,
    issn_print: Option<String>,
    issn_web: Option<String>,
    source: SourceTag,
}

impl PreparedCandidate {
    fn value(&self, field: Field) -> Option<&str> {
        match field {
            Field::FullName => Some(self.full_name.as_str()),
            Field::Abbreviation => self.abbreviation.as_deref(),
            Field::Coden => self.coden.as_deref(),
            Field::IssnPrint => self.issn_print.as_deref(),
            Field::IssnWeb => self.issn_web.as_deref(),
            Field::Aliases => None,
        }
    }

    /// Full-name key first, then alias keys
    fn keys(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.full_key.as_str()).chain(self.aliases.iter().map(|(_, k)| k.as_str()))
    }
}

/// Plans merges of candidates against a catalog snapshot
pub struct MergeEngine<'a> {
    policy: &'a TrustPolicy,
    mode: MergeMode,
}

impl<'a> MergeEngine<'a> {
    #[must_use]
    pub fn new(policy: &'a TrustPolicy) -> Self {
        Self {
            policy,
            mode: MergeMode::default(),
        }
    }

    #[must_use]
    pub fn with_mode(mut self, mode: MergeMode) -> Self {
        self.mode = mode;
        self
    }

    /// Decide how `candidate` changes `snapshot`.
    ///
    /// # Errors
    ///
    /// Returns `MergeError::InvalidCandidate` if the candidate has no usable full
    /// name, `MergeError::Conflict` if its names match more than one record.
    pub fn plan(
        &self,
        snapshot: &CatalogSnapshot,
        candidate: &CandidateRecord,
        now: DateTime<Utc>,
    ) -> Result<MergePlan, MergeError> {
        let prepared = prepare(candidate)?;

        match find_target(snapshot, &prepared)? {
            None => {
                let record = self.fresh_record(snapshot, snapshot.next_id(), &prepared, now);
                debug!(
                    "Creating {} for '{}' from {}",
                    record.id, record.full_name, prepared.source
                );
                Ok(MergePlan::Create(record))
            }
            Some(existing) => {
                let record = match self.mode {
                    MergeMode::Merge => {
                        let mut record = existing.clone();
                        self.merge_fields(snapshot, &mut record, &prepared, now);
                        record
                    }
                    MergeMode::Overwrite => {
                        self.fresh_record(snapshot, existing.id, &prepared, now)
                    }
                };
                if record.same_content(existing) {
                    debug!("'{}' adds nothing to {}", prepared.full_name, existing.id);
                    Ok(MergePlan::Unchanged(existing.id))
                } else {
                    debug!(
                        "Merging '{}' from {} into {}",
                        prepared.full_name, prepared.source, existing.id
                    );
                    Ok(MergePlan::Update(record))
                }
            }
        }
    }

    /// A record holding only the candidate's values
    fn fresh_record(
        &self,
        snapshot: &CatalogSnapshot,
        id: JournalId,
        prepared: &PreparedCandidate,
        now: DateTime<Utc>,
    ) -> JournalRecord {
        let mut record = JournalRecord::new(id, prepared.full_name.clone());
        record.provenance.insert(
            Field::FullName,
            Provenance::new(prepared.source.clone(), now),
        );
        self.merge_fields(snapshot, &mut record, prepared, now);
        record
    }

    /// Apply every field rule to `record`
    fn merge_fields(
        &self,
        snapshot: &CatalogSnapshot,
        record: &mut JournalRecord,
        incoming: &PreparedCandidate,
        now: DateTime<Utc>,
    ) {
        let incoming_rank = self.policy.rank(&incoming.source);

        for &(field, rule) in FIELD_RULES {
            let existing_rank = self.policy.rank_of(record.source_of(field));
            match rule {
                FieldRule::Outrank => {
                    let outcome = resolve_outrank(
                        record.text(field),
                        existing_rank,
                        incoming.value(field),
                        incoming_rank,
                    );
                    if outcome == OutrankOutcome::Adopt {
                        if let Some(value) = incoming.value(field) {
                            adopt(record, field, value, &incoming.source, now);
                        }
                    }
                }
                FieldRule::Promote => {
                    let mut outcome = resolve_promote(
                        record.abbreviation.as_deref(),
                        existing_rank,
                        &record.alternate_abbreviations,
                        incoming.abbreviation.as_deref(),
                        incoming_rank,
                    );
                    if matches!(outcome, PromoteOutcome::Promote { .. }) {
                        if let Some(owner) = preferred_elsewhere(snapshot, record, incoming) {
                            debug!(
                                "'{}' is already the abbreviation of {owner}; keeping it as an alternate of {}",
                                incoming.abbreviation.as_deref().unwrap_or_default(),
                                record.id
                            );
                            outcome = demote_to_alternate(record, incoming);
                        }
                    }
                    apply_promote(record, outcome, incoming, now);
                }
                FieldRule::Union => {
                    let existing_keys: BTreeSet<String> =
                        record.name_keys.iter().map(|k| k.key.clone()).collect();
                    let names = std::iter::once(incoming.full_name.as_str())
                        .chain(incoming.aliases.iter().map(|(name, _)| name.as_str()));
                    let added = resolve_union(&existing_keys, names);
                    if !added.is_empty() {
                        record.aliases.extend(added);
                        set_provenance(record, field, &incoming.source, now);
                    }
                }
            }
            record.rebuild_keys();
        }
    }
}

/// Set a single-valued field to the incoming value and record its source
fn adopt(record: &mut JournalRecord, field: Field, value: &str, source: &SourceTag, now: DateTime<Utc>) {
    let changed = record.text(field) != Some(value);
    let new_source = record.source_of(field) != Some(source);
    if !changed && !new_source {
        return;
    }

    match field {
        Field::FullName => {
            let previous = std::mem::replace(&mut record.full_name, value.to_string());
            let new_key = normalize_full_name(value);
            // The displaced name stays reachable as an alias
            record.aliases.retain(|a| normalize_full_name(a) != new_key);
            if normalize_full_name(&previous) != new_key {
                record.aliases.insert(previous);
            }
        }
        Field::Coden => record.coden = Some(value.to_string()),
        Field::IssnPrint => record.issn_print = Some(value.to_string()),
        Field::IssnWeb => record.issn_web = Some(value.to_string()),
        Field::Abbreviation | Field::Aliases => return,
    }
    set_provenance(record, field, source, now);
}

fn apply_promote(
    record: &mut JournalRecord,
    outcome: PromoteOutcome,
    incoming: &PreparedCandidate,
    now: DateTime<Utc>,
) {
    let Some(abbreviation) = incoming.abbreviation.as_deref() else {
        return;
    };

    match outcome {
        PromoteOutcome::Keep => {}
        PromoteOutcome::AddAlternate => {
            record.alternate_abbreviations.insert(abbreviation.to_string());
        }
        PromoteOutcome::Promote { demote } => {
            let key = normalize_abbreviation(abbreviation);
            record
                .alternate_abbreviations
                .retain(|a| normalize_abbreviation(a) != key);
            if let Some(previous) = demote {
                record.alternate_abbreviations.insert(previous);
            }
            let changed = record.abbreviation.as_deref() != Some(abbreviation);
            let new_source = record.source_of(Field::Abbreviation) != Some(&incoming.source);
            if changed || new_source {
                record.abbreviation = Some(abbreviation.to_string());
                set_provenance(record, Field::Abbreviation, &incoming.source, now);
            }
        }
    }
}

/// Another record whose preferred abbreviation has the incoming abbreviation's key
fn preferred_elsewhere(
    snapshot: &CatalogSnapshot,
    record: &JournalRecord,
    incoming: &PreparedCandidate,
) -> Option<JournalId> {
    let key = normalize_abbreviation(incoming.abbreviation.as_deref()?);
    snapshot
        .preferred_abbreviation_owner(&key)
        .filter(|owner| *owner != record.id)
}

fn demote_to_alternate(record: &JournalRecord, incoming: &PreparedCandidate) -> PromoteOutcome {
    let Some(abbreviation) = incoming.abbreviation.as_deref() else {
        return PromoteOutcome::Keep;
    };
    let key = normalize_abbreviation(abbreviation);
    let known = record
        .abbreviation
        .iter()
        .chain(&record.alternate_abbreviations)
        .any(|a| normalize_abbreviation(a) == key);
    if known {
        PromoteOutcome::Keep
    } else {
        PromoteOutcome::AddAlternate
    }
}

fn set_provenance(record: &mut JournalRecord, field: Field, source: &SourceTag, now: DateTime<Utc>) {
    record
        .provenance
        .insert(field, Provenance::new(source.clone(), now));
}

/// The single record the candidate's keys point at, if any
fn find_target<'s>(
    snapshot: &'s CatalogSnapshot,
    prepared: &PreparedCandidate,
) -> Result<Option<&'s JournalRecord>, MergeError> {
    let mut matches: BTreeMap<JournalId, &str> = BTreeMap::new();
    for key in prepared.keys() {
        if let Some(id) = snapshot.lookup_name_key(key) {
            matches.entry(id).or_insert(key);
        }
    }

    if matches.len() > 1 {
        let conflict = ConflictError {
            candidate: prepared.full_name.clone(),
            matches: matches
                .into_iter()
                .map(|(id, key)| (id, key.to_string()))
                .collect(),
        };
        warn!("{conflict}");
        return Err(conflict.into());
    }

    match matches.into_iter().next() {
        None => Ok(None),
        Some((id, key)) => snapshot
            .get(id)
            .map(Some)
            .ok_or_else(|| MergeError::DanglingIndex {
                key: key.to_string(),
                id,
            }),
    }
}

/// Collapse internal whitespace; blank becomes absent
fn clean(value: &str) -> Option<String> {
    let cleaned = value.split_whitespace().collect::<Vec<_>>().join(" ");
    (!cleaned.is_empty()).then_some(cleaned)
}

fn prepare(candidate: &CandidateRecord) -> Result<PreparedCandidate, MergeError> {
    let full_name = clean(&candidate.full_name)
        .ok_or_else(|| MergeError::InvalidCandidate("empty full name".to_string()))?;
    if let Some(message) = check_name_length(&full_name) {
        return Err(MergeError::InvalidCandidate(message));
    }
    let full_key = normalize_full_name(&full_name);
    if full_key.is_empty() {
        return Err(MergeError::InvalidCandidate(format!(
            "'{full_name}' has no alphanumeric characters"
        )));
    }

    let abbreviation = candidate
        .abbreviation
        .as_deref()
        .and_then(clean)
        .map(|a| tidy_abbreviation(&a))
        .filter(|a| {
            if let Some(message) = check_name_length(a) {
                warn!("Dropping abbreviation for '{full_name}': {message}");
                return false;
            }
            !normalize_abbreviation(a).is_empty()
        });

    let mut aliases: Vec<(String, String)> = Vec::new();
    for alias in candidate.aliases.iter().filter_map(|a| clean(a)) {
        if aliases.len() >= MAX_ALIASES {
            warn!(
                "'{full_name}' has more than {MAX_ALIASES} aliases; ignoring the rest"
            );
            break;
        }
        if let Some(message) = check_name_length(&alias) {
            warn!("Dropping alias of '{full_name}': {message}");
            continue;
        }
        let key = normalize_full_name(&alias);
        if key.is_empty() || key == full_key || aliases.iter().any(|(_, k)| *k == key) {
            continue;
        }
        aliases.push((alias, key));
    }

    let coden = candidate.coden.as_deref().and_then(clean).and_then(|c| {
        let normalized = normalize_coden(&c);
        if normalized.is_none() {
            warn!("Dropping invalid CODEN '{c}' for '{full_name}'");
        }
        normalized
    });
    let issn_print = validated_issn(candidate.issn_print.as_deref(), &full_name);
    let issn_web = validated_issn(candidate.issn_web.as_deref(), &full_name);

    Ok(PreparedCandidate {
        full_name,
        full_key,
        abbreviation,
        aliases,
        coden,
        issn_print,
        issn_web,
        source: candidate.source.clone(),
    })
}

fn validated_issn(raw: Option<&str>, full_name: &str) -> Option<String> {
    let raw = raw.and_then(clean)?;
    let normalized = normalize_issn(&raw);
    if normalized.is_none() {
        warn!("Dropping invalid ISSN '{raw}' for '{full_name}'");
    }
    normalized
}

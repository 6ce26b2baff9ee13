use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::core::normalize::normalize_abbreviation;
use crate::core::record::JournalRecord;
use crate::core::types::JournalId;
use crate::merge::MergePlan;

use super::index::signature;
use super::store::StoreError;

/// Lookup structures derived from record bodies
#[derive(Debug, Clone, Default, PartialEq)]
struct Indexes {
    /// Full-name-mode key of every full name and alias → owning record
    names: HashMap<String, JournalId>,
    /// Abbreviation-mode key → records carrying that abbreviation
    abbreviations: HashMap<String, BTreeSet<JournalId>>,
    /// Signature entry → records whose names contain it (fuzzy prefilter)
    tokens: HashMap<String, BTreeSet<JournalId>>,
}

impl Indexes {
    fn from_records<'a>(records: impl IntoIterator<Item = &'a JournalRecord>) -> Self {
        let mut indexes = Self::default();
        for record in records {
            indexes.add(record);
        }
        indexes
    }

    fn add(&mut self, record: &JournalRecord) {
        for name_key in &record.name_keys {
            self.names.insert(name_key.key.clone(), record.id);
            for entry in signature(&name_key.key) {
                self.tokens.entry(entry).or_default().insert(record.id);
            }
        }
        for key in &record.abbreviation_keys {
            self.abbreviations
                .entry(key.clone())
                .or_default()
                .insert(record.id);
        }
    }

    fn remove(&mut self, record: &JournalRecord) {
        for name_key in &record.name_keys {
            if self.names.get(&name_key.key) == Some(&record.id) {
                self.names.remove(&name_key.key);
            }
            for entry in signature(&name_key.key) {
                remove_posting(&mut self.tokens, &entry, record.id);
            }
        }
        for key in &record.abbreviation_keys {
            remove_posting(&mut self.abbreviations, key, record.id);
        }
    }
}

fn remove_posting(map: &mut HashMap<String, BTreeSet<JournalId>>, key: &str, id: JournalId) {
    if let Some(ids) = map.get_mut(key) {
        ids.remove(&id);
        if ids.is_empty() {
            map.remove(key);
        }
    }
}

/// An immutable-by-convention view of the whole catalog: record bodies plus the
/// indexes derived from them.
///
/// The store publishes snapshots behind an `Arc`; every mutation goes through
/// [`insert`](Self::insert), [`remove`](Self::remove) or [`commit`](Self::commit),
/// which keep records and indexes in step.
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    records: BTreeMap<JournalId, JournalRecord>,
    indexes: Indexes,
    next_id: u64,
    generation: u64,
}

impl CatalogSnapshot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot from loaded records, deriving every index.
    ///
    /// `next_id` is raised past the largest record id if needed.
    pub fn from_records(
        records: impl IntoIterator<Item = JournalRecord>,
        next_id: u64,
        generation: u64,
    ) -> Self {
        let mut snapshot = Self {
            next_id,
            generation,
            ..Self::default()
        };
        for mut record in records {
            record.rebuild_keys();
            snapshot.next_id = snapshot.next_id.max(record.id.0 + 1);
            snapshot.records.insert(record.id, record);
        }
        snapshot.indexes = Indexes::from_records(snapshot.records.values());
        snapshot
    }

    // === Reads ===

    #[must_use]
    pub fn get(&self, id: JournalId) -> Option<&JournalRecord> {
        self.records.get(&id)
    }

    /// Records in ascending id order
    pub fn records(&self) -> impl Iterator<Item = &JournalRecord> {
        self.records.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The id the next created record receives
    #[must_use]
    pub fn next_id(&self) -> JournalId {
        JournalId(self.next_id)
    }

    /// Counter bumped by every mutation; ties the persisted index to its records
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Owner of a full-name-mode key
    #[must_use]
    pub fn lookup_name_key(&self, key: &str) -> Option<JournalId> {
        self.indexes.names.get(key).copied()
    }

    /// Records carrying an abbreviation-mode key
    #[must_use]
    pub fn abbreviation_ids(&self, key: &str) -> Option<&BTreeSet<JournalId>> {
        self.indexes.abbreviations.get(key)
    }

    /// Records whose name signature contains `entry`
    #[must_use]
    pub fn token_postings(&self, entry: &str) -> Option<&BTreeSet<JournalId>> {
        self.indexes.tokens.get(entry)
    }

    /// The record owning a full-name-mode key.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::CorruptIndex` if the index points at a missing record.
    pub fn record_for_name_key(&self, key: &str) -> Result<Option<&JournalRecord>, StoreError> {
        match self.lookup_name_key(key) {
            None => Ok(None),
            Some(id) => self.get(id).map(Some).ok_or_else(|| dangling(key, id)),
        }
    }

    /// The record an abbreviation-mode key resolves to.
    ///
    /// The record whose preferred abbreviation has this key wins; otherwise the
    /// key resolves only when a single record carries it. A key preferred by
    /// several records, or held as an alternate by several, is ambiguous and
    /// resolves to nothing.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::CorruptIndex` if the index points at a missing record.
    pub fn record_for_abbreviation_key(
        &self,
        key: &str,
    ) -> Result<Option<&JournalRecord>, StoreError> {
        let Some(ids) = self.abbreviation_ids(key) else {
            return Ok(None);
        };

        let mut preferred = Vec::new();
        let mut carriers = Vec::with_capacity(ids.len());
        for &id in ids {
            let record = self.get(id).ok_or_else(|| dangling(key, id))?;
            if prefers(record, key) {
                preferred.push(record);
            }
            carriers.push(record);
        }

        match (preferred.as_slice(), carriers.as_slice()) {
            ([record], _) | ([], [record]) => Ok(Some(*record)),
            _ => Ok(None),
        }
    }

    /// The first record whose preferred abbreviation has this key
    #[must_use]
    pub fn preferred_abbreviation_owner(&self, key: &str) -> Option<JournalId> {
        self.abbreviation_ids(key)?
            .iter()
            .filter_map(|id| self.get(*id))
            .find(|record| prefers(record, key))
            .map(|record| record.id)
    }

    // === Index partitions ===

    /// Name-key entries, sorted by key
    #[must_use]
    pub fn name_entries(&self) -> Vec<(String, JournalId)> {
        let mut entries: Vec<_> = self
            .indexes
            .names
            .iter()
            .map(|(k, id)| (k.clone(), *id))
            .collect();
        entries.sort();
        entries
    }

    /// Abbreviation-key entries, sorted by key
    #[must_use]
    pub fn abbreviation_entries(&self) -> Vec<(String, Vec<JournalId>)> {
        let mut entries: Vec<_> = self
            .indexes
            .abbreviations
            .iter()
            .map(|(k, ids)| (k.clone(), ids.iter().copied().collect()))
            .collect();
        entries.sort();
        entries
    }

    #[must_use]
    pub fn name_key_count(&self) -> usize {
        self.indexes.names.len()
    }

    #[must_use]
    pub fn abbreviation_key_count(&self) -> usize {
        self.indexes.abbreviations.len()
    }

    /// Replace the name and abbreviation partitions with persisted entries.
    ///
    /// The token index is always derived from the records.
    pub fn install_index(
        &mut self,
        names: Vec<(String, JournalId)>,
        abbreviations: Vec<(String, Vec<JournalId>)>,
    ) {
        self.indexes.names = names.into_iter().collect();
        self.indexes.abbreviations = abbreviations
            .into_iter()
            .map(|(k, ids)| (k, ids.into_iter().collect()))
            .collect();
        self.indexes.tokens = Indexes::from_records(self.records.values()).tokens;
    }

    /// Drop and re-derive every index from record bodies.
    ///
    /// Returns the number of indexed name and abbreviation keys.
    pub fn rebuild_index(&mut self) -> usize {
        for record in self.records.values_mut() {
            record.rebuild_keys();
        }
        self.indexes = Indexes::from_records(self.records.values());
        self.name_key_count() + self.abbreviation_key_count()
    }

    /// Check the index partitions against the record bodies.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::CorruptIndex` describing the first mismatch found.
    pub fn verify_index(&self) -> Result<(), StoreError> {
        for (key, id) in &self.indexes.names {
            if !self.records.contains_key(id) {
                return Err(dangling(key, *id));
            }
        }
        for (key, ids) in &self.indexes.abbreviations {
            if let Some(id) = ids.iter().find(|id| !self.records.contains_key(*id)) {
                return Err(dangling(key, *id));
            }
        }

        let owned: usize = self.records.values().map(|r| r.name_keys.len()).sum();
        let expected = Indexes::from_records(self.records.values());
        if owned != expected.names.len() {
            return Err(StoreError::CorruptIndex(format!(
                "{} name keys are owned by more than one record",
                owned - expected.names.len()
            )));
        }
        if expected.names != self.indexes.names {
            return Err(StoreError::CorruptIndex(format!(
                "name index has {} entries, records define {}",
                self.indexes.names.len(),
                expected.names.len()
            )));
        }
        if expected.abbreviations != self.indexes.abbreviations {
            return Err(StoreError::CorruptIndex(format!(
                "abbreviation index has {} keys, records define {}",
                self.indexes.abbreviations.len(),
                expected.abbreviations.len()
            )));
        }
        Ok(())
    }

    // === Writes ===

    /// Insert or replace a record together with its index entries
    pub fn insert(&mut self, mut record: JournalRecord) {
        record.rebuild_keys();
        if let Some(previous) = self.records.remove(&record.id) {
            self.indexes.remove(&previous);
        }
        self.indexes.add(&record);
        self.next_id = self.next_id.max(record.id.0 + 1);
        self.records.insert(record.id, record);
        self.generation += 1;
    }

    /// Remove a record and all of its index entries
    pub fn remove(&mut self, id: JournalId) -> Option<JournalRecord> {
        let record = self.records.remove(&id)?;
        self.indexes.remove(&record);
        self.generation += 1;
        Some(record)
    }

    /// Apply a merge plan; returns the affected id
    pub fn commit(&mut self, plan: MergePlan) -> JournalId {
        match plan {
            MergePlan::Create(record) | MergePlan::Update(record) => {
                let id = record.id;
                self.insert(record);
                id
            }
            MergePlan::Unchanged(id) => id,
        }
    }
}

fn prefers(record: &JournalRecord, key: &str) -> bool {
    record
        .abbreviation
        .as_deref()
        .is_some_and(|a| normalize_abbreviation(a) == key)
}

fn dangling(key: &str, id: JournalId) -> StoreError {
    StoreError::CorruptIndex(format!("key '{key}' points at missing record {id}"))
}

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::candidate::CandidateRecord;
use crate::core::normalize::{normalize_abbreviation, normalize_full_name};
use crate::core::record::JournalRecord;
use crate::core::types::JournalId;
use crate::merge::{ConflictError, MergeEngine, MergeError, MergeMode, TrustPolicy};

use super::persist::{self, LogEntry};
use super::snapshot::CatalogSnapshot;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Journal not found: {0}")]
    NotFound(String),

    #[error("Merge conflict: {0}")]
    Conflict(#[from] ConflictError),

    #[error("Invalid candidate: {0}")]
    InvalidCandidate(String),

    #[error("Corrupt index: {0}")]
    CorruptIndex(String),

    #[error("Corrupt records: {0}")]
    CorruptRecords(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encoding error: {0}")]
    Encode(#[from] bincode::Error),

    #[error("Unsupported store format version {0}")]
    UnsupportedVersion(u32),
}

impl From<MergeError> for StoreError {
    fn from(e: MergeError) -> Self {
        match e {
            MergeError::Conflict(conflict) => Self::Conflict(conflict),
            MergeError::InvalidCandidate(message) => Self::InvalidCandidate(message),
            MergeError::DanglingIndex { key, id } => {
                Self::CorruptIndex(format!("key '{key}' points at missing record {id}"))
            }
        }
    }
}

/// Outcome of [`JournalStore::import`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub added: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub conflicts: usize,
    pub invalid: usize,
    /// One line per skipped candidate
    pub warnings: Vec<String>,
}

impl ImportSummary {
    #[must_use]
    pub fn total(&self) -> usize {
        self.added + self.updated + self.unchanged + self.conflicts + self.invalid
    }
}

/// Store-level counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub records: usize,
    pub name_keys: usize,
    pub abbreviation_keys: usize,
    pub format_version: u32,
    pub next_id: u64,
    pub generation: u64,
}

/// A restartable view over every record of one snapshot
pub struct Records {
    snapshot: Arc<CatalogSnapshot>,
}

impl Records {
    pub fn iter(&self) -> impl Iterator<Item = &JournalRecord> {
        self.snapshot.records()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshot.is_empty()
    }
}

impl<'a> IntoIterator for &'a Records {
    type Item = &'a JournalRecord;
    type IntoIter = Box<dyn Iterator<Item = &'a JournalRecord> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

/// Log batches tolerated before compaction is considered
const MIN_BATCHES_BEFORE_COMPACTION: usize = 256;

/// Writer-side bookkeeping, guarded by the writer lock
#[derive(Debug, Default)]
struct WriterState {
    /// Batches in the records log since it was last compacted
    batches: usize,
    /// Generation of the index last written to disk
    index_generation: u64,
}

/// The canonical journal catalog.
///
/// Single writer, many readers: writers are serialized by `writer`. A write is
/// planned against the committed snapshot, appended to the records log, and
/// only then applied to the committed state under the `state` write lock.
/// Readers clone the current `Arc<CatalogSnapshot>` and never observe a partial
/// write; a reader still holding the previous snapshot keeps it, since the
/// commit copies the catalog only in that case (`Arc::make_mut`).
#[derive(Debug)]
pub struct JournalStore {
    dir: Option<PathBuf>,
    trust: TrustPolicy,
    state: RwLock<Arc<CatalogSnapshot>>,
    writer: Mutex<WriterState>,
}

impl JournalStore {
    /// Open (or create) a store directory.
    ///
    /// A missing, stale or inconsistent index is rebuilt from the records and
    /// written back.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the records cannot
    /// be decoded.
    pub fn open(dir: impl AsRef<Path>, trust: TrustPolicy) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        let loaded = persist::load(&dir)?;
        if loaded.index_rebuilt {
            persist::save_index(&dir, &loaded.snapshot)?;
            info!(
                "Rebuilt index for {} records in {}",
                loaded.snapshot.len(),
                dir.display()
            );
        }

        let writer = WriterState {
            batches: loaded.batches,
            index_generation: loaded.snapshot.generation(),
        };
        Ok(Self {
            dir: Some(dir),
            trust,
            state: RwLock::new(Arc::new(loaded.snapshot)),
            writer: Mutex::new(writer),
        })
    }

    /// A store that lives only in memory
    #[must_use]
    pub fn in_memory(trust: TrustPolicy) -> Self {
        Self {
            dir: None,
            trust,
            state: RwLock::new(Arc::new(CatalogSnapshot::new())),
            writer: Mutex::new(WriterState::default()),
        }
    }

    /// Close the store, writing the index if writes have moved past it.
    ///
    /// Every write is durable once it returns; an index left stale by a store
    /// that was never closed is rebuilt on the next open.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be written.
    pub fn close(self) -> Result<(), StoreError> {
        let writer = self.lock_writer();
        if let Some(dir) = &self.dir {
            let snapshot = self.snapshot();
            if snapshot.generation() != writer.index_generation {
                persist::save_index(dir, &snapshot)?;
            }
            debug!("Closed store at {}", dir.display());
        }
        Ok(())
    }

    /// Store directory, if persistent
    #[must_use]
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    #[must_use]
    pub fn trust(&self) -> &TrustPolicy {
        &self.trust
    }

    /// The last committed state
    #[must_use]
    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        Arc::clone(&self.state.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if no record has this id.
    pub fn get(&self, id: JournalId) -> Result<JournalRecord, StoreError> {
        self.snapshot()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// Look a normalized key up in the name index, then the abbreviation index.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` on a miss, `StoreError::CorruptIndex` if
    /// the index points at a missing record.
    pub fn lookup_by_normalized_key(&self, key: &str) -> Result<JournalRecord, StoreError> {
        let snapshot = self.snapshot();
        if let Some(record) = snapshot.record_for_name_key(key)? {
            return Ok(record.clone());
        }
        snapshot
            .record_for_abbreviation_key(key)?
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    /// Look a raw name up by either of its normalized keys
    ///
    /// # Errors
    ///
    /// See [`lookup_by_normalized_key`](Self::lookup_by_normalized_key).
    pub fn lookup_by_name(&self, name: &str) -> Result<JournalRecord, StoreError> {
        match self.lookup_by_normalized_key(&normalize_full_name(name)) {
            Err(StoreError::NotFound(_)) => self
                .lookup_by_normalized_key(&normalize_abbreviation(name))
                .map_err(|e| match e {
                    StoreError::NotFound(_) => StoreError::NotFound(name.to_string()),
                    other => other,
                }),
            result => result,
        }
    }

    /// Every record of the current snapshot
    #[must_use]
    pub fn all_records(&self) -> Records {
        Records {
            snapshot: self.snapshot(),
        }
    }

    /// Merge one candidate; returns its record id and whether it was created.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` if the candidate's names match several
    /// records, `StoreError::InvalidCandidate` if it has no usable name, or an
    /// I/O error if persisting fails. Nothing is modified on error.
    pub fn apply_merge(&self, candidate: &CandidateRecord) -> Result<(JournalId, bool), StoreError> {
        self.apply_merge_at(candidate, Utc::now())
    }

    /// [`apply_merge`](Self::apply_merge) with an explicit provenance timestamp
    ///
    /// # Errors
    ///
    /// See [`apply_merge`](Self::apply_merge).
    pub fn apply_merge_at(
        &self,
        candidate: &CandidateRecord,
        now: DateTime<Utc>,
    ) -> Result<(JournalId, bool), StoreError> {
        let mut writer = self.lock_writer();
        let plan = MergeEngine::new(&self.trust).plan(&self.snapshot(), candidate, now)?;
        let id = plan.id();
        let created = plan.was_created();
        let Some(record) = plan.record() else {
            return Ok((id, false));
        };

        self.persist(&mut writer, &[LogEntry::put(record)?])?;
        self.commit_in_place(|snapshot| snapshot.commit(plan));
        self.compact_if_due(&mut writer);
        Ok((id, created))
    }

    /// Merge a stream of candidates, persisting once at the end.
    ///
    /// Conflicting and invalid candidates are counted and logged, not fatal.
    ///
    /// # Errors
    ///
    /// Returns an error only for store-level failures (corrupt index, I/O);
    /// in that case nothing from this import is committed.
    pub fn import<I>(&self, candidates: I) -> Result<ImportSummary, StoreError>
    where
        I: IntoIterator<Item = CandidateRecord>,
    {
        self.import_with(candidates, MergeMode::Merge)
    }

    /// [`import`](Self::import) with an explicit merge mode.
    ///
    /// [`MergeMode::Overwrite`] replaces each matched record with the candidate
    /// regardless of trust.
    ///
    /// # Errors
    ///
    /// See [`import`](Self::import).
    pub fn import_with<I>(&self, candidates: I, mode: MergeMode) -> Result<ImportSummary, StoreError>
    where
        I: IntoIterator<Item = CandidateRecord>,
    {
        let mut writer = self.lock_writer();
        let mut next = (*self.snapshot()).clone();
        let engine = MergeEngine::new(&self.trust).with_mode(mode);
        let mut summary = ImportSummary::default();
        let mut entries = Vec::new();

        for candidate in candidates {
            match engine.plan(&next, &candidate, Utc::now()) {
                Ok(plan) => {
                    let Some(record) = plan.record() else {
                        summary.unchanged += 1;
                        continue;
                    };
                    entries.push(LogEntry::put(record)?);
                    if plan.was_created() {
                        summary.added += 1;
                    } else {
                        summary.updated += 1;
                    }
                    next.commit(plan);
                }
                Err(MergeError::Conflict(conflict)) => {
                    summary.conflicts += 1;
                    summary.warnings.push(conflict.to_string());
                }
                Err(MergeError::InvalidCandidate(message)) => {
                    warn!("Skipping candidate '{}': {message}", candidate.full_name);
                    summary.invalid += 1;
                    summary
                        .warnings
                        .push(format!("'{}': {message}", candidate.full_name));
                }
                Err(e) => return Err(e.into()),
            }
        }

        if !entries.is_empty() {
            self.persist(&mut writer, &entries)?;
            self.swap(next);
            self.compact_if_due(&mut writer);
        }
        info!(
            "Imported {} candidates: {} added, {} updated, {} unchanged, {} conflicts, {} invalid",
            summary.total(),
            summary.added,
            summary.updated,
            summary.unchanged,
            summary.conflicts,
            summary.invalid
        );
        Ok(summary)
    }

    /// Delete a record and its index entries. Its id is never reused.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if no record has this id.
    pub fn remove(&self, id: JournalId) -> Result<JournalRecord, StoreError> {
        let mut writer = self.lock_writer();
        if self.snapshot().get(id).is_none() {
            return Err(StoreError::NotFound(id.to_string()));
        }

        self.persist(&mut writer, &[LogEntry::Remove(id)])?;
        let removed = self
            .commit_in_place(|snapshot| snapshot.remove(id))
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        self.compact_if_due(&mut writer);
        info!("Removed {} '{}'", id, removed.full_name);
        Ok(removed)
    }

    /// Drop and re-derive both index partitions from record bodies.
    ///
    /// Returns the number of indexed keys.
    ///
    /// # Errors
    ///
    /// Returns an error if the rebuilt index cannot be written.
    pub fn rebuild_index(&self) -> Result<usize, StoreError> {
        let mut writer = self.lock_writer();
        let mut next = (*self.snapshot()).clone();
        let keys = next.rebuild_index();
        if let Some(dir) = &self.dir {
            persist::save_index(dir, &next)?;
            writer.index_generation = next.generation();
        }
        self.swap(next);
        info!("Rebuilt index: {keys} keys");
        Ok(keys)
    }

    /// Check the index partitions against the record bodies
    ///
    /// # Errors
    ///
    /// Returns `StoreError::CorruptIndex` on any mismatch.
    pub fn verify_index(&self) -> Result<(), StoreError> {
        self.snapshot().verify_index()
    }

    #[must_use]
    pub fn stats(&self) -> StoreStats {
        let snapshot = self.snapshot();
        StoreStats {
            records: snapshot.len(),
            name_keys: snapshot.name_key_count(),
            abbreviation_keys: snapshot.abbreviation_key_count(),
            format_version: persist::FORMAT_VERSION,
            next_id: snapshot.next_id().0,
            generation: snapshot.generation(),
        }
    }

    fn lock_writer(&self) -> MutexGuard<'_, WriterState> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append one batch to the records log. Caller holds `writer`.
    fn persist(&self, writer: &mut WriterState, entries: &[LogEntry]) -> Result<(), StoreError> {
        if let Some(dir) = &self.dir {
            persist::append(dir, entries)?;
            writer.batches += 1;
        }
        Ok(())
    }

    /// Apply an already persisted change to the committed state. Caller holds
    /// `writer`.
    fn commit_in_place<T>(&self, change: impl FnOnce(&mut CatalogSnapshot) -> T) -> T {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        change(Arc::make_mut(&mut *state))
    }

    fn swap(&self, next: CatalogSnapshot) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);
    }

    /// Compact the records log once it holds more batches than records.
    /// Caller holds `writer`.
    fn compact_if_due(&self, writer: &mut WriterState) {
        let Some(dir) = &self.dir else {
            return;
        };
        let snapshot = self.snapshot();
        if writer.batches <= MIN_BATCHES_BEFORE_COMPACTION.max(snapshot.len()) {
            return;
        }

        match persist::compact(dir, &snapshot) {
            Ok(()) => {
                debug!(
                    "Compacted {} log batches into {} records",
                    writer.batches,
                    snapshot.len()
                );
                writer.batches = 1;
                writer.index_generation = snapshot.generation();
            }
            // The log is still valid; compaction is retried on the next write
            Err(e) => warn!("Failed to compact records in {}: {e}", dir.display()),
        }
    }
}

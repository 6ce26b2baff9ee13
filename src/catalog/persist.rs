//! On-disk layout of a journal store directory.
//!
//! | File           | Contents                                                      |
//! |----------------|---------------------------------------------------------------|
//! | `journals.bin` | magic + format version, then an append-only log of batches    |
//! | `names.idx`    | generation + name-key and abbreviation-key index entries      |
//!
//! Every write appends one length-prefixed batch to `journals.bin` and syncs
//! it; that append is the commit point. A batch holds the bodies of the records
//! it puts (each bincode-encoded on its own and keyed by id) and the ids it
//! removes, so a write costs the size of what it touches. Replaying the batches
//! in order reproduces the records, the id counter and the generation.
//!
//! Once the log holds more batches than the catalog holds records it is
//! compacted: the whole catalog is written as one checkpoint batch to a temp
//! file in the same directory, synced, and renamed over `journals.bin`.
//!
//! The index is written on close, compaction and rebuild (temp file + rename).
//! It carries the generation of the records it was built from; any mismatch
//! marks it stale.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::core::record::JournalRecord;
use crate::core::types::JournalId;

use super::snapshot::CatalogSnapshot;
use super::store::StoreError;

/// Version of the on-disk format
pub const FORMAT_VERSION: u32 = 2;

pub const RECORDS_FILE: &str = "journals.bin";
pub const INDEX_FILE: &str = "names.idx";

const MAGIC: &[u8; 4] = b"JABR";
const HEADER_LEN: usize = 8;
const FRAME_PREFIX_LEN: usize = 8;

/// One change in a records-log batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogEntry {
    /// Insert or replace the record stored under `id`
    Put { id: JournalId, body: Vec<u8> },
    /// Delete a record
    Remove(JournalId),
    /// Absolute counters, written after the records of a compacted log
    Checkpoint { next_id: u64, generation: u64 },
}

impl LogEntry {
    /// Encode a record body
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be encoded.
    pub fn put(record: &JournalRecord) -> Result<Self, StoreError> {
        Ok(Self::Put {
            id: record.id,
            body: bincode::serialize(record)?,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    version: u32,
    generation: u64,
    names: Vec<(String, JournalId)>,
    abbreviations: Vec<(String, Vec<JournalId>)>,
}

/// A snapshot read from disk
#[derive(Debug)]
pub struct Loaded {
    pub snapshot: CatalogSnapshot,
    /// The index file was missing, stale or inconsistent and has been rebuilt in
    /// memory; it should be written back
    pub index_rebuilt: bool,
    /// Batches in the records log
    pub batches: usize,
}

/// Records, counters and log length reconstructed from `journals.bin`
#[derive(Debug, Default)]
struct Replay {
    records: BTreeMap<JournalId, JournalRecord>,
    next_id: u64,
    generation: u64,
    batches: usize,
    /// Bytes up to the end of the last complete batch
    valid_len: usize,
}

impl Replay {
    fn apply(&mut self, entry: LogEntry) -> Result<(), StoreError> {
        match entry {
            LogEntry::Put { id, body } => {
                let record: JournalRecord = bincode::deserialize(&body)?;
                if record.id != id {
                    return Err(StoreError::CorruptRecords(format!(
                        "record stored under {id} carries id {}",
                        record.id
                    )));
                }
                self.next_id = self.next_id.max(id.0 + 1);
                self.generation += 1;
                self.records.insert(id, record);
            }
            LogEntry::Remove(id) => {
                self.records.remove(&id);
                self.generation += 1;
            }
            LogEntry::Checkpoint {
                next_id,
                generation,
            } => {
                self.next_id = self.next_id.max(next_id);
                self.generation = generation;
            }
        }
        Ok(())
    }
}

/// Load a store directory. A directory without a records file is an empty store.
///
/// A batch cut short at the end of the log (a write interrupted before it
/// committed) is discarded and truncated away.
///
/// # Errors
///
/// Returns an error if the records file cannot be read or decoded, or was
/// written by an unsupported format version. Index problems are repaired, not
/// reported.
pub fn load(dir: &Path) -> Result<Loaded, StoreError> {
    let records_path = dir.join(RECORDS_FILE);
    let bytes = if records_path.exists() {
        fs::read(&records_path)?
    } else {
        Vec::new()
    };
    if bytes.is_empty() {
        debug!("No records in {}; starting empty", dir.display());
        return Ok(Loaded {
            snapshot: CatalogSnapshot::new(),
            index_rebuilt: false,
            batches: 0,
        });
    }

    let replay = replay(&bytes)?;
    if replay.valid_len < bytes.len() {
        warn!(
            "Discarding {} bytes of an incomplete write at the end of {}",
            bytes.len() - replay.valid_len,
            records_path.display()
        );
        OpenOptions::new()
            .write(true)
            .open(&records_path)?
            .set_len(replay.valid_len as u64)?;
    }

    let generation = replay.generation;
    let batches = replay.batches;
    let mut snapshot =
        CatalogSnapshot::from_records(replay.records.into_values(), replay.next_id, generation);
    let index_rebuilt = match read_index(dir) {
        Ok(Some(index)) if index.generation == generation => {
            snapshot.install_index(index.names, index.abbreviations);
            match snapshot.verify_index() {
                Ok(()) => false,
                Err(e) => {
                    warn!("Rebuilding index in {}: {e}", dir.display());
                    snapshot.rebuild_index();
                    true
                }
            }
        }
        Ok(Some(index)) => {
            warn!(
                "Index in {} is stale (generation {} != {generation}); rebuilding",
                dir.display(),
                index.generation
            );
            true
        }
        Ok(None) => {
            warn!("Index missing in {}; rebuilding", dir.display());
            true
        }
        Err(e) => {
            warn!("Index in {} is unreadable ({e}); rebuilding", dir.display());
            true
        }
    };

    debug!(
        "Loaded {} records from {batches} batches in {} (generation {generation})",
        snapshot.len(),
        dir.display()
    );
    Ok(Loaded {
        snapshot,
        index_rebuilt,
        batches,
    })
}

fn replay(bytes: &[u8]) -> Result<Replay, StoreError> {
    if !bytes.starts_with(MAGIC) {
        return Err(StoreError::CorruptRecords(
            "not a journal store records file".to_string(),
        ));
    }
    let version = bytes
        .get(MAGIC.len()..HEADER_LEN)
        .and_then(|v| v.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or_else(|| StoreError::CorruptRecords("truncated header".to_string()))?;
    if version != FORMAT_VERSION {
        return Err(StoreError::UnsupportedVersion(version));
    }

    let mut replay = Replay {
        valid_len: HEADER_LEN,
        ..Replay::default()
    };
    let mut offset = HEADER_LEN;
    while offset < bytes.len() {
        let Some(len) = bytes
            .get(offset..offset + FRAME_PREFIX_LEN)
            .and_then(|v| v.try_into().ok())
            .map(u64::from_le_bytes)
            .and_then(|len| usize::try_from(len).ok())
        else {
            break;
        };
        let start = offset + FRAME_PREFIX_LEN;
        let Some(body) = start.checked_add(len).and_then(|end| bytes.get(start..end)) else {
            break;
        };
        let end = start + len;

        let entries: Vec<LogEntry> = match bincode::deserialize(body) {
            Ok(entries) => entries,
            // Only the final batch may be cut short
            Err(_) if end == bytes.len() => break,
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            replay.apply(entry)?;
        }
        replay.batches += 1;
        replay.valid_len = end;
        offset = end;
    }
    Ok(replay)
}

fn read_index(dir: &Path) -> Result<Option<IndexFile>, StoreError> {
    let path = dir.join(INDEX_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let index: IndexFile = bincode::deserialize(&fs::read(path)?)?;
    if index.version != FORMAT_VERSION {
        return Err(StoreError::UnsupportedVersion(index.version));
    }
    Ok(Some(index))
}

/// Append one batch to the records log and sync it.
///
/// On failure the log is truncated back to its last committed batch.
///
/// # Errors
///
/// Returns an error if encoding or any file operation fails; the batch is then
/// not committed.
pub fn append(dir: &Path, entries: &[LogEntry]) -> Result<(), StoreError> {
    let frame = encode_frame(entries)?;
    let path = dir.join(RECORDS_FILE);
    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    let committed = file.metadata()?.len();

    if let Err(e) = write_frame(&mut file, committed == 0, &frame) {
        if let Err(truncate) = file.set_len(committed) {
            warn!(
                "Failed to roll back {} after a failed write: {truncate}",
                path.display()
            );
        }
        return Err(e.into());
    }
    Ok(())
}

fn write_frame(file: &mut File, with_header: bool, frame: &[u8]) -> std::io::Result<()> {
    if with_header {
        file.write_all(&header())?;
    }
    file.write_all(frame)?;
    file.sync_data()
}

/// Replace the records log with a single checkpoint batch of `snapshot`, then
/// write its index
///
/// # Errors
///
/// Returns an error if encoding or any file operation fails. A failure before
/// the rename leaves the previous log in place.
pub fn compact(dir: &Path, snapshot: &CatalogSnapshot) -> Result<(), StoreError> {
    let mut entries = snapshot
        .records()
        .map(LogEntry::put)
        .collect::<Result<Vec<_>, StoreError>>()?;
    entries.push(LogEntry::Checkpoint {
        next_id: snapshot.next_id().0,
        generation: snapshot.generation(),
    });

    let mut bytes = header();
    bytes.extend(encode_frame(&entries)?);
    write_atomic(dir, RECORDS_FILE, &bytes)?;
    save_index(dir, snapshot)
}

/// Write the index partition
///
/// # Errors
///
/// Returns an error if encoding or any file operation fails.
pub fn save_index(dir: &Path, snapshot: &CatalogSnapshot) -> Result<(), StoreError> {
    let file = IndexFile {
        version: FORMAT_VERSION,
        generation: snapshot.generation(),
        names: snapshot.name_entries(),
        abbreviations: snapshot.abbreviation_entries(),
    };
    write_atomic(dir, INDEX_FILE, &bincode::serialize(&file)?)
}

fn header() -> Vec<u8> {
    let mut header = Vec::with_capacity(HEADER_LEN);
    header.extend_from_slice(MAGIC);
    header.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    header
}

fn encode_frame(entries: &[LogEntry]) -> Result<Vec<u8>, StoreError> {
    let body = bincode::serialize(entries)?;
    let mut frame = Vec::with_capacity(FRAME_PREFIX_LEN + body.len());
    frame.extend_from_slice(&(body.len() as u64).to_le_bytes());
    frame.extend(body);
    Ok(frame)
}

/// Replace `dir/name` with `bytes` so readers see either the old or new file
fn write_atomic(dir: &Path, name: &str, bytes: &[u8]) -> Result<(), StoreError> {
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(dir.join(name)).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn examples() -> JournalRecord {
        let mut record = JournalRecord::new(JournalId(0), "Journal of Examples");
        record.abbreviation = Some("J. Examp.".to_string());
        record.aliases.insert("J of Examples".to_string());
        record
    }

    /// Log the same history a store would: create two records, remove one
    fn write_history(dir: &Path) -> CatalogSnapshot {
        let mut snapshot = CatalogSnapshot::new();
        for record in [examples(), JournalRecord::new(JournalId(1), "Nature")] {
            append(dir, &[LogEntry::put(&record).unwrap()]).unwrap();
            snapshot.insert(record);
        }
        append(dir, &[LogEntry::Remove(JournalId(1))]).unwrap();
        snapshot.remove(JournalId(1));
        snapshot
    }

    #[test]
    fn test_replay_restores_records_and_counters() {
        let dir = TempDir::new().unwrap();
        let snapshot = write_history(dir.path());
        save_index(dir.path(), &snapshot).unwrap();

        let loaded = load(dir.path()).unwrap();
        assert!(!loaded.index_rebuilt);
        assert_eq!(loaded.batches, 3);
        assert_eq!(loaded.snapshot.len(), 1);
        assert_eq!(loaded.snapshot.next_id(), JournalId(2));
        assert_eq!(loaded.snapshot.generation(), snapshot.generation());
        assert_eq!(loaded.snapshot.get(JournalId(0)), snapshot.get(JournalId(0)));
    }

    #[test]
    fn test_missing_directory_contents_is_empty_store() {
        let dir = TempDir::new().unwrap();
        let loaded = load(dir.path()).unwrap();
        assert!(loaded.snapshot.is_empty());
        assert!(!loaded.index_rebuilt);
        assert_eq!(loaded.batches, 0);
    }

    #[test]
    fn test_compact_keeps_counters() {
        let dir = TempDir::new().unwrap();
        let snapshot = write_history(dir.path());
        let before = fs::metadata(dir.path().join(RECORDS_FILE)).unwrap().len();

        compact(dir.path(), &snapshot).unwrap();
        assert!(fs::metadata(dir.path().join(RECORDS_FILE)).unwrap().len() < before);

        let loaded = load(dir.path()).unwrap();
        assert!(!loaded.index_rebuilt);
        assert_eq!(loaded.batches, 1);
        assert_eq!(loaded.snapshot.next_id(), JournalId(2));
        assert_eq!(loaded.snapshot.generation(), snapshot.generation());

        // Appends after compaction replay on top of the checkpoint
        append(
            dir.path(),
            &[LogEntry::put(&JournalRecord::new(JournalId(2), "Cell")).unwrap()],
        )
        .unwrap();
        let loaded = load(dir.path()).unwrap();
        assert_eq!(loaded.snapshot.len(), 2);
        assert_eq!(loaded.snapshot.generation(), snapshot.generation() + 1);
    }

    #[test]
    fn test_torn_final_batch_is_discarded() {
        let dir = TempDir::new().unwrap();
        write_history(dir.path());
        let path = dir.path().join(RECORDS_FILE);
        let committed = fs::metadata(&path).unwrap().len();

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&64u64.to_le_bytes()).unwrap();
        file.write_all(b"partial").unwrap();
        drop(file);

        let loaded = load(dir.path()).unwrap();
        assert_eq!(loaded.snapshot.len(), 1);
        assert_eq!(loaded.batches, 3);
        assert_eq!(fs::metadata(&path).unwrap().len(), committed);
    }

    #[test]
    fn test_missing_index_is_rebuilt() {
        let dir = TempDir::new().unwrap();
        write_history(dir.path());

        let loaded = load(dir.path()).unwrap();
        assert!(loaded.index_rebuilt);
        assert_eq!(loaded.snapshot.lookup_name_key("j examples"), Some(JournalId(0)));
    }

    #[test]
    fn test_garbage_index_is_rebuilt() {
        let dir = TempDir::new().unwrap();
        write_history(dir.path());
        fs::write(dir.path().join(INDEX_FILE), b"not an index").unwrap();

        let loaded = load(dir.path()).unwrap();
        assert!(loaded.index_rebuilt);
        assert!(loaded.snapshot.verify_index().is_ok());
    }

    #[test]
    fn test_stale_index_is_rebuilt() {
        let dir = TempDir::new().unwrap();
        let snapshot = write_history(dir.path());
        save_index(dir.path(), &snapshot).unwrap();

        // Records move on without the index
        append(
            dir.path(),
            &[LogEntry::put(&JournalRecord::new(JournalId(5), "Cell")).unwrap()],
        )
        .unwrap();

        let loaded = load(dir.path()).unwrap();
        assert!(loaded.index_rebuilt);
        assert_eq!(loaded.snapshot.lookup_name_key("cell"), Some(JournalId(5)));
        assert_eq!(loaded.snapshot.next_id(), JournalId(6));
    }

    #[test]
    fn test_foreign_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(RECORDS_FILE), b"garbage").unwrap();
        assert!(matches!(
            load(dir.path()),
            Err(StoreError::CorruptRecords(_))
        ));
    }

    #[test]
    fn test_unsupported_version() {
        let dir = TempDir::new().unwrap();
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&(FORMAT_VERSION + 1).to_le_bytes());
        fs::write(dir.path().join(RECORDS_FILE), bytes).unwrap();

        assert!(matches!(
            load(dir.path()),
            Err(StoreError::UnsupportedVersion(v)) if v == FORMAT_VERSION + 1
        ));
    }
}

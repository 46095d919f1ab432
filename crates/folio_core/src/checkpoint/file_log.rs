//! File-backed checkpoint log.
//!
//! ## Record Format
//!
//! ```text
//! | magic (4) | version (2) | type (1) | length (4) | payload... | crc32 (4) |
//! ```
//!
//! Insert payload:
//!
//! ```text
//! | id (8) | timestamp (8) | trigger_len (2) | trigger... |
//! | pruned_count (4) | pruned ids (8 each)... | blob_len (4) | blob... |
//! ```
//!
//! Each record is one transaction: the inserted checkpoint together with the
//! ids it prunes. A record that was only partly written at the end of the
//! file is cut off when the log is opened.
//!
//! Pruned records stay in the file until it is compacted. An insert compacts
//! the log once the bytes held by pruned records exceed the bytes of the
//! live ones, so the file size stays proportional to the retained snapshots.

use super::log::{ids_to_prune, CheckpointLog};
use super::{newest_first, Checkpoint, CheckpointId, CheckpointInfo, NewCheckpoint};
use crate::error::{CoreError, CoreResult};
use crate::snapshot::compute_crc32;
use folio_storage::{FileBackend, StorageBackend};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Magic bytes identifying a checkpoint log record.
const LOG_MAGIC: [u8; 4] = *b"FCKP";
/// Current log format version.
const LOG_VERSION: u16 = 1;
/// Record type of an insert-and-prune transaction.
const RECORD_INSERT: u8 = 1;
/// magic (4) + version (2) + type (1) + length (4)
const HEADER_SIZE: usize = 11;
/// CRC size.
const CRC_SIZE: usize = 4;

struct IndexEntry {
    info: CheckpointInfo,
    blob_offset: u64,
    record_len: u64,
}

struct FileLogInner {
    backend: FileBackend,
    last_id: CheckpointId,
    entries: BTreeMap<CheckpointId, IndexEntry>,
}

/// A checkpoint log stored in a single append-only file.
///
/// Only the index is kept in memory; blobs are read from the file on
/// demand.
pub struct FileCheckpointLog {
    path: PathBuf,
    inner: Mutex<FileLogInner>,
}

struct DecodedInsert<'a> {
    id: CheckpointId,
    timestamp: u64,
    trigger: String,
    pruned: Vec<CheckpointId>,
    blob: &'a [u8],
    blob_offset_in_payload: usize,
}

enum Scan<'a> {
    Record(DecodedInsert<'a>, usize),
    Torn,
}

impl FileCheckpointLog {
    /// Opens or creates the log at `path`, replaying existing records.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Corruption`] if a record other than the last one
    /// is damaged, or an I/O error.
    pub fn open(path: &Path) -> CoreResult<Self> {
        let backend = FileBackend::open_with_create_dirs(path)?;
        let data = backend.read_all()?;

        let mut last_id = 0;
        let mut entries = BTreeMap::new();
        let mut offset = 0;

        while offset < data.len() {
            match scan_record(&data, offset)? {
                Scan::Record(record, len) => {
                    last_id = last_id.max(record.id);
                    for pruned in &record.pruned {
                        entries.remove(pruned);
                    }
                    let blob_offset = (offset + HEADER_SIZE + record.blob_offset_in_payload) as u64;
                    entries.insert(
                        record.id,
                        IndexEntry {
                            info: CheckpointInfo {
                                id: record.id,
                                timestamp: record.timestamp,
                                trigger: record.trigger,
                                size: record.blob.len(),
                            },
                            blob_offset,
                            record_len: len as u64,
                        },
                    );
                    offset += len;
                }
                Scan::Torn => break,
            }
        }

        if offset < data.len() {
            warn!(
                path = %path.display(),
                valid = offset,
                discarded = data.len() - offset,
                "truncating torn checkpoint log tail"
            );
            backend.truncate(offset as u64)?;
            backend.sync()?;
        }

        debug!(path = %path.display(), checkpoints = entries.len(), "opened checkpoint log");
        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(FileLogInner {
                backend,
                last_id,
                entries,
            }),
        })
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of live checkpoints.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Returns true if no checkpoint is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of the log file in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be read.
    pub fn file_size(&self) -> CoreResult<u64> {
        Ok(self.inner.lock().backend.size()?)
    }

    /// Rewrites the live checkpoints into a fresh file and swaps it in.
    ///
    /// Returns the number of bytes reclaimed.
    ///
    /// # Errors
    ///
    /// Returns an error if the new file cannot be written or renamed. The
    /// current log stays in use in that case.
    pub fn compact(&self) -> CoreResult<u64> {
        let mut inner = self.inner.lock();
        self.compact_locked(&mut inner)
    }

    fn compact_locked(&self, inner: &mut FileLogInner) -> CoreResult<u64> {
        let tmp = self.path.with_extension("compact");
        match std::fs::remove_file(&tmp) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => return Err(err.into()),
            _ => {}
        }

        let fresh = FileBackend::open(&tmp)?;
        let mut entries = BTreeMap::new();
        for (id, entry) in &inner.entries {
            let blob = inner.backend.read_at(entry.blob_offset, entry.info.size)?;
            let (bytes, blob_offset_in_record) = encode_insert(&entry.info, &[], &blob)?;
            let offset = fresh.append(&bytes)?;
            entries.insert(
                *id,
                IndexEntry {
                    info: entry.info.clone(),
                    blob_offset: offset + blob_offset_in_record as u64,
                    record_len: bytes.len() as u64,
                },
            );
        }
        fresh.sync()?;

        let before = inner.backend.size()?;
        let after = fresh.size()?;
        drop(fresh);

        std::fs::rename(&tmp, &self.path)?;
        inner.backend = FileBackend::open(&self.path)?;
        inner.entries = entries;

        let reclaimed = before.saturating_sub(after);
        info!(path = %self.path.display(), reclaimed, "compacted checkpoint log");
        Ok(reclaimed)
    }

    /// Compacts when pruned records take more space than live ones.
    fn compact_if_wasteful(&self, inner: &mut FileLogInner) {
        let live: u64 = inner.entries.values().map(|e| e.record_len).sum();
        let size = match inner.backend.size() {
            Ok(size) => size,
            Err(err) => {
                warn!(error = %err, "could not read checkpoint log size");
                return;
            }
        };
        if size.saturating_sub(live) <= live {
            return;
        }
        if let Err(err) = self.compact_locked(inner) {
            warn!(error = %err, "checkpoint log compaction failed, will retry on a later insert");
        }
    }
}

impl CheckpointLog for FileCheckpointLog {
    fn insert_and_prune(
        &self,
        checkpoint: NewCheckpoint,
        retention: usize,
    ) -> CoreResult<(CheckpointId, Vec<CheckpointId>)> {
        let mut inner = self.inner.lock();
        let id = inner.last_id + 1;

        // The new id is the largest, so only existing entries are pruned.
        let pruned = ids_to_prune(inner.entries.keys().copied(), retention.max(1) - 1);

        let info = CheckpointInfo {
            id,
            timestamp: checkpoint.timestamp,
            trigger: checkpoint.trigger,
            size: checkpoint.blob.len(),
        };
        let (bytes, blob_offset_in_record) = encode_insert(&info, &pruned, &checkpoint.blob)?;

        let offset = inner.backend.size()?;
        if let Err(err) = inner
            .backend
            .append(&bytes)
            .and_then(|_| inner.backend.sync())
        {
            // Cut the partial record so later appends stay parseable.
            if let Err(cleanup) = inner.backend.truncate(offset) {
                warn!(error = %cleanup, "could not remove partial checkpoint record");
            }
            return Err(err.into());
        }

        inner.last_id = id;
        for old in &pruned {
            inner.entries.remove(old);
        }
        inner.entries.insert(
            id,
            IndexEntry {
                info,
                blob_offset: offset + blob_offset_in_record as u64,
                record_len: bytes.len() as u64,
            },
        );
        if !pruned.is_empty() {
            self.compact_if_wasteful(&mut inner);
        }
        Ok((id, pruned))
    }

    fn list(&self) -> CoreResult<Vec<CheckpointInfo>> {
        let mut entries: Vec<_> = self
            .inner
            .lock()
            .entries
            .values()
            .map(|e| e.info.clone())
            .collect();
        newest_first(&mut entries);
        Ok(entries)
    }

    fn get(&self, id: CheckpointId) -> CoreResult<Option<Checkpoint>> {
        let inner = self.inner.lock();
        let Some(entry) = inner.entries.get(&id) else {
            return Ok(None);
        };
        let blob = inner.backend.read_at(entry.blob_offset, entry.info.size)?;
        Ok(Some(Checkpoint {
            info: entry.info.clone(),
            blob,
        }))
    }
}

/// Encodes an insert record. Returns the bytes and the offset of the blob
/// within them.
fn encode_insert(
    info: &CheckpointInfo,
    pruned: &[CheckpointId],
    blob: &[u8],
) -> CoreResult<(Vec<u8>, usize)> {
    let trigger_len = u16::try_from(info.trigger.len())
        .map_err(|_| CoreError::invalid_format("checkpoint trigger too long"))?;
    let pruned_count = u32::try_from(pruned.len())
        .map_err(|_| CoreError::invalid_format("too many pruned checkpoints"))?;
    let blob_len = u32::try_from(blob.len())
        .map_err(|_| CoreError::invalid_format("checkpoint blob too large"))?;

    let mut payload = Vec::with_capacity(
        8 + 8 + 2 + info.trigger.len() + 4 + 8 * pruned.len() + 4 + blob.len(),
    );
    payload.extend_from_slice(&info.id.to_le_bytes());
    payload.extend_from_slice(&info.timestamp.to_le_bytes());
    payload.extend_from_slice(&trigger_len.to_le_bytes());
    payload.extend_from_slice(info.trigger.as_bytes());
    payload.extend_from_slice(&pruned_count.to_le_bytes());
    for id in pruned {
        payload.extend_from_slice(&id.to_le_bytes());
    }
    payload.extend_from_slice(&blob_len.to_le_bytes());
    let blob_offset_in_payload = payload.len();
    payload.extend_from_slice(blob);

    let len = u32::try_from(payload.len())
        .map_err(|_| CoreError::invalid_format("checkpoint record too large"))?;

    let mut data = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
    data.extend_from_slice(&LOG_MAGIC);
    data.extend_from_slice(&LOG_VERSION.to_le_bytes());
    data.push(RECORD_INSERT);
    data.extend_from_slice(&len.to_le_bytes());
    data.extend_from_slice(&payload);

    let crc = compute_crc32(&data);
    data.extend_from_slice(&crc.to_le_bytes());
    Ok((data, HEADER_SIZE + blob_offset_in_payload))
}

/// Reads the record starting at `offset`.
fn scan_record(data: &[u8], offset: usize) -> CoreResult<Scan<'_>> {
    let remaining = &data[offset..];
    if remaining.len() < HEADER_SIZE {
        return Ok(Scan::Torn);
    }

    if remaining[0..4] != LOG_MAGIC {
        return Err(CoreError::corruption(format!(
            "invalid checkpoint log magic at offset {offset}"
        )));
    }
    let version = u16::from_le_bytes([remaining[4], remaining[5]]);
    if version > LOG_VERSION {
        return Err(CoreError::invalid_format(format!(
            "unsupported checkpoint log version {version} at offset {offset}"
        )));
    }
    let record_type = remaining[6];
    if record_type != RECORD_INSERT {
        return Err(CoreError::corruption(format!(
            "unknown checkpoint log record type {record_type} at offset {offset}"
        )));
    }

    let len = u32::from_le_bytes([remaining[7], remaining[8], remaining[9], remaining[10]]) as usize;
    let total = HEADER_SIZE + len + CRC_SIZE;
    if remaining.len() < total {
        return Ok(Scan::Torn);
    }

    let crc_offset = HEADER_SIZE + len;
    let stored = u32::from_le_bytes([
        remaining[crc_offset],
        remaining[crc_offset + 1],
        remaining[crc_offset + 2],
        remaining[crc_offset + 3],
    ]);
    if stored != compute_crc32(&remaining[..crc_offset]) {
        if remaining.len() == total {
            return Ok(Scan::Torn);
        }
        return Err(CoreError::corruption(format!(
            "checkpoint log checksum mismatch at offset {offset}"
        )));
    }

    let record = decode_insert(&remaining[HEADER_SIZE..crc_offset]).ok_or_else(|| {
        CoreError::corruption(format!("malformed checkpoint record at offset {offset}"))
    })?;
    Ok(Scan::Record(record, total))
}

fn decode_insert(payload: &[u8]) -> Option<DecodedInsert<'_>> {
    let mut reader = Reader { data: payload, pos: 0 };
    let id = reader.u64()?;
    let timestamp = reader.u64()?;
    let trigger_len = reader.u16()? as usize;
    let trigger = String::from_utf8(reader.bytes(trigger_len)?.to_vec()).ok()?;
    let pruned_count = reader.u32()? as usize;
    let pruned = (0..pruned_count)
        .map(|_| reader.u64())
        .collect::<Option<Vec<_>>>()?;
    let blob_len = reader.u32()? as usize;
    let blob_offset_in_payload = reader.pos;
    let blob = reader.bytes(blob_len)?;
    if reader.pos != payload.len() {
        return None;
    }

    Some(DecodedInsert {
        id,
        timestamp,
        trigger,
        pruned,
        blob,
        blob_offset_in_payload,
    })
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn bytes(&mut self, len: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(len)?;
        let slice = self.data.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }

    fn u16(&mut self) -> Option<u16> {
        self.bytes(2).map(|b| u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Option<u32> {
        self.bytes(4).map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Option<u64> {
        self.bytes(8)
            .map(|b| u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use std::io::Write;
    use tempfile::tempdir;

    fn new_checkpoint(timestamp: u64, blob: &[u8]) -> NewCheckpoint {
        NewCheckpoint {
            timestamp,
            trigger: "pre-sync".into(),
            blob: blob.to_vec(),
        }
    }

    #[test]
    fn insert_and_get() {
        let dir = tempdir().unwrap();
        let log = FileCheckpointLog::open(&dir.path().join("checkpoints.log")).unwrap();

        let (id, pruned) = log.insert_and_prune(new_checkpoint(7, b"blob-a"), 10).unwrap();
        assert!(pruned.is_empty());

        let checkpoint = log.get(id).unwrap().unwrap();
        assert_eq!(checkpoint.blob, b"blob-a");
        assert_eq!(checkpoint.info.timestamp, 7);
        assert_eq!(checkpoint.info.trigger, "pre-sync");
        assert_eq!(checkpoint.info.size, 6);
    }

    #[test]
    fn reopen_replays_inserts_and_prunes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("checkpoints.log");

        let first = {
            let log = FileCheckpointLog::open(&path).unwrap();
            let (first, _) = log.insert_and_prune(new_checkpoint(1, b"one"), 2).unwrap();
            log.insert_and_prune(new_checkpoint(2, b"two"), 2).unwrap();
            let (_, pruned) = log.insert_and_prune(new_checkpoint(3, b"three"), 2).unwrap();
            assert_eq!(pruned, vec![first]);
            first
        };

        let log = FileCheckpointLog::open(&path).unwrap();
        assert_eq!(log.len(), 2);
        assert!(log.get(first).unwrap().is_none());
        let newest = &log.list().unwrap()[0];
        assert_eq!(log.get(newest.id).unwrap().unwrap().blob, b"three");

        // Ids keep increasing after reopen.
        let (next, _) = log.insert_and_prune(new_checkpoint(4, b"four"), 2).unwrap();
        assert!(next > newest.id);
    }

    #[test]
    fn torn_tail_is_truncated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("checkpoints.log");

        let good_size = {
            let log = FileCheckpointLog::open(&path).unwrap();
            log.insert_and_prune(new_checkpoint(1, b"kept"), 10).unwrap();
            log.file_size().unwrap()
        };

        let info = CheckpointInfo {
            id: 2,
            timestamp: 2,
            trigger: "pre-sync".into(),
            size: 4,
        };
        let (record, _) = encode_insert(&info, &[], b"lost").unwrap();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&record[..record.len() - 3]).unwrap();
        drop(file);

        let log = FileCheckpointLog::open(&path).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log.file_size().unwrap(), good_size);
    }

    #[test]
    fn damaged_middle_record_is_corruption() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("checkpoints.log");
        {
            let log = FileCheckpointLog::open(&path).unwrap();
            log.insert_and_prune(new_checkpoint(1, b"first"), 10).unwrap();
            log.insert_and_prune(new_checkpoint(2, b"second"), 10).unwrap();
        }

        let mut bytes = std::fs::read(&path).unwrap();
        bytes[HEADER_SIZE + 20] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        assert!(matches!(
            FileCheckpointLog::open(&path),
            Err(CoreError::Corruption { .. })
        ));
    }

    #[test]
    fn compact_reclaims_pruned_space() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("checkpoints.log");
        let log = FileCheckpointLog::open(&path).unwrap();
        for i in 0..3 {
            log.insert_and_prune(new_checkpoint(i, &[i as u8; 64]), 2).unwrap();
        }

        let before = log.list().unwrap();
        let reclaimed = log.compact().unwrap();
        assert!(reclaimed > 0);
        assert_eq!(log.list().unwrap(), before);
        for info in &before {
            assert_eq!(log.get(info.id).unwrap().unwrap().blob.len(), 64);
        }

        let reopened = FileCheckpointLog::open(&path).unwrap();
        assert_eq!(reopened.list().unwrap(), before);
    }

    #[test]
    fn pruned_snapshots_do_not_accumulate_on_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("checkpoints.log");
        let log = FileCheckpointLog::open(&path).unwrap();
        let blob = vec![7u8; 16 * 1024];

        log.insert_and_prune(new_checkpoint(0, &blob), 2).unwrap();
        log.insert_and_prune(new_checkpoint(1, &blob), 2).unwrap();
        let retained = log.file_size().unwrap();

        for i in 2..100 {
            log.insert_and_prune(new_checkpoint(i, &blob), 2).unwrap();
            assert!(log.file_size().unwrap() <= 3 * retained, "grew at insert {i}");
        }
        assert_eq!(log.len(), 2);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), log.file_size().unwrap());

        let newest = log.list().unwrap()[0].clone();
        assert_eq!(newest.timestamp, 99);
        let reopened = FileCheckpointLog::open(&path).unwrap();
        assert_eq!(reopened.get(newest.id).unwrap().unwrap().blob, blob);
    }
}

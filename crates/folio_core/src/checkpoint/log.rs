//! The checkpoint log interface and its in-memory implementation.

use super::{newest_first, Checkpoint, CheckpointId, CheckpointInfo, NewCheckpoint};
use crate::error::CoreResult;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Persisted, append-only store of checkpoints.
///
/// `insert_and_prune` is a single transaction: after it returns either the
/// new checkpoint is stored and the excess ones are gone, or nothing
/// changed.
pub trait CheckpointLog: Send + Sync {
    /// Stores `checkpoint` and deletes the oldest entries (by id) until at
    /// most `retention` remain. Returns the new id and the pruned ids.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be written.
    fn insert_and_prune(
        &self,
        checkpoint: NewCheckpoint,
        retention: usize,
    ) -> CoreResult<(CheckpointId, Vec<CheckpointId>)>;

    /// All checkpoints, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read.
    fn list(&self) -> CoreResult<Vec<CheckpointInfo>>;

    /// Fetches one checkpoint with its blob.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read.
    fn get(&self, id: CheckpointId) -> CoreResult<Option<Checkpoint>>;

    /// The newest checkpoint created with `trigger`.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read.
    fn latest_with_trigger(&self, trigger: &str) -> CoreResult<Option<CheckpointInfo>> {
        Ok(self.list()?.into_iter().find(|c| c.trigger == trigger))
    }
}

/// Ids to drop so that at most `retention` of `ids` remain, oldest first.
pub(crate) fn ids_to_prune<I>(ids: I, retention: usize) -> Vec<CheckpointId>
where
    I: ExactSizeIterator<Item = CheckpointId>,
{
    let excess = ids.len().saturating_sub(retention);
    ids.take(excess).collect()
}

#[derive(Default)]
struct MemoryLogState {
    next_id: CheckpointId,
    entries: BTreeMap<CheckpointId, Checkpoint>,
}

/// A checkpoint log held in memory.
#[derive(Default)]
pub struct MemoryCheckpointLog {
    state: RwLock<MemoryLogState>,
}

impl MemoryCheckpointLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored checkpoints.
    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    /// Returns true if no checkpoint is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CheckpointLog for MemoryCheckpointLog {
    fn insert_and_prune(
        &self,
        checkpoint: NewCheckpoint,
        retention: usize,
    ) -> CoreResult<(CheckpointId, Vec<CheckpointId>)> {
        let mut state = self.state.write();
        state.next_id += 1;
        let id = state.next_id;

        let info = CheckpointInfo {
            id,
            timestamp: checkpoint.timestamp,
            trigger: checkpoint.trigger,
            size: checkpoint.blob.len(),
        };
        state.entries.insert(
            id,
            Checkpoint {
                info,
                blob: checkpoint.blob,
            },
        );

        let pruned = ids_to_prune(state.entries.keys().copied(), retention.max(1));
        for old in &pruned {
            state.entries.remove(old);
        }
        Ok((id, pruned))
    }

    fn list(&self) -> CoreResult<Vec<CheckpointInfo>> {
        let mut entries: Vec<_> = self
            .state
            .read()
            .entries
            .values()
            .map(|c| c.info.clone())
            .collect();
        newest_first(&mut entries);
        Ok(entries)
    }

    fn get(&self, id: CheckpointId) -> CoreResult<Option<Checkpoint>> {
        Ok(self.state.read().entries.get(&id).cloned())
    }
}

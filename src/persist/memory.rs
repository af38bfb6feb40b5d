//! Volatile log backend for tests and ephemeral sessions.

use std::collections::BTreeMap;

use hashbrown::HashMap;

use crate::{
    core::store::StateCache,
    op::{OpSource, OperationLogEntry},
    types::{OpId, OpSeq, TimestampMs},
};

use super::{LogBackend, NewLogEntry, PersistError, PersistResult};

/// In-memory implementation of [`crate::persist::LogBackend`].
#[derive(Debug, Default)]
pub struct MemoryLogBackend {
    entries: BTreeMap<OpSeq, OperationLogEntry>,
    applied: HashMap<OpId, OpSeq>,
    applied_order: Vec<(OpSeq, OpId)>,
    state_cache: Option<StateCache>,
    last_seq: OpSeq,
}

impl MemoryLogBackend {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }
}

impl LogBackend for MemoryLogBackend {
    fn append_entries(&mut self, entries: &[NewLogEntry]) -> PersistResult<Vec<OpSeq>> {
        // A rejected batch leaves the log untouched.
        let mut batch_ids = hashbrown::HashSet::new();
        for entry in entries {
            if self.applied.contains_key(&entry.op.id) || !batch_ids.insert(entry.op.id.as_str()) {
                return Err(PersistError::DuplicateOp(entry.op.id.clone()));
            }
        }

        let mut seqs = Vec::with_capacity(entries.len());
        for entry in entries {
            self.last_seq += 1;
            let seq = self.last_seq;
            let synced_at = match entry.source {
                OpSource::Remote => Some(entry.applied_at),
                OpSource::Local => None,
            };
            self.entries.insert(
                seq,
                OperationLogEntry {
                    seq,
                    op: entry.op.clone(),
                    applied_at: entry.applied_at,
                    source: entry.source,
                    synced_at,
                },
            );
            self.applied.insert(entry.op.id.clone(), seq);
            self.applied_order.push((seq, entry.op.id.clone()));
            seqs.push(seq);
        }
        Ok(seqs)
    }

    fn entries_after(&self, after: OpSeq) -> PersistResult<Vec<OperationLogEntry>> {
        Ok(self
            .entries
            .range(after.saturating_add(1)..)
            .map(|(_, entry)| entry.clone())
            .collect())
    }

    fn entry_by_op_id(&self, id: &str) -> PersistResult<Option<OperationLogEntry>> {
        Ok(self
            .applied
            .get(id)
            .and_then(|seq| self.entries.get(seq))
            .cloned())
    }

    fn last_seq(&self) -> PersistResult<OpSeq> {
        Ok(self.last_seq)
    }

    fn applied_op_ids_after(&self, after: OpSeq) -> PersistResult<Vec<OpId>> {
        let start = self.applied_order.partition_point(|(seq, _)| *seq <= after);
        Ok(self.applied_order[start..]
            .iter()
            .map(|(_, id)| id.clone())
            .collect())
    }

    fn contains_op_id(&self, id: &str) -> PersistResult<bool> {
        Ok(self.applied.contains_key(id))
    }

    fn load_state_cache(&self) -> PersistResult<Option<StateCache>> {
        Ok(self.state_cache.clone())
    }

    fn save_state_cache(&mut self, cache: &StateCache) -> PersistResult<()> {
        self.state_cache = Some(cache.clone());
        Ok(())
    }

    fn mark_synced(&mut self, seqs: &[OpSeq], synced_at: TimestampMs) -> PersistResult<()> {
        for seq in seqs {
            if let Some(entry) = self.entries.get_mut(seq) {
                entry.synced_at = Some(synced_at);
            }
        }
        Ok(())
    }

    fn compact_synced_through(&mut self, seq: OpSeq) -> PersistResult<usize> {
        let before = self.entries.len();
        self.entries
            .retain(|entry_seq, entry| *entry_seq > seq || entry.synced_at.is_none());
        Ok(before - self.entries.len())
    }
}

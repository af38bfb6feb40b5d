use std::sync::Arc;

use hashbrown::HashSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{
    core::{
        indices::AppliedOpIndex,
        vector_clock::{VectorClock, merge_all},
    },
    op::{OpSource, Operation, OperationLogEntry},
    persist::{LogBackend, NewLogEntry, PersistError, PersistResult},
    types::{OpId, OpSeq, TimestampMs, now_ms},
};

/// Compacted state plus the log position it corresponds to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateCache {
    /// Materialized application state.
    pub state: Value,
    /// Seq of the last operation folded into `state`.
    pub last_applied_op_seq: OpSeq,
    /// Causal frontier represented by `state`.
    pub vector_clock: VectorClock,
    /// When the cache was written.
    pub compacted_at: TimestampMs,
    /// Schema revision of `state`, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<u32>,
}

struct Inner {
    backend: Box<dyn LogBackend>,
    applied: AppliedOpIndex,
}

impl Inner {
    fn ensure_applied_loaded(&mut self) -> PersistResult<()> {
        let last_seq = self.backend.last_seq()?;
        if self.applied.is_loaded() && self.applied.through_seq() >= last_seq {
            return Ok(());
        }
        let after = if self.applied.is_loaded() {
            self.applied.through_seq()
        } else {
            0
        };
        let ids = self.backend.applied_op_ids_after(after)?;
        self.applied.extend(ids, last_seq);
        Ok(())
    }
}

/// Sole reader and writer of the durable operation log and its state cache.
///
/// Backend calls run on the blocking pool under one lock, so sequence
/// assignment and the durable write form a single unit and readers never
/// observe a partially written entry. Backend errors are returned unchanged.
#[derive(Clone)]
pub struct OpLogStore {
    inner: Arc<Mutex<Inner>>,
}

impl OpLogStore {
    /// Wraps a backend.
    pub fn new(backend: Box<dyn LogBackend>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                backend,
                applied: AppliedOpIndex::default(),
            })),
        }
    }

    /// Convenience constructor over [`crate::persist::memory::MemoryLogBackend`].
    pub fn in_memory() -> Self {
        Self::new(Box::new(crate::persist::memory::MemoryLogBackend::new()))
    }

    async fn with_inner<T, F>(&self, f: F) -> PersistResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Inner) -> PersistResult<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let mut guard = inner.blocking_lock();
            f(&mut guard)
        })
        .await
        .map_err(|e| PersistError::Message(format!("join error: {e}")))?
    }

    /// Appends one operation and returns its sequence number.
    pub async fn append(&self, op: Operation, source: OpSource) -> PersistResult<OpSeq> {
        let mut seqs = self.append_batch(vec![op], source).await?;
        seqs.pop()
            .ok_or_else(|| PersistError::Message("append returned no sequence".to_string()))
    }

    /// Appends several operations in one atomic write.
    pub async fn append_batch(
        &self,
        ops: Vec<Operation>,
        source: OpSource,
    ) -> PersistResult<Vec<OpSeq>> {
        if ops.is_empty() {
            return Ok(Vec::new());
        }

        let applied_at = now_ms();
        let entries: Vec<NewLogEntry> = ops
            .into_iter()
            .map(|op| NewLogEntry {
                op,
                source,
                applied_at,
            })
            .collect();

        self.with_inner(move |inner| {
            let seqs = inner.backend.append_entries(&entries)?;
            for (entry, seq) in entries.iter().zip(&seqs) {
                inner.applied.record(&entry.op.id, *seq);
            }
            debug!(
                count = seqs.len(),
                last_seq = seqs.last().copied().unwrap_or(0),
                source = source.as_str(),
                "appended operations"
            );
            Ok(seqs)
        })
        .await
    }

    /// All entries with `seq > seq`, ascending. `0` returns the whole log.
    pub async fn get_ops_after_seq(&self, seq: OpSeq) -> PersistResult<Vec<OperationLogEntry>> {
        self.with_inner(move |inner| inner.backend.entries_after(seq))
            .await
    }

    /// Highest assigned sequence, `0` for an empty log.
    pub async fn get_last_seq(&self) -> PersistResult<OpSeq> {
        self.with_inner(|inner| inner.backend.last_seq()).await
    }

    /// Reads the single-slot state cache.
    pub async fn load_state_cache(&self) -> PersistResult<Option<StateCache>> {
        self.with_inner(|inner| inner.backend.load_state_cache())
            .await
    }

    /// Overwrites the single-slot state cache.
    ///
    /// Rejects a cache whose `last_applied_op_seq` lies beyond the log.
    pub async fn save_state_cache(&self, cache: StateCache) -> PersistResult<()> {
        self.with_inner(move |inner| {
            let last_seq = inner.backend.last_seq()?;
            if cache.last_applied_op_seq > last_seq {
                return Err(PersistError::InvalidStateCache {
                    last_applied_op_seq: cache.last_applied_op_seq,
                    last_seq,
                });
            }
            inner.backend.save_state_cache(&cache)
        })
        .await
    }

    /// Every operation id ever appended.
    pub async fn get_applied_op_ids(&self) -> PersistResult<HashSet<OpId>> {
        self.with_inner(|inner| {
            inner.ensure_applied_loaded()?;
            Ok(inner.applied.to_set())
        })
        .await
    }

    /// Clock of the state cache merged with every operation appended after it.
    pub async fn get_current_vector_clock(&self) -> PersistResult<VectorClock> {
        self.with_inner(|inner| {
            let cache = inner.backend.load_state_cache()?;
            let after = cache.as_ref().map_or(0, |cache| cache.last_applied_op_seq);
            let base = cache.map(|cache| cache.vector_clock).unwrap_or_default();
            let tail = inner.backend.entries_after(after)?;
            Ok(merge_all(
                std::iter::once(&base).chain(tail.iter().map(|entry| &entry.op.vector_clock)),
            ))
        })
        .await
    }

    /// True if `id` was ever appended.
    pub async fn has_op(&self, id: &str) -> PersistResult<bool> {
        let id = id.to_string();
        self.with_inner(move |inner| inner.backend.contains_op_id(&id))
            .await
    }

    /// Looks up a stored entry by operation id.
    pub async fn get_op_by_id(&self, id: &str) -> PersistResult<Option<OperationLogEntry>> {
        let id = id.to_string();
        self.with_inner(move |inner| inner.backend.entry_by_op_id(&id))
            .await
    }

    /// Drops operations whose id is already in the log.
    pub async fn filter_new_ops(&self, ops: Vec<Operation>) -> PersistResult<Vec<Operation>> {
        if ops.is_empty() {
            return Ok(ops);
        }
        self.with_inner(move |inner| {
            inner.ensure_applied_loaded()?;
            Ok(ops
                .into_iter()
                .filter(|op| !inner.applied.contains(&op.id))
                .collect())
        })
        .await
    }

    /// Local entries not yet acknowledged by the remote, ascending.
    pub async fn get_unsynced(&self) -> PersistResult<Vec<OperationLogEntry>> {
        self.with_inner(|inner| {
            Ok(inner
                .backend
                .entries_after(0)?
                .into_iter()
                .filter(|entry| entry.source == OpSource::Local && entry.synced_at.is_none())
                .collect())
        })
        .await
    }

    /// Marks entries as acknowledged by the remote.
    pub async fn mark_synced(&self, seqs: Vec<OpSeq>) -> PersistResult<()> {
        let synced_at = now_ms();
        self.with_inner(move |inner| inner.backend.mark_synced(&seqs, synced_at))
            .await
    }

    /// Deletes synced entries already folded into the state cache.
    ///
    /// Unsynced local entries are kept so they can still be uploaded. The
    /// applied-id set and the last sequence are unaffected.
    pub async fn compact_through_state_cache(&self) -> PersistResult<usize> {
        self.with_inner(|inner| {
            let Some(cache) = inner.backend.load_state_cache()? else {
                return Ok(0);
            };
            let removed = inner
                .backend
                .compact_synced_through(cache.last_applied_op_seq)?;
            inner.backend.flush()?;
            debug!(
                removed,
                through_seq = cache.last_applied_op_seq,
                "compacted operation log"
            );
            Ok(removed)
        })
        .await
    }
}

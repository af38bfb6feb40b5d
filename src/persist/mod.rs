//! Persistence contract and its SQLite and in-memory implementations.

/// In-memory backend.
pub mod memory;
/// SQLite-backed backend.
pub mod sqlite;

use thiserror::Error;

use crate::{
    core::store::StateCache,
    op::{OpSource, Operation, OperationLogEntry},
    types::{OpId, OpSeq, TimestampMs},
};

/// Errors raised by a [`LogBackend`]. The store hands them to callers untouched.
#[derive(Debug, Error)]
pub enum PersistError {
    /// Underlying SQLite failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Payload (de)serialization failure.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    /// An operation with the same id is already in the log.
    #[error("operation {0} is already in the log")]
    DuplicateOp(OpId),
    /// A state cache pointing past the end of the log.
    #[error("state cache references seq {last_applied_op_seq} but the log ends at {last_seq}")]
    InvalidStateCache {
        /// Seq the cache claims to cover.
        last_applied_op_seq: OpSeq,
        /// Highest seq actually assigned.
        last_seq: OpSeq,
    },
    /// Stored payload written by an unknown format version.
    #[error("unsupported stored format version {0}")]
    UnsupportedFormat(u16),
    /// Anything else, e.g. a blocking task that failed to join.
    #[error("{0}")]
    Message(String),
}

/// Result alias for persistence calls.
pub type PersistResult<T> = Result<T, PersistError>;

/// An operation waiting for a sequence number.
#[derive(Debug, Clone)]
pub struct NewLogEntry {
    /// Operation to store.
    pub op: Operation,
    /// Origin of the operation.
    pub source: OpSource,
    /// Append time.
    pub applied_at: TimestampMs,
}

/// Durable key-value contract behind the operation log store.
///
/// Implementations are synchronous; the store runs them on the blocking pool
/// behind a single lock, so one call is one critical section.
pub trait LogBackend: Send {
    /// Appends all entries atomically and returns their assigned sequences in order.
    ///
    /// Sequences continue from [`LogBackend::last_seq`] and are never reused,
    /// even after compaction. Every op id is recorded in the applied-id set.
    fn append_entries(&mut self, entries: &[NewLogEntry]) -> PersistResult<Vec<OpSeq>>;

    /// Entries with `seq > after`, ascending.
    fn entries_after(&self, after: OpSeq) -> PersistResult<Vec<OperationLogEntry>>;

    /// Entry holding the operation `id`, if it has not been compacted away.
    fn entry_by_op_id(&self, id: &str) -> PersistResult<Option<OperationLogEntry>>;

    /// Highest sequence ever assigned, `0` for a fresh log.
    fn last_seq(&self) -> PersistResult<OpSeq>;

    /// Ids recorded by appends whose seq is `> after`, in append order.
    fn applied_op_ids_after(&self, after: OpSeq) -> PersistResult<Vec<OpId>>;

    /// True if `id` was ever appended.
    fn contains_op_id(&self, id: &str) -> PersistResult<bool>;

    /// Single-slot snapshot read.
    fn load_state_cache(&self) -> PersistResult<Option<StateCache>>;

    /// Single-slot snapshot overwrite.
    fn save_state_cache(&mut self, cache: &StateCache) -> PersistResult<()>;

    /// Stamps `synced_at` on the given entries.
    fn mark_synced(&mut self, seqs: &[OpSeq], synced_at: TimestampMs) -> PersistResult<()>;

    /// Deletes synced entries with `seq <= seq`. Returns the number removed.
    fn compact_synced_through(&mut self, seq: OpSeq) -> PersistResult<usize>;

    /// Pushes buffered writes to stable storage.
    fn flush(&mut self) -> PersistResult<()> {
        Ok(())
    }
}

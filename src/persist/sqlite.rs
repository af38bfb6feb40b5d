//! SQLite-backed append-only operation log.

use std::path::Path;

use rusqlite::{Connection, OptionalExtension, Params, Row, Transaction, params};
use serde::{Deserialize, Serialize};

use crate::{
    core::store::StateCache,
    op::{OP_FORMAT_VERSION, OpSource, OpType, OperationLogEntry, StoredOpEnvelope},
    types::{OpId, OpSeq, TimestampMs},
};

use super::{LogBackend, NewLogEntry, PersistError, PersistResult};

const SNAPSHOT_FORMAT_VERSION: u16 = 1;
const LAST_SEQ_KEY: &str = "last_seq";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotEnvelope {
    format_version: u16,
    cache: StateCache,
}

/// SQLite implementation of [`crate::persist::LogBackend`].
pub struct SqliteLogBackend {
    conn: Connection,
}

impl SqliteLogBackend {
    /// Opens or creates a log database at `path`.
    ///
    /// Enables WAL mode and sets `synchronous=NORMAL`.
    pub fn open(path: impl AsRef<Path>) -> PersistResult<Self> {
        let conn = Connection::open(path)?;
        Self::init_connection(conn)
    }

    /// Opens an in-memory SQLite log.
    pub fn open_in_memory() -> PersistResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_connection(conn)
    }

    fn init_connection(conn: Connection) -> PersistResult<Self> {
        conn.execute_batch(include_str!("schema.sql"))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(Self { conn })
    }

    fn read_last_seq(conn: &Connection) -> PersistResult<OpSeq> {
        let seq: Option<i64> = conn
            .query_row(
                "SELECT value FROM log_meta WHERE key = ?1",
                params![LAST_SEQ_KEY],
                |row| row.get(0),
            )
            .optional()?;
        Ok(seq.unwrap_or(0) as OpSeq)
    }

    fn insert_entry(tx: &Transaction<'_>, seq: OpSeq, entry: &NewLogEntry) -> PersistResult<()> {
        let op = &entry.op;
        let known: Option<i64> = tx
            .query_row(
                "SELECT seq FROM applied_op_ids WHERE op_id = ?1",
                params![op.id],
                |row| row.get(0),
            )
            .optional()?;
        if known.is_some() {
            return Err(PersistError::DuplicateOp(op.id.clone()));
        }

        let payload = serde_json::to_vec(&StoredOpEnvelope::new(op.clone()))?;
        let synced_at = match entry.source {
            OpSource::Remote => Some(entry.applied_at as i64),
            OpSource::Local => None,
        };
        tx.execute(
            "INSERT INTO ops(seq, op_id, op_type, entity_type, entity_id, source, applied_at, synced_at, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                seq as i64,
                op.id,
                op_type_code(op.op_type),
                op.entity_type,
                op.entity_id,
                entry.source.as_str(),
                entry.applied_at as i64,
                synced_at,
                payload,
            ],
        )?;
        tx.execute(
            "INSERT INTO applied_op_ids(op_id, seq) VALUES (?1, ?2)",
            params![op.id, seq as i64],
        )?;
        Ok(())
    }

    fn query_entries<P: Params>(&self, sql: &str, params: P) -> PersistResult<Vec<OperationLogEntry>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, decode_row)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

impl LogBackend for SqliteLogBackend {
    fn append_entries(&mut self, entries: &[NewLogEntry]) -> PersistResult<Vec<OpSeq>> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let tx = self.conn.transaction()?;
        let mut seq = Self::read_last_seq(&tx)?;
        let mut seqs = Vec::with_capacity(entries.len());
        for entry in entries {
            seq += 1;
            Self::insert_entry(&tx, seq, entry)?;
            seqs.push(seq);
        }
        tx.execute(
            "INSERT INTO log_meta(key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![LAST_SEQ_KEY, seq as i64],
        )?;
        tx.commit()?;

        Ok(seqs)
    }

    fn entries_after(&self, after: OpSeq) -> PersistResult<Vec<OperationLogEntry>> {
        self.query_entries(
            "SELECT seq, source, applied_at, synced_at, payload FROM ops WHERE seq > ?1 ORDER BY seq ASC",
            params![after as i64],
        )
    }

    fn entry_by_op_id(&self, id: &str) -> PersistResult<Option<OperationLogEntry>> {
        let found = self.query_entries(
            "SELECT seq, source, applied_at, synced_at, payload FROM ops WHERE op_id = ?1",
            params![id],
        )?;
        Ok(found.into_iter().next())
    }

    fn last_seq(&self) -> PersistResult<OpSeq> {
        Self::read_last_seq(&self.conn)
    }

    fn applied_op_ids_after(&self, after: OpSeq) -> PersistResult<Vec<OpId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT op_id FROM applied_op_ids WHERE seq > ?1 ORDER BY seq ASC")?;
        let rows = stmt.query_map(params![after as i64], |row| row.get::<_, String>(0))?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn contains_op_id(&self, id: &str) -> PersistResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT seq FROM applied_op_ids WHERE op_id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn load_state_cache(&self) -> PersistResult<Option<StateCache>> {
        let payload: Option<Vec<u8>> = self
            .conn
            .query_row("SELECT payload FROM state_cache WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;

        let Some(payload) = payload else {
            return Ok(None);
        };

        let env: SnapshotEnvelope = serde_json::from_slice(&payload)?;
        if env.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(PersistError::UnsupportedFormat(env.format_version));
        }
        Ok(Some(env.cache))
    }

    fn save_state_cache(&mut self, cache: &StateCache) -> PersistResult<()> {
        let env = SnapshotEnvelope {
            format_version: SNAPSHOT_FORMAT_VERSION,
            cache: cache.clone(),
        };
        let payload = serde_json::to_vec(&env)?;
        self.conn.execute(
            "INSERT INTO state_cache(id, last_applied_op_seq, compacted_at, payload) VALUES (1, ?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET
                last_applied_op_seq = excluded.last_applied_op_seq,
                compacted_at = excluded.compacted_at,
                payload = excluded.payload",
            params![
                cache.last_applied_op_seq as i64,
                cache.compacted_at as i64,
                payload
            ],
        )?;
        Ok(())
    }

    fn mark_synced(&mut self, seqs: &[OpSeq], synced_at: TimestampMs) -> PersistResult<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare("UPDATE ops SET synced_at = ?1 WHERE seq = ?2")?;
            for seq in seqs {
                stmt.execute(params![synced_at as i64, *seq as i64])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn compact_synced_through(&mut self, seq: OpSeq) -> PersistResult<usize> {
        let count = self.conn.execute(
            "DELETE FROM ops WHERE seq <= ?1 AND synced_at IS NOT NULL",
            params![seq as i64],
        )?;
        Ok(count)
    }

    fn flush(&mut self) -> PersistResult<()> {
        self.conn.execute_batch("PRAGMA wal_checkpoint(PASSIVE);")?;
        Ok(())
    }
}

fn op_type_code(op_type: OpType) -> &'static str {
    match op_type {
        OpType::Create => "CRT",
        OpType::Update => "UPD",
        OpType::Delete => "DEL",
        OpType::Batch => "BATCH",
        OpType::SyncImport => "SYNC_IMPORT",
        OpType::MigrationGenesis => "MIG",
    }
}

fn decode_row(row: &Row<'_>) -> rusqlite::Result<OperationLogEntry> {
    let seq: i64 = row.get(0)?;
    let source: String = row.get(1)?;
    let applied_at: i64 = row.get(2)?;
    let synced_at: Option<i64> = row.get(3)?;
    let payload: Vec<u8> = row.get(4)?;
    let envelope = decode_envelope(&payload).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(
            payload.len(),
            rusqlite::types::Type::Blob,
            Box::new(std::io::Error::other(err)),
        )
    })?;

    Ok(OperationLogEntry {
        seq: seq as OpSeq,
        op: envelope.op,
        applied_at: applied_at as TimestampMs,
        source: OpSource::from_code(&source),
        synced_at: synced_at.map(|v| v as TimestampMs),
    })
}

fn decode_envelope(payload: &[u8]) -> Result<StoredOpEnvelope, String> {
    let envelope = serde_json::from_slice::<StoredOpEnvelope>(payload)
        .map_err(|e| format!("op payload decode failed: {e}"))?;
    if envelope.format_version != OP_FORMAT_VERSION {
        return Err(format!(
            "unsupported op format version: {}",
            envelope.format_version
        ));
    }
    Ok(envelope)
}

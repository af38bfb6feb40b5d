//! Operation model and persistence wrappers.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    core::vector_clock::VectorClock,
    types::{ClientId, EntityId, OpId, OpSeq, TimestampMs},
};

/// Version number for serialized [`StoredOpEnvelope`] payloads.
pub const OP_FORMAT_VERSION: u16 = 1;

/// Kind of mutation an [`Operation`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpType {
    /// A new entity.
    #[serde(rename = "CRT")]
    Create,
    /// Partial update of an existing entity.
    #[serde(rename = "UPD")]
    Update,
    /// Removal of an entity.
    #[serde(rename = "DEL")]
    Delete,
    /// Several changes applied together.
    #[serde(rename = "BATCH")]
    Batch,
    /// Full-state import received from a remote.
    #[serde(rename = "SYNC_IMPORT")]
    SyncImport,
    /// Full-state genesis created from legacy data.
    #[serde(rename = "MIG")]
    MigrationGenesis,
}

/// Immutable record of one state mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    /// Time-sortable unique id.
    pub id: OpId,
    /// Semantic label used to rebuild the application action.
    pub action_type: String,
    /// Mutation kind.
    pub op_type: OpType,
    /// Addressed entity type (`ALL`/`MIGRATION` for whole-state ops).
    pub entity_type: String,
    /// Addressed entity, `*` for whole-state ops.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<EntityId>,
    /// Opaque mutation data.
    pub payload: Value,
    /// Originating device.
    pub client_id: ClientId,
    /// Causal stamp at creation time.
    pub vector_clock: VectorClock,
    /// Advisory wall-clock creation time.
    pub timestamp: TimestampMs,
    /// Payload schema revision.
    pub schema_version: u32,
}

impl Operation {
    /// True for operations whose payload replaces the entire application state.
    pub fn is_full_state(&self) -> bool {
        match self.op_type {
            OpType::SyncImport | OpType::MigrationGenesis => true,
            OpType::Batch => self.entity_type == crate::types::MIGRATION_ENTITY_TYPE,
            OpType::Create | OpType::Update | OpType::Delete => false,
        }
    }
}

/// Generates a new UUIDv7 operation id. Later calls sort after earlier ones.
pub fn new_op_id() -> OpId {
    Uuid::now_v7().to_string()
}

/// Where an appended operation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpSource {
    /// Created on this device.
    Local,
    /// Imported from the remote store.
    Remote,
}

impl OpSource {
    /// Stable storage code.
    pub fn as_str(self) -> &'static str {
        match self {
            OpSource::Local => "local",
            OpSource::Remote => "remote",
        }
    }

    /// Inverse of [`OpSource::as_str`]; unknown codes read as local.
    pub fn from_code(code: &str) -> Self {
        match code {
            "remote" => OpSource::Remote,
            _ => OpSource::Local,
        }
    }
}

/// Log row metadata plus the operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationLogEntry {
    /// Local sequence number.
    pub seq: OpSeq,
    /// Stored operation.
    pub op: Operation,
    /// When the entry was appended.
    pub applied_at: TimestampMs,
    /// Origin of the entry.
    pub source: OpSource,
    /// When the entry was acknowledged by the remote, if ever.
    pub synced_at: Option<TimestampMs>,
}

/// Versioned wrapper for stable on-disk payload decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredOpEnvelope {
    /// Payload format version.
    pub format_version: u16,
    /// Wrapped operation.
    pub op: Operation,
}

impl StoredOpEnvelope {
    /// Constructs an envelope using [`OP_FORMAT_VERSION`].
    pub fn new(op: Operation) -> Self {
        Self {
            format_version: OP_FORMAT_VERSION,
            op,
        }
    }
}

//! Shared primitive IDs and addressing constants.

use std::time::{SystemTime, UNIX_EPOCH};

/// Monotonic local log sequence number. `0` means "before the first entry".
pub type OpSeq = u64;
/// Sequence number assigned by the remote store.
pub type ServerSeq = u64;
/// Globally unique, time-sortable operation identifier (UUIDv7 text).
pub type OpId = String;
/// Device identifier used as a vector clock key.
pub type ClientId = String;
/// Entity identifier inside an entity type.
pub type EntityId = String;
/// Milliseconds since the Unix epoch.
pub type TimestampMs = u64;

/// Entity type of the genesis operation written by the migration.
pub const MIGRATION_ENTITY_TYPE: &str = "MIGRATION";
/// Entity type of whole-state operations such as sync imports.
pub const ALL_ENTITY_TYPE: &str = "ALL";
/// Entity id used by operations that address the whole state.
pub const WHOLE_STATE_ENTITY_ID: &str = "*";

/// Wall-clock milliseconds since the Unix epoch, `0` if the clock is before it.
pub fn now_ms() -> TimestampMs {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

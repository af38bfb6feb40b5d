//! Local-first operation-log sync: an append-only, causally stamped log with
//! snapshot compaction, legacy migration, startup hydration and a
//! deduplicating remote download protocol.
//!
//! # Examples
//!
//! Appending and reading back with [`core::store::OpLogStore`]:
//! ```
//! use opsync::{
//!     core::{store::OpLogStore, vector_clock::VectorClock},
//!     op::{new_op_id, OpSource, OpType, Operation},
//! };
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let store = OpLogStore::in_memory();
//! let op = Operation {
//!     id: new_op_id(),
//!     action_type: "[Task] Add".to_string(),
//!     op_type: OpType::Create,
//!     entity_type: "TASK".to_string(),
//!     entity_id: Some("t1".to_string()),
//!     payload: json!({ "title": "write docs" }),
//!     client_id: "device-a".to_string(),
//!     vector_clock: VectorClock::single("device-a", 1),
//!     timestamp: 0,
//!     schema_version: 1,
//! };
//! let seq = store.append(op, OpSource::Local).await.expect("append");
//! assert_eq!(seq, 1);
//! assert_eq!(store.get_last_seq().await.expect("last seq"), 1);
//! # }
//! ```
//!
//! Opening a SQLite-backed store:
//! ```no_run
//! use opsync::{core::store::OpLogStore, persist::sqlite::SqliteLogBackend};
//!
//! let backend = SqliteLogBackend::open("oplog.db").expect("open sqlite");
//! let store = OpLogStore::new(Box::new(backend));
//! # let _ = store;
//! ```
#![deny(missing_docs)]

/// Tunable policy for the sync services.
pub mod config;
/// Vector clocks, the applied-id index and the operation log store.
pub mod core;
/// Application-facing contracts and the operation converter.
pub mod engine;
/// Operation model and log entry types.
pub mod op;
/// Persistence abstraction with SQLite and in-memory backends.
pub mod persist;
/// Migration, hydration and time-sync services.
pub mod runtime;
/// Remote download protocol.
pub mod sync;
/// Shared primitive types and constants.
pub mod types;

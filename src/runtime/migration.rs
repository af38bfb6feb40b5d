use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::info;

use crate::{
    core::{store::OpLogStore, store::StateCache, vector_clock::VectorClock},
    engine::traits::{ClientIdProvider, CollaboratorError, LegacyDataLoader},
    op::{OpSource, OpType, Operation, new_op_id},
    persist::PersistError,
    types::{MIGRATION_ENTITY_TYPE, OpSeq, WHOLE_STATE_ENTITY_ID, now_ms},
};

/// Action label of the genesis operation.
pub const GENESIS_ACTION_TYPE: &str = "[Migration] Genesis Import";

/// Legacy models that hold user data. Anything else is configuration.
pub const USER_ENTITY_MODELS: &[&str] = &[
    "task",
    "project",
    "tag",
    "note",
    "taskRepeatCfg",
    "simpleCounter",
    "metric",
];

/// Failure that aborts a migration. The log is left at `last_seq == 0` when
/// the append did not happen, so the next start retries.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Reading the legacy snapshot failed.
    #[error("legacy data load failed: {0}")]
    Legacy(CollaboratorError),
    /// The client id could not be loaded.
    #[error("client id unavailable: {0}")]
    ClientId(CollaboratorError),
    /// The store rejected a write.
    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// What [`MigrationService::check_and_migrate`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The log already had entries; nothing was read or written.
    AlreadyMigrated,
    /// The legacy snapshot held no user entities; nothing was written.
    NoLegacyData,
    /// A genesis operation was appended and a state cache saved.
    Migrated {
        /// Sequence of the genesis operation.
        genesis_seq: OpSeq,
    },
}

/// One-time import of the pre-log full snapshot into the operation log.
pub struct MigrationService {
    store: OpLogStore,
    legacy: Arc<dyn LegacyDataLoader>,
    client_id: Arc<dyn ClientIdProvider>,
    schema_version: u32,
}

impl MigrationService {
    /// Creates the service.
    pub fn new(
        store: OpLogStore,
        legacy: Arc<dyn LegacyDataLoader>,
        client_id: Arc<dyn ClientIdProvider>,
        schema_version: u32,
    ) -> Self {
        Self {
            store,
            legacy,
            client_id,
            schema_version,
        }
    }

    /// Migrates legacy data if the log is still empty. Safe to re-run.
    pub async fn check_and_migrate(&self) -> Result<MigrationOutcome, MigrationError> {
        let last_seq = self.store.get_last_seq().await?;
        if last_seq > 0 {
            info!(last_seq, "operation log in use; skipping migration");
            return Ok(MigrationOutcome::AlreadyMigrated);
        }

        let legacy_state = self
            .legacy
            .get_all_sync_model_data(true)
            .await
            .map_err(MigrationError::Legacy)?;
        if !has_user_entities(&legacy_state) {
            info!("no legacy user data; nothing to migrate");
            return Ok(MigrationOutcome::NoLegacyData);
        }

        let client_id = self
            .client_id
            .load_client_id()
            .await
            .map_err(MigrationError::ClientId)?;
        let vector_clock = VectorClock::single(client_id.clone(), 1);
        let genesis = Operation {
            id: new_op_id(),
            action_type: GENESIS_ACTION_TYPE.to_string(),
            op_type: OpType::Batch,
            entity_type: MIGRATION_ENTITY_TYPE.to_string(),
            entity_id: Some(WHOLE_STATE_ENTITY_ID.to_string()),
            payload: legacy_state.clone(),
            client_id,
            vector_clock: vector_clock.clone(),
            timestamp: now_ms(),
            schema_version: self.schema_version,
        };

        let genesis_seq = self.store.append(genesis, OpSource::Local).await?;
        self.store
            .save_state_cache(StateCache {
                state: legacy_state,
                last_applied_op_seq: genesis_seq,
                vector_clock,
                compacted_at: now_ms(),
                schema_version: Some(self.schema_version),
            })
            .await?;

        info!(genesis_seq, "migrated legacy data into operation log");
        Ok(MigrationOutcome::Migrated { genesis_seq })
    }
}

/// True if any user-entity model in `state` holds at least one entity.
///
/// Entity-state models count through a non-empty `ids` array; list models
/// count when the list itself is non-empty.
pub fn has_user_entities(state: &Value) -> bool {
    USER_ENTITY_MODELS
        .iter()
        .filter_map(|model| state.get(*model))
        .any(|model| match model {
            Value::Array(items) => !items.is_empty(),
            Value::Object(_) => model
                .get("ids")
                .and_then(Value::as_array)
                .is_some_and(|ids| !ids.is_empty()),
            _ => false,
        })
}

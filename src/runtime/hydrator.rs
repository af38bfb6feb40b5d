use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    config::HydrationConfig,
    core::{
        store::{OpLogStore, StateCache},
        vector_clock::{VectorClock, merge_all},
    },
    engine::{
        converter::{AppAction, operation_to_action},
        traits::{ClientIdProvider, CollaboratorError, DispatchError, ModelCacheReader, StateDispatcher},
    },
    op::{OpSource, OpType, Operation, OperationLogEntry, new_op_id},
    persist::PersistError,
    types::{ALL_ENTITY_TYPE, OpSeq, WHOLE_STATE_ENTITY_ID, now_ms},
};

use super::migration::{MigrationError, MigrationOutcome, MigrationService};

/// Action label of the import written after a remote sync.
pub const SYNC_IMPORT_ACTION_TYPE: &str = "[SP_ALL] Load(import) all data";

/// Hydration failure. Callers should halt startup rather than run on
/// partially rebuilt state.
#[derive(Debug, Error)]
pub enum HydrateError {
    /// Migration failed while no state cache existed.
    #[error(transparent)]
    Migration(#[from] MigrationError),
    /// The store failed.
    #[error(transparent)]
    Persist(#[from] PersistError),
    /// The model caches could not be read.
    #[error("model cache read failed: {0}")]
    ModelCache(CollaboratorError),
    /// The client id could not be loaded.
    #[error("client id unavailable: {0}")]
    ClientId(CollaboratorError),
    /// The application rejected an action.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// How startup state was rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HydrationPath {
    /// State cache loaded, then the tail replayed.
    Snapshot,
    /// The last log entry carries a full state; only that was loaded.
    FullStateShortcut,
    /// No state cache; the whole log replayed.
    FullReplay,
}

/// Summary of one [`Hydrator::hydrate_store`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HydrationReport {
    /// Path taken.
    pub path: HydrationPath,
    /// Migration result, if a migration was attempted.
    pub migration: Option<MigrationOutcome>,
    /// `last_applied_op_seq` of the cache used, `0` without one.
    pub base_seq: OpSeq,
    /// Operations dispatched one by one after the base state.
    pub replayed: usize,
    /// A fresh state cache was written after the replay.
    pub snapshot_saved: bool,
}

/// Rebuilds in-memory application state from the store.
pub struct Hydrator {
    store: OpLogStore,
    migration: MigrationService,
    model_cache: Arc<dyn ModelCacheReader>,
    client_id: Arc<dyn ClientIdProvider>,
    dispatcher: Arc<dyn StateDispatcher>,
    schema_version: u32,
    snapshot_after_replay_ops: usize,
}

impl Hydrator {
    /// Creates a hydrator.
    pub fn new(
        store: OpLogStore,
        migration: MigrationService,
        model_cache: Arc<dyn ModelCacheReader>,
        client_id: Arc<dyn ClientIdProvider>,
        dispatcher: Arc<dyn StateDispatcher>,
        config: &HydrationConfig,
    ) -> Self {
        Self {
            store,
            migration,
            model_cache,
            client_id,
            dispatcher,
            schema_version: config.schema_version,
            snapshot_after_replay_ops: config.snapshot_after_replay_ops,
        }
    }

    /// Startup path: state cache plus tail, migrating first when no cache exists.
    ///
    /// A replay longer than the configured threshold, or any non-empty full
    /// replay, is followed by a best-effort state cache save.
    pub async fn hydrate_store(&self) -> Result<HydrationReport, HydrateError> {
        let mut migration = None;
        let mut cache = self.store.load_state_cache().await?;
        if cache.is_none() {
            migration = Some(self.migration.check_and_migrate().await?);
            cache = self.store.load_state_cache().await?;
        }

        let base_seq = cache.as_ref().map_or(0, |c| c.last_applied_op_seq);
        let tail = self.store.get_ops_after_seq(base_seq).await?;
        debug!(base_seq, tail = tail.len(), "loaded operation tail");

        if let Some(last) = tail.last().filter(|entry| entry.op.is_full_state()) {
            info!(seq = last.seq, "hydrating from trailing full-state operation");
            self.dispatch(AppAction::LoadAllData {
                state: last.op.payload.clone(),
            })?;
            return Ok(HydrationReport {
                path: HydrationPath::FullStateShortcut,
                migration,
                base_seq,
                replayed: 0,
                snapshot_saved: false,
            });
        }

        let (path, base_clock) = match cache {
            Some(cache) => {
                self.dispatch(AppAction::LoadAllData { state: cache.state })?;
                (HydrationPath::Snapshot, cache.vector_clock)
            }
            None => (HydrationPath::FullReplay, VectorClock::new()),
        };
        let replayed = self.replay(&tail)?;

        let snapshot_due = match path {
            HydrationPath::FullReplay => replayed > 0,
            _ => replayed > self.snapshot_after_replay_ops,
        };
        let snapshot_saved =
            snapshot_due && self.save_snapshot_after_replay(&base_clock, &tail).await;

        info!(?path, base_seq, replayed, snapshot_saved, "hydration complete");
        Ok(HydrationReport {
            path,
            migration,
            base_seq,
            replayed,
            snapshot_saved,
        })
    }

    async fn save_snapshot_after_replay(
        &self,
        base_clock: &VectorClock,
        tail: &[OperationLogEntry],
    ) -> bool {
        let Some(last_seq) = tail.last().map(|entry| entry.seq) else {
            return false;
        };
        let state = match self.model_cache.get_all_sync_model_data_from_model_ctrls().await {
            Ok(state) => state,
            Err(e) => {
                warn!(error = %e, "could not read state for post-replay snapshot");
                return false;
            }
        };
        let vector_clock = merge_all(
            std::iter::once(base_clock).chain(tail.iter().map(|entry| &entry.op.vector_clock)),
        );
        let cache = StateCache {
            state,
            last_applied_op_seq: last_seq,
            vector_clock,
            compacted_at: now_ms(),
            schema_version: Some(self.schema_version),
        };
        match self.store.save_state_cache(cache).await {
            Ok(()) => {
                debug!(last_seq, "saved state cache after replay");
                true
            }
            Err(e) => {
                warn!(error = %e, "failed to save state cache after replay");
                false
            }
        }
    }

    /// Post-sync path: imports the merged model data as a new compaction point.
    ///
    /// Returns the sequence of the appended import operation.
    pub async fn hydrate_from_remote_sync(&self) -> Result<OpSeq, HydrateError> {
        let merged = self
            .model_cache
            .get_all_sync_model_data_from_model_ctrls()
            .await
            .map_err(HydrateError::ModelCache)?;
        let client_id = self
            .client_id
            .load_client_id()
            .await
            .map_err(HydrateError::ClientId)?;

        let current = self.store.get_current_vector_clock().await?;
        let vector_clock = current.incremented(&client_id);

        let import = Operation {
            id: new_op_id(),
            action_type: SYNC_IMPORT_ACTION_TYPE.to_string(),
            op_type: OpType::SyncImport,
            entity_type: ALL_ENTITY_TYPE.to_string(),
            entity_id: Some(WHOLE_STATE_ENTITY_ID.to_string()),
            payload: merged.clone(),
            client_id,
            vector_clock: vector_clock.clone(),
            timestamp: now_ms(),
            schema_version: self.schema_version,
        };
        // The cache must point at the seq this append returned, not a prior read.
        let seq = self.store.append(import, OpSource::Remote).await?;

        self.store
            .save_state_cache(StateCache {
                state: merged.clone(),
                last_applied_op_seq: seq,
                vector_clock,
                compacted_at: now_ms(),
                schema_version: Some(self.schema_version),
            })
            .await?;

        self.dispatch(AppAction::LoadAllData { state: merged })?;
        info!(seq, "hydrated from remote sync");
        Ok(seq)
    }

    fn replay(&self, entries: &[OperationLogEntry]) -> Result<usize, HydrateError> {
        for entry in entries {
            self.dispatch(operation_to_action(&entry.op))?;
        }
        Ok(entries.len())
    }

    fn dispatch(&self, action: AppAction) -> Result<(), HydrateError> {
        self.dispatcher.dispatch(action)?;
        Ok(())
    }
}

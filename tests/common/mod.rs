#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use opsync::{
    config::HydrationConfig,
    core::{
        store::{OpLogStore, StateCache},
        vector_clock::VectorClock,
    },
    engine::{
        converter::{AppAction, ChangeKind},
        traits::{
            ClientIdProvider, CollaboratorError, DispatchError, FixedClientId, LegacyDataLoader,
            ModelCacheReader, Notice, StateDispatcher, UserNotifier, WallClock,
        },
    },
    op::{OpType, Operation, OperationLogEntry},
    persist::{LogBackend, NewLogEntry, PersistError, PersistResult, memory::MemoryLogBackend},
    runtime::{hydrator::Hydrator, migration::MigrationService},
    sync::provider::{OpDownloadResponse, ProviderError, ServerOp, SyncProvider},
    types::{OpId, OpSeq, ServerSeq, TimestampMs},
};

pub const CLIENT: &str = "client-a";

pub fn op(id: &str, op_type: OpType, entity_id: &str, counter: u64, payload: Value) -> Operation {
    Operation {
        id: id.to_string(),
        action_type: format!("[Test] {op_type:?}"),
        op_type,
        entity_type: "TASK".to_string(),
        entity_id: Some(entity_id.to_string()),
        payload,
        client_id: CLIENT.to_string(),
        vector_clock: VectorClock::single(CLIENT, counter),
        timestamp: 1_700_000_000_000,
        schema_version: 1,
    }
}

pub fn create(id: &str, entity_id: &str, counter: u64) -> Operation {
    op(id, OpType::Create, entity_id, counter, json!({ "title": id }))
}

pub fn server_op(server_seq: ServerSeq, op: Operation) -> ServerOp {
    ServerOp {
        server_seq,
        received_at: 0,
        op,
    }
}

pub fn page(ops: Vec<ServerOp>, has_more: bool, latest_seq: ServerSeq) -> OpDownloadResponse {
    OpDownloadResponse {
        ops,
        has_more,
        latest_seq,
        ..OpDownloadResponse::default()
    }
}

/// Records every dispatched action; fails for time entries of listed entities.
#[derive(Default)]
pub struct RecordingDispatcher {
    pub actions: Mutex<Vec<AppAction>>,
    pub fail_entities: Mutex<Vec<String>>,
}

impl RecordingDispatcher {
    pub fn actions(&self) -> Vec<AppAction> {
        self.actions.lock().expect("actions").clone()
    }

    pub fn fail_for(&self, entity_id: &str) {
        self.fail_entities
            .lock()
            .expect("fail list")
            .push(entity_id.to_string());
    }
}

impl StateDispatcher for RecordingDispatcher {
    fn dispatch(&self, action: AppAction) -> Result<(), DispatchError> {
        if let AppAction::SyncTimeSpent { entity_id, .. } = &action {
            if self
                .fail_entities
                .lock()
                .expect("fail list")
                .contains(entity_id)
            {
                return Err(DispatchError(format!("rejected {entity_id}")));
            }
        }
        self.actions.lock().expect("actions").push(action);
        Ok(())
    }
}

/// Dispatcher that rejects everything.
pub struct FailingDispatcher;

impl StateDispatcher for FailingDispatcher {
    fn dispatch(&self, _action: AppAction) -> Result<(), DispatchError> {
        Err(DispatchError("reducer exploded".to_string()))
    }
}

/// Minimal reducer: entity id to payload, whole-state loads replace everything.
pub fn reduce(state: &mut Map<String, Value>, action: &AppAction) {
    match action {
        AppAction::LoadAllData { state: next } => {
            *state = next.as_object().cloned().unwrap_or_default();
        }
        AppAction::Entity {
            kind, entity_id, payload, ..
        } => {
            let Some(id) = entity_id else { return };
            match kind {
                ChangeKind::Create | ChangeKind::Update => {
                    state.insert(id.clone(), payload.clone());
                }
                ChangeKind::Delete => {
                    state.remove(id);
                }
            }
        }
        AppAction::Batch { .. } | AppAction::SyncTimeSpent { .. } => {}
    }
}

/// Pages are served in order; an exhausted script serves empty final pages.
#[derive(Default)]
pub struct ScriptedProvider {
    pub last_server_seq: Mutex<ServerSeq>,
    pub pages: Mutex<VecDeque<OpDownloadResponse>>,
    pub download_calls: Mutex<Vec<(ServerSeq, Option<String>)>>,
    pub stored_seqs: Mutex<Vec<ServerSeq>>,
    pub last_seq_reads: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(last_server_seq: ServerSeq, pages: Vec<OpDownloadResponse>) -> Self {
        Self {
            last_server_seq: Mutex::new(last_server_seq),
            pages: Mutex::new(pages.into()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<(ServerSeq, Option<String>)> {
        self.download_calls.lock().expect("calls").clone()
    }

    pub fn stored(&self) -> Vec<ServerSeq> {
        self.stored_seqs.lock().expect("stored").clone()
    }
}

#[async_trait]
impl SyncProvider for ScriptedProvider {
    async fn get_last_server_seq(&self) -> Result<ServerSeq, ProviderError> {
        self.last_seq_reads.fetch_add(1, Ordering::SeqCst);
        Ok(*self.last_server_seq.lock().expect("seq"))
    }

    async fn download_ops(
        &self,
        since_seq: ServerSeq,
        cursor: Option<&str>,
        _page_size: usize,
    ) -> Result<OpDownloadResponse, ProviderError> {
        self.download_calls
            .lock()
            .expect("calls")
            .push((since_seq, cursor.map(str::to_string)));
        Ok(self
            .pages
            .lock()
            .expect("pages")
            .pop_front()
            .unwrap_or_default())
    }

    async fn set_last_server_seq(&self, seq: ServerSeq) -> Result<(), ProviderError> {
        *self.last_server_seq.lock().expect("seq") = seq;
        self.stored_seqs.lock().expect("stored").push(seq);
        Ok(())
    }
}

/// Holds every page request open for `delay` and records the peak number of
/// requests in flight at once.
pub struct SlowProvider {
    delay: Duration,
    inflight: AtomicUsize,
    peak: AtomicUsize,
}

impl SlowProvider {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            inflight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SyncProvider for SlowProvider {
    async fn get_last_server_seq(&self) -> Result<ServerSeq, ProviderError> {
        Ok(0)
    }

    async fn download_ops(
        &self,
        _since_seq: ServerSeq,
        _cursor: Option<&str>,
        _page_size: usize,
    ) -> Result<OpDownloadResponse, ProviderError> {
        let now = self.inflight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.inflight.fetch_sub(1, Ordering::SeqCst);
        Ok(OpDownloadResponse::default())
    }

    async fn set_last_server_seq(&self, _seq: ServerSeq) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// Returns scripted timestamps in order, repeating the last one.
pub struct ScriptedClock {
    times: Mutex<VecDeque<TimestampMs>>,
}

impl ScriptedClock {
    pub fn new(times: Vec<TimestampMs>) -> Self {
        Self {
            times: Mutex::new(times.into()),
        }
    }

    pub fn fixed(time: TimestampMs) -> Self {
        Self::new(vec![time])
    }
}

impl WallClock for ScriptedClock {
    fn now_ms(&self) -> TimestampMs {
        let mut times = self.times.lock().expect("times");
        if times.len() > 1 {
            times.pop_front().unwrap_or_default()
        } else {
            times.front().copied().unwrap_or_default()
        }
    }
}

#[derive(Default)]
pub struct CountingNotifier {
    pub notices: Mutex<Vec<Notice>>,
}

impl CountingNotifier {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().expect("notices").clone()
    }
}

impl UserNotifier for CountingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().expect("notices").push(notice);
    }
}

/// Legacy loader returning a fixed snapshot, or an error when `None`.
pub struct StaticLegacy {
    pub data: Option<Value>,
    pub calls: AtomicUsize,
}

impl StaticLegacy {
    pub fn new(data: Value) -> Self {
        Self {
            data: Some(data),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            data: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LegacyDataLoader for StaticLegacy {
    async fn get_all_sync_model_data(
        &self,
        skip_validity_check: bool,
    ) -> Result<Value, CollaboratorError> {
        assert!(skip_validity_check, "migration must skip validity checks");
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.data
            .clone()
            .ok_or_else(|| CollaboratorError("legacy database unreadable".to_string()))
    }
}

pub struct StaticModelCache(pub Value);

#[async_trait]
impl ModelCacheReader for StaticModelCache {
    async fn get_all_sync_model_data_from_model_ctrls(&self) -> Result<Value, CollaboratorError> {
        Ok(self.0.clone())
    }
}

pub struct FailingModelCache;

#[async_trait]
impl ModelCacheReader for FailingModelCache {
    async fn get_all_sync_model_data_from_model_ctrls(&self) -> Result<Value, CollaboratorError> {
        Err(CollaboratorError("model caches unavailable".to_string()))
    }
}

/// Memory backend whose state cache writes fail once `reject_cache_saves` is set.
#[derive(Default)]
pub struct CacheWriteFailingBackend {
    inner: MemoryLogBackend,
    pub reject_cache_saves: Arc<AtomicBool>,
}

impl LogBackend for CacheWriteFailingBackend {
    fn append_entries(&mut self, entries: &[NewLogEntry]) -> PersistResult<Vec<OpSeq>> {
        self.inner.append_entries(entries)
    }

    fn entries_after(&self, after: OpSeq) -> PersistResult<Vec<OperationLogEntry>> {
        self.inner.entries_after(after)
    }

    fn entry_by_op_id(&self, id: &str) -> PersistResult<Option<OperationLogEntry>> {
        self.inner.entry_by_op_id(id)
    }

    fn last_seq(&self) -> PersistResult<OpSeq> {
        self.inner.last_seq()
    }

    fn applied_op_ids_after(&self, after: OpSeq) -> PersistResult<Vec<OpId>> {
        self.inner.applied_op_ids_after(after)
    }

    fn contains_op_id(&self, id: &str) -> PersistResult<bool> {
        self.inner.contains_op_id(id)
    }

    fn load_state_cache(&self) -> PersistResult<Option<StateCache>> {
        self.inner.load_state_cache()
    }

    fn save_state_cache(&mut self, cache: &StateCache) -> PersistResult<()> {
        if self.reject_cache_saves.load(Ordering::SeqCst) {
            return Err(PersistError::Message("disk full".to_string()));
        }
        self.inner.save_state_cache(cache)
    }

    fn mark_synced(&mut self, seqs: &[OpSeq], synced_at: TimestampMs) -> PersistResult<()> {
        self.inner.mark_synced(seqs, synced_at)
    }

    fn compact_synced_through(&mut self, seq: OpSeq) -> PersistResult<usize> {
        self.inner.compact_synced_through(seq)
    }
}

pub fn legacy_with_tasks() -> Value {
    json!({
        "task": { "ids": ["t1"], "entities": { "t1": { "title": "legacy" } } },
        "project": { "ids": [], "entities": {} },
        "globalConfig": { "lang": "en" }
    })
}

pub fn migration(store: &OpLogStore, legacy: Arc<StaticLegacy>) -> MigrationService {
    let client_id: Arc<dyn ClientIdProvider> = Arc::new(FixedClientId(CLIENT.to_string()));
    MigrationService::new(store.clone(), legacy, client_id, 1)
}

pub fn hydrator(
    store: &OpLogStore,
    legacy: Arc<StaticLegacy>,
    model_cache: Value,
    dispatcher: Arc<dyn StateDispatcher>,
) -> Hydrator {
    Hydrator::new(
        store.clone(),
        migration(store, legacy),
        Arc::new(StaticModelCache(model_cache)),
        Arc::new(FixedClientId(CLIENT.to_string())),
        dispatcher,
        &HydrationConfig::default(),
    )
}

pub fn hydrator_with(
    store: &OpLogStore,
    model_cache: Arc<dyn ModelCacheReader>,
    dispatcher: Arc<dyn StateDispatcher>,
    config: &HydrationConfig,
) -> Hydrator {
    Hydrator::new(
        store.clone(),
        migration(store, Arc::new(StaticLegacy::new(json!({})))),
        model_cache,
        Arc::new(FixedClientId(CLIENT.to_string())),
        dispatcher,
        config,
    )
}

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::{
    engine::converter::AppAction,
    types::{ClientId, TimestampMs},
};

/// Failure reported by the application's dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("dispatch failed: {0}")]
pub struct DispatchError(pub String);

/// Failure reported by an external data source (legacy loader, model caches, metadata).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct CollaboratorError(pub String);

/// Applies converted operations and whole-state loads to in-memory state.
pub trait StateDispatcher: Send + Sync {
    /// Applies one action.
    fn dispatch(&self, action: AppAction) -> Result<(), DispatchError>;
}

/// Reads the pre-operation-log full snapshot.
#[async_trait]
pub trait LegacyDataLoader: Send + Sync {
    /// Returns every model keyed by model name.
    async fn get_all_sync_model_data(
        &self,
        skip_validity_check: bool,
    ) -> Result<Value, CollaboratorError>;
}

/// Bulk read of the authoritative per-entity model caches.
#[async_trait]
pub trait ModelCacheReader: Send + Sync {
    /// Returns the merged model data, bypassing the action layer.
    async fn get_all_sync_model_data_from_model_ctrls(&self) -> Result<Value, CollaboratorError>;
}

/// Source of this device's client id.
#[async_trait]
pub trait ClientIdProvider: Send + Sync {
    /// Loads the local client id.
    async fn load_client_id(&self) -> Result<ClientId, CollaboratorError>;
}

/// User-visible notice raised by the sync core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Local and server clocks disagree by roughly this many minutes.
    ClockDrift {
        /// Rounded drift.
        minutes: u64,
    },
}

/// Shows notices to the user.
pub trait UserNotifier: Send + Sync {
    /// Displays `notice`.
    fn notify(&self, notice: Notice);
}

/// Notifier that drops every notice.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl UserNotifier for NoopNotifier {
    fn notify(&self, _notice: Notice) {}
}

/// Local wall clock.
pub trait WallClock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_ms(&self) -> TimestampMs;
}

/// [`WallClock`] backed by the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl WallClock for SystemClock {
    fn now_ms(&self) -> TimestampMs {
        crate::types::now_ms()
    }
}

/// Static client id, for tests and single-device setups.
#[derive(Debug, Clone)]
pub struct FixedClientId(pub ClientId);

#[async_trait]
impl ClientIdProvider for FixedClientId {
    async fn load_client_id(&self) -> Result<ClientId, CollaboratorError> {
        Ok(self.0.clone())
    }
}

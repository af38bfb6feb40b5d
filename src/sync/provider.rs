use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    core::vector_clock::VectorClock,
    op::Operation,
    types::{ServerSeq, TimestampMs},
};

/// Transport failure reported by a [`SyncProvider`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The remote could not be reached or answered garbage.
    #[error("transport error: {0}")]
    Transport(String),
    /// The remote understood the request and refused it.
    #[error("remote rejected request: {0}")]
    Rejected(String),
}

/// One operation as served by the remote, with its server-side position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerOp {
    /// Server-assigned sequence.
    pub server_seq: ServerSeq,
    /// When the server received the operation. Never used for drift detection.
    pub received_at: TimestampMs,
    /// The operation itself.
    pub op: Operation,
}

/// One page of a download.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OpDownloadResponse {
    /// Operations in server sequence order.
    pub ops: Vec<ServerOp>,
    /// More pages follow.
    pub has_more: bool,
    /// Latest sequence the server knows about.
    pub latest_seq: ServerSeq,
    /// The requested range can no longer be served.
    pub gap_detected: bool,
    /// Aggregated clock of everything folded into a server-side snapshot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_vector_clock: Option<VectorClock>,
    /// Server wall clock at response time. Absent on older servers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_time: Option<TimestampMs>,
    /// Opaque continuation token for providers that page by cursor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Remote store transport (API server or file-based provider).
#[async_trait]
pub trait SyncProvider: Send + Sync {
    /// Last server sequence this device has durably stored.
    async fn get_last_server_seq(&self) -> Result<ServerSeq, ProviderError>;

    /// Fetches operations after `since_seq`.
    async fn download_ops(
        &self,
        since_seq: ServerSeq,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<OpDownloadResponse, ProviderError>;

    /// Persists the last stored server sequence. Called by the caller, never by the download.
    async fn set_last_server_seq(&self, seq: ServerSeq) -> Result<(), ProviderError>;
}

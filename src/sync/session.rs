use std::sync::Arc;

use tracing::info;

use crate::{
    core::store::OpLogStore,
    op::OpSource,
    types::OpSeq,
};

use super::{
    download::{DownloadError, DownloadOptions, DownloadResult, DownloadService},
    provider::SyncProvider,
};

/// Result of [`SyncSession::download_and_store`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredDownload {
    /// The raw download result.
    pub download: DownloadResult,
    /// Local sequences assigned to the stored operations.
    pub stored_seqs: Vec<OpSeq>,
}

/// Caller side of a download: store first, then advance the server cursor.
pub struct SyncSession {
    store: OpLogStore,
    download: Arc<DownloadService>,
}

impl SyncSession {
    /// Creates a session over a shared download service.
    pub fn new(store: OpLogStore, download: Arc<DownloadService>) -> Self {
        Self { store, download }
    }

    /// Downloads, appends new operations as remote entries, and only then
    /// persists the server sequence on the provider.
    ///
    /// A crash between the append and the sequence write re-downloads the
    /// same operations next time, where deduplication drops them.
    pub async fn download_and_store(
        &self,
        provider: &dyn SyncProvider,
        options: DownloadOptions,
    ) -> Result<StoredDownload, DownloadError> {
        let download = self
            .download
            .download_remote_ops(Some(provider), options)
            .await?;
        if !download.success {
            return Ok(StoredDownload {
                download,
                stored_seqs: Vec::new(),
            });
        }

        let fresh = self.store.filter_new_ops(download.new_ops.clone()).await?;
        let stored_seqs = self.store.append_batch(fresh, OpSource::Remote).await?;

        if let Some(latest) = download.latest_server_seq {
            provider.set_last_server_seq(latest).await?;
        }

        info!(
            stored = stored_seqs.len(),
            latest_server_seq = download.latest_server_seq.unwrap_or(0),
            "stored downloaded operations"
        );
        Ok(StoredDownload {
            download,
            stored_seqs,
        })
    }
}

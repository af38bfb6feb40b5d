use std::{sync::Arc, time::Duration};

use hashbrown::HashSet;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
    config::DownloadConfig,
    core::{store::OpLogStore, vector_clock::VectorClock},
    engine::traits::{Notice, UserNotifier, WallClock},
    op::Operation,
    persist::PersistError,
    types::{OpId, ServerSeq, TimestampMs},
};

use super::{
    clock_drift::{ClockDriftMonitor, DriftCheck},
    lock::LockService,
    provider::{ProviderError, SyncProvider},
};

/// Failure that aborts a download cycle.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The provider call failed.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
    /// Reading the applied-id set failed.
    #[error("persistence error: {0}")]
    Persist(#[from] PersistError),
}

/// Options for one download cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct DownloadOptions {
    /// Ignore the stored server sequence and start from `0`, collecting every
    /// operation's clock into [`DownloadResult::all_op_clocks`].
    pub force_from_seq0: bool,
}

/// Output of one download cycle. Not persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DownloadResult {
    /// Operations not yet in the local log, in server order.
    pub new_ops: Vec<Operation>,
    /// False when no provider was given or a safety bound was hit.
    pub success: bool,
    /// Files that could not be fetched (file-based providers).
    pub failed_file_count: usize,
    /// Latest server sequence reported by the final page. The caller persists
    /// it only after `new_ops` are stored locally.
    pub latest_server_seq: Option<ServerSeq>,
    /// Snapshot clock from the first page of the cycle.
    pub snapshot_vector_clock: Option<VectorClock>,
    /// Clocks of every downloaded operation, duplicates included. Only set
    /// for forced downloads from seq 0.
    pub all_op_clocks: Option<Vec<VectorClock>>,
    /// The server reported a gap during this cycle.
    pub gap_detected: bool,
    /// A gap was reported and the server turned out to be empty, so the
    /// client should seed it with a full-state upload.
    pub needs_full_state_upload: bool,
}

impl DownloadResult {
    fn unsuccessful() -> Self {
        Self::default()
    }
}

/// Pulls remote operations into memory, one cycle at a time.
pub struct DownloadService {
    store: OpLogStore,
    locks: Arc<LockService>,
    notifier: Arc<dyn UserNotifier>,
    drift: ClockDriftMonitor,
    config: DownloadConfig,
}

impl DownloadService {
    /// Creates a service; its clock-drift warning fires at most once for its lifetime.
    pub fn new(
        store: OpLogStore,
        locks: Arc<LockService>,
        notifier: Arc<dyn UserNotifier>,
        clock: Arc<dyn WallClock>,
        config: DownloadConfig,
    ) -> Self {
        let drift = ClockDriftMonitor::new(
            clock,
            config.clock_drift_threshold_ms,
            Duration::from_millis(config.clock_drift_retry_delay_ms),
        );
        Self {
            store,
            locks,
            notifier,
            drift,
            config,
        }
    }

    /// True once clock drift has been reported in this session.
    pub fn has_warned_clock_drift(&self) -> bool {
        self.drift.has_warned()
    }

    /// Runs one download cycle under the download lock.
    ///
    /// Returns an empty, unsuccessful result when `provider` is `None`.
    pub async fn download_remote_ops(
        &self,
        provider: Option<&dyn SyncProvider>,
        options: DownloadOptions,
    ) -> Result<DownloadResult, DownloadError> {
        let Some(provider) = provider else {
            warn!("no sync provider passed for download");
            return Ok(DownloadResult::unsuccessful());
        };

        self.locks
            .request(&self.config.lock_name, || {
                self.download_locked(provider, options)
            })
            .await
    }

    async fn download_locked(
        &self,
        provider: &dyn SyncProvider,
        options: DownloadOptions,
    ) -> Result<DownloadResult, DownloadError> {
        let force = options.force_from_seq0;
        let start_seq = if force {
            warn!("forced download from seq 0 to rebuild clock state");
            0
        } else {
            provider.get_last_server_seq().await?
        };
        let applied = self.store.get_applied_op_ids().await?;

        let mut new_ops: Vec<Operation> = Vec::new();
        let mut seen: HashSet<OpId> = HashSet::new();
        let mut all_op_clocks: Vec<VectorClock> = Vec::new();
        let mut snapshot_vector_clock: Option<VectorClock> = None;
        let mut first_page = true;
        let mut since_seq = start_seq;
        let mut cursor: Option<String> = None;
        let mut has_reset_for_gap = false;
        let mut gap_detected = false;
        let mut latest_seq: ServerSeq = 0;
        let mut iterations = 0usize;

        loop {
            iterations += 1;
            if iterations > self.config.max_iterations {
                error!(
                    max_iterations = self.config.max_iterations,
                    "exceeded max download iterations; server keeps reporting more pages"
                );
                return Ok(DownloadResult::unsuccessful());
            }

            let page = provider
                .download_ops(since_seq, cursor.as_deref(), self.config.page_size)
                .await?;
            latest_seq = page.latest_seq;

            let mut stop_after_page = false;
            if page.gap_detected {
                gap_detected = true;
                if !has_reset_for_gap {
                    warn!(
                        since_seq,
                        latest_seq, "gap detected; restarting download from seq 0"
                    );
                    has_reset_for_gap = true;
                    since_seq = 0;
                    cursor = None;
                    new_ops.clear();
                    seen.clear();
                    all_op_clocks.clear();
                    snapshot_vector_clock = None;
                    first_page = true;
                    continue;
                }
                warn!(
                    latest_seq,
                    "gap reported again after reset; ending download cycle"
                );
                stop_after_page = true;
            }

            if first_page {
                snapshot_vector_clock = page.snapshot_vector_clock.clone();
                if let Some(clock) = &snapshot_vector_clock {
                    debug!(entries = clock.len(), "received snapshot vector clock");
                }
                first_page = false;
            }

            if let Some(server_time) = page.server_time {
                self.check_clock_drift(server_time).await;
            }

            if latest_seq < start_seq {
                warn!(
                    from = start_seq,
                    to = latest_seq,
                    "server sequence decreased; possible server reset or data loss"
                );
            }

            if let Some(last) = page.ops.last() {
                since_seq = last.server_seq;
            }
            let page_len = page.ops.len();

            for server_op in page.ops {
                if force {
                    all_op_clocks.push(server_op.op.vector_clock.clone());
                }
                if applied.contains(&server_op.op.id) || !seen.insert(server_op.op.id.clone()) {
                    continue;
                }
                new_ops.push(server_op.op);
            }

            if new_ops.len() > self.config.max_ops_in_memory {
                error!(
                    count = new_ops.len(),
                    limit = self.config.max_ops_in_memory,
                    "too many operations to download in one cycle"
                );
                return Ok(DownloadResult::unsuccessful());
            }

            cursor = page.next_cursor;
            if stop_after_page || !page.has_more || page_len == 0 {
                break;
            }
        }

        let needs_full_state_upload = has_reset_for_gap && new_ops.is_empty() && latest_seq == 0;
        if needs_full_state_upload {
            warn!("gap on empty server; full state upload required");
        }

        info!(
            count = new_ops.len(),
            latest_seq, iterations, "downloaded remote operations"
        );

        Ok(DownloadResult {
            new_ops,
            success: true,
            failed_file_count: 0,
            latest_server_seq: Some(latest_seq),
            snapshot_vector_clock,
            all_op_clocks: (force && !all_op_clocks.is_empty()).then_some(all_op_clocks),
            gap_detected,
            needs_full_state_upload,
        })
    }

    async fn check_clock_drift(&self, server_time: TimestampMs) {
        match self.drift.check(server_time).await {
            DriftCheck::Confirmed { drift_ms } => {
                let drift_minutes = drift_ms.unsigned_abs() as f64 / 60_000.0;
                let direction = if drift_ms > 0 {
                    "client ahead"
                } else {
                    "client behind"
                };
                warn!(drift_minutes, direction, "clock drift detected");
                self.notifier.notify(Notice::ClockDrift {
                    minutes: drift_minutes.round() as u64,
                });
            }
            DriftCheck::Cleared => {
                debug!("suspected clock drift cleared on retry");
            }
            DriftCheck::WithinThreshold | DriftCheck::AlreadyWarned => {}
        }
    }
}

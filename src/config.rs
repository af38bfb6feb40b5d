//! Tunable policy for the sync services.

use serde::Deserialize;
use thiserror::Error;

/// Download lock name shared by every download cycle in the process.
pub const DOWNLOAD_LOCK_NAME: &str = "sp_op_log_download";

/// Invalid configuration text.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// TOML could not be parsed into [`SyncConfig`].
    #[error("invalid sync config: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Download protocol settings.
    pub download: DownloadConfig,
    /// Time-sync accumulator settings.
    pub time_sync: TimeSyncConfig,
    /// Hydration and migration settings.
    pub hydration: HydrationConfig,
}

impl SyncConfig {
    /// Parses a TOML document; missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }
}

/// Download protocol settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Operations requested per page.
    pub page_size: usize,
    /// Drift between local and server time that counts as suspicious.
    pub clock_drift_threshold_ms: u64,
    /// Wait before confirming a suspected drift.
    pub clock_drift_retry_delay_ms: u64,
    /// Upper bound on pages fetched per cycle.
    pub max_iterations: usize,
    /// Upper bound on new operations held in memory per cycle.
    pub max_ops_in_memory: usize,
    /// Name of the process-wide download lock.
    pub lock_name: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            page_size: 500,
            clock_drift_threshold_ms: 5 * 60 * 1000,
            clock_drift_retry_delay_ms: 1000,
            max_iterations: 1000,
            max_ops_in_memory: 50_000,
            lock_name: DOWNLOAD_LOCK_NAME.to_string(),
        }
    }
}

/// Time-sync accumulator settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeSyncConfig {
    /// Minimum time between periodic flushes.
    pub flush_interval_ms: u64,
}

impl Default for TimeSyncConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: 5 * 60 * 1000,
        }
    }
}

/// Hydration and migration settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HydrationConfig {
    /// Schema version stamped on new operations and caches.
    pub schema_version: u32,
    /// Tail length above which hydration writes a fresh state cache.
    pub snapshot_after_replay_ops: usize,
}

impl Default for HydrationConfig {
    fn default() -> Self {
        Self {
            schema_version: 1,
            snapshot_after_replay_ops: 10,
        }
    }
}

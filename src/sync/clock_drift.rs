use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use crate::{engine::traits::WallClock, types::TimestampMs};

/// Outcome of one drift check against a server timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftCheck {
    /// Drift did not exceed the threshold.
    WithinThreshold,
    /// Drift exceeded the threshold at first but not after the retry delay.
    Cleared,
    /// Drift still exceeded the threshold after the retry delay.
    /// Returned once per monitor; later checks report [`DriftCheck::AlreadyWarned`].
    Confirmed {
        /// `local - server` at confirmation time. Positive means the client is ahead.
        drift_ms: i64,
    },
    /// Drift was already confirmed earlier in this session.
    AlreadyWarned,
}

/// Two-phase clock drift detector: suspect, wait, then confirm or clear.
pub struct ClockDriftMonitor {
    clock: Arc<dyn WallClock>,
    threshold_ms: u64,
    retry_delay: Duration,
    warned: AtomicBool,
}

impl ClockDriftMonitor {
    /// Creates a monitor that has not warned yet.
    pub fn new(clock: Arc<dyn WallClock>, threshold_ms: u64, retry_delay: Duration) -> Self {
        Self {
            clock,
            threshold_ms,
            retry_delay,
            warned: AtomicBool::new(false),
        }
    }

    /// True once a drift has been confirmed.
    pub fn has_warned(&self) -> bool {
        self.warned.load(Ordering::SeqCst)
    }

    fn drift_ms(&self, server_time: TimestampMs) -> i64 {
        self.clock.now_ms() as i64 - server_time as i64
    }

    fn exceeds(&self, drift_ms: i64) -> bool {
        drift_ms.unsigned_abs() > self.threshold_ms
    }

    /// Compares local time against `server_time`, re-checking after the retry
    /// delay before confirming.
    pub async fn check(&self, server_time: TimestampMs) -> DriftCheck {
        if self.has_warned() {
            return DriftCheck::AlreadyWarned;
        }

        if !self.exceeds(self.drift_ms(server_time)) {
            return DriftCheck::WithinThreshold;
        }

        tokio::time::sleep(self.retry_delay).await;

        let drift_ms = self.drift_ms(server_time);
        if !self.exceeds(drift_ms) {
            return DriftCheck::Cleared;
        }

        if self.warned.swap(true, Ordering::SeqCst) {
            return DriftCheck::AlreadyWarned;
        }
        DriftCheck::Confirmed { drift_ms }
    }
}

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use tokio::time::Instant;
use tracing::{debug, error};

use crate::{
    config::TimeSyncConfig,
    engine::{converter::AppAction, traits::StateDispatcher},
    types::EntityId,
};

#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingTime {
    date: String,
    duration_ms: u64,
}

/// Coalesces per-tick time tracking into one dispatch per entity and day.
///
/// Dispatch failures are logged and the affected entry is dropped; pending
/// data is never re-queued.
pub struct TimeSyncAccumulator {
    dispatcher: Arc<dyn StateDispatcher>,
    pending: BTreeMap<EntityId, PendingTime>,
    flush_interval: Duration,
    last_flush: Instant,
}

impl TimeSyncAccumulator {
    /// Creates an empty accumulator whose flush timer starts now.
    pub fn new(dispatcher: Arc<dyn StateDispatcher>, config: &TimeSyncConfig) -> Self {
        Self {
            dispatcher,
            pending: BTreeMap::new(),
            flush_interval: Duration::from_millis(config.flush_interval_ms),
            last_flush: Instant::now(),
        }
    }

    /// Adds `duration_ms` to the bucket of `id` on `date`.
    ///
    /// A bucket for a different date is dispatched first (if non-zero) and
    /// replaced.
    pub fn accumulate(&mut self, id: &str, duration_ms: u64, date: &str) {
        match self.pending.get_mut(id) {
            Some(bucket) if bucket.date == date => {
                bucket.duration_ms = bucket.duration_ms.saturating_add(duration_ms);
            }
            Some(bucket) => {
                let previous = std::mem::replace(
                    bucket,
                    PendingTime {
                        date: date.to_string(),
                        duration_ms,
                    },
                );
                debug!(entity_id = id, date = %previous.date, "day rolled over; flushing previous bucket");
                self.dispatch_entry(id, previous);
            }
            None => {
                self.pending.insert(
                    id.to_string(),
                    PendingTime {
                        date: date.to_string(),
                        duration_ms,
                    },
                );
            }
        }
    }

    /// True once the flush interval has elapsed since the last flush or reset.
    pub fn should_flush(&self) -> bool {
        self.last_flush.elapsed() >= self.flush_interval
    }

    /// Dispatches and clears every pending bucket.
    ///
    /// The pending map is taken before the first dispatch, so a failing
    /// entity loses only its own data.
    pub fn flush(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        self.last_flush = Instant::now();
        for (id, entry) in pending {
            self.dispatch_entry(&id, entry);
        }
    }

    /// Dispatches and removes the bucket of `id`, if any.
    pub fn flush_one(&mut self, id: &str) {
        if let Some(entry) = self.pending.remove(id) {
            self.dispatch_entry(id, entry);
        }
    }

    /// Drops the bucket of `id` without dispatching.
    pub fn clear_one(&mut self, id: &str) {
        self.pending.remove(id);
    }

    /// Restarts the flush timer without flushing.
    pub fn reset_sync_time(&mut self) {
        self.last_flush = Instant::now();
    }

    /// Pending duration for `id`, `0` when nothing is pending.
    pub fn pending_duration(&self, id: &str) -> u64 {
        self.pending.get(id).map_or(0, |entry| entry.duration_ms)
    }

    /// True when no bucket is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn dispatch_entry(&self, id: &str, entry: PendingTime) {
        if entry.duration_ms == 0 {
            return;
        }
        let action = AppAction::SyncTimeSpent {
            entity_id: id.to_string(),
            date: entry.date,
            duration_ms: entry.duration_ms,
        };
        if let Err(err) = self.dispatcher.dispatch(action) {
            error!(entity_id = id, error = %err, "failed to dispatch accumulated time; dropping entry");
        }
    }
}

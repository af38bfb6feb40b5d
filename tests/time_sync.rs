mod common;

use std::{sync::Arc, time::Duration};

use opsync::{
    config::TimeSyncConfig, engine::converter::AppAction, runtime::time_sync::TimeSyncAccumulator,
};

use common::RecordingDispatcher;

const INTERVAL_MS: u64 = 60_000;

fn accumulator() -> (Arc<RecordingDispatcher>, TimeSyncAccumulator) {
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let acc = TimeSyncAccumulator::new(
        dispatcher.clone(),
        &TimeSyncConfig {
            flush_interval_ms: INTERVAL_MS,
        },
    );
    (dispatcher, acc)
}

fn spent(entity_id: &str, date: &str, duration_ms: u64) -> AppAction {
    AppAction::SyncTimeSpent {
        entity_id: entity_id.to_string(),
        date: date.to_string(),
        duration_ms,
    }
}

#[tokio::test(start_paused = true)]
async fn ticks_are_summed_into_one_dispatch() {
    let (dispatcher, mut acc) = accumulator();
    for _ in 0..3 {
        acc.accumulate("e1", 1000, "d1");
    }
    assert!(dispatcher.actions().is_empty());

    acc.flush();
    assert_eq!(dispatcher.actions(), [spent("e1", "d1", 3000)]);
    assert!(acc.is_empty());

    acc.flush();
    assert_eq!(dispatcher.actions().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn day_rollover_flushes_previous_bucket_immediately() {
    let (dispatcher, mut acc) = accumulator();
    acc.accumulate("e1", 1000, "d1");
    acc.accumulate("e1", 500, "d2");

    assert_eq!(dispatcher.actions(), [spent("e1", "d1", 1000)]);
    assert_eq!(acc.pending_duration("e1"), 500);

    acc.flush();
    assert_eq!(
        dispatcher.actions(),
        [spent("e1", "d1", 1000), spent("e1", "d2", 500)]
    );
}

#[tokio::test(start_paused = true)]
async fn zero_durations_are_never_dispatched() {
    let (dispatcher, mut acc) = accumulator();
    acc.accumulate("e1", 0, "d1");
    acc.accumulate("e1", 0, "d2");
    acc.accumulate("e2", 0, "d1");
    acc.flush();
    assert!(dispatcher.actions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn should_flush_follows_the_interval() {
    let (_dispatcher, mut acc) = accumulator();
    assert!(!acc.should_flush());

    tokio::time::advance(Duration::from_millis(INTERVAL_MS - 1)).await;
    assert!(!acc.should_flush());

    tokio::time::advance(Duration::from_millis(1)).await;
    assert!(acc.should_flush());

    acc.flush();
    assert!(!acc.should_flush());

    tokio::time::advance(Duration::from_millis(INTERVAL_MS)).await;
    assert!(acc.should_flush());
    acc.reset_sync_time();
    assert!(!acc.should_flush());
}

#[tokio::test(start_paused = true)]
async fn failing_entity_is_dropped_without_blocking_others() {
    let (dispatcher, mut acc) = accumulator();
    dispatcher.fail_for("bad");
    acc.accumulate("bad", 1000, "d1");
    acc.accumulate("good", 2000, "d1");

    acc.flush();
    assert_eq!(dispatcher.actions(), [spent("good", "d1", 2000)]);
    assert_eq!(acc.pending_duration("bad"), 0);
    assert!(acc.is_empty());
}

#[tokio::test(start_paused = true)]
async fn single_entity_flush_and_clear() {
    let (dispatcher, mut acc) = accumulator();
    acc.accumulate("e1", 1000, "d1");
    acc.accumulate("e2", 2000, "d1");
    acc.accumulate("e3", 3000, "d1");

    acc.flush_one("e1");
    assert_eq!(dispatcher.actions(), [spent("e1", "d1", 1000)]);

    acc.clear_one("e2");
    acc.flush_one("e2");
    assert_eq!(dispatcher.actions().len(), 1);

    acc.flush();
    assert_eq!(
        dispatcher.actions(),
        [spent("e1", "d1", 1000), spent("e3", "d1", 3000)]
    );
}

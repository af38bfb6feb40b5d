use opsync::sync::lock::LockService;

#[tokio::test]
async fn unknown_names_read_as_unlocked() {
    let locks = LockService::new();
    assert!(!locks.is_locked("never-requested"));
    assert!(!locks.is_locked("never-requested"));
}

#[tokio::test]
async fn held_lock_is_reported_until_released() {
    let locks = LockService::new();
    let guard = locks.acquire("download").await;
    assert!(locks.is_locked("download"));
    assert!(!locks.is_locked("upload"));

    drop(guard);
    assert!(!locks.is_locked("download"));
}

#[tokio::test]
async fn request_holds_the_lock_for_the_closure() {
    let locks = LockService::new();
    let held = locks
        .request("download", || async { locks.is_locked("download") })
        .await;
    assert!(held);
    assert!(!locks.is_locked("download"));
}

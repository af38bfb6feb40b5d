use std::{
    future::Future,
    sync::{Arc, Mutex, PoisonError},
};

use hashbrown::HashMap;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Process-wide named mutual exclusion.
///
/// Each name maps to its own async mutex; holders of different names never
/// block each other.
#[derive(Debug, Default)]
pub struct LockService {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl LockService {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, name: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(name.to_string()).or_default())
    }

    /// Waits for the lock `name` and returns its guard.
    pub async fn acquire(&self, name: &str) -> OwnedMutexGuard<()> {
        self.lock_for(name).lock_owned().await
    }

    /// Runs `f` while holding the lock `name`.
    pub async fn request<F, Fut, T>(&self, name: &str, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = self.acquire(name).await;
        f().await
    }

    /// True while someone holds `name`. Never registers `name`.
    pub fn is_locked(&self, name: &str) -> bool {
        let locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.get(name).is_some_and(|lock| lock.try_lock().is_err())
    }
}

//! Startup and post-sync services built on the store.

/// State reconstruction at startup and after a remote sync.
pub mod hydrator;
/// One-time legacy snapshot import.
pub mod migration;
/// Batched time-tracking dispatch.
pub mod time_sync;

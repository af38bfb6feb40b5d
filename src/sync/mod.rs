//! Remote download protocol.

/// Clock drift detection.
pub mod clock_drift;
/// Download service and its result contract.
pub mod download;
/// Named mutual-exclusion locks.
pub mod lock;
/// Remote transport contract.
pub mod provider;
/// Download-then-store ordering helper.
pub mod session;

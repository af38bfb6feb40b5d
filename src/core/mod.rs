//! Operation log store, applied-id index and vector clocks.

/// Applied operation id index.
pub mod indices;
/// Authoritative operation log store and state cache.
pub mod store;
/// Vector clock utility.
pub mod vector_clock;

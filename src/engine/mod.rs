//! Boundary to the application: action conversion and collaborator contracts.

/// Operation to application action conversion.
pub mod converter;
/// Dispatcher, loader and clock contracts.
pub mod traits;

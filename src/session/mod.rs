//! Session configuration, the two-stage scheduler and its observers.

/// Serde configuration and validation.
pub mod config;
/// Iteration callbacks and snapshot output.
pub mod observer;
/// The painting session and stage loop.
pub mod scheduler;

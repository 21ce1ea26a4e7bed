//! Per-group optimizer state and step policy.

pub mod adam;
pub mod coordinator;

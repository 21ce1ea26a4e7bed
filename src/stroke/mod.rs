//! Stroke parameter store and its initialization.

/// Seeded initial layouts.
pub mod init;
/// Strokes and the flat parameter store.
pub mod model;
/// Parameter groups and gradients.
pub mod params;

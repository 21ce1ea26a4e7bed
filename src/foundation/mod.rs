//! Value types, the crate error type and small numeric helpers shared by every stage.

/// Canvas, color and RNG value types.
pub mod core;
/// Crate error type.
pub mod error;
pub(crate) mod math;

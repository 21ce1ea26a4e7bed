//! Frozen generative-model guidance.

/// Scorer trait and offline scorers.
pub mod scorer;

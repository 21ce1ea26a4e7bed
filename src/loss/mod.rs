//! Loss terms and their per-stage composition.
//!
//! Every term returns its value together with an analytic gradient: image-space terms
//! return a [`Raster`](crate::Raster), parameter-space terms a
//! [`StrokeGrads`](crate::StrokeGrads).

pub mod composer;
pub mod position;
pub mod recon;
pub mod structure;

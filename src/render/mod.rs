//! Stroke rasterization, raster buffers and vector export.

/// Renderer trait and backend selection.
pub mod backend;
/// RGB `f64` raster buffer.
pub mod raster;
/// CPU soft rasterizer.
pub mod soft;
/// SVG export and preview rasterization.
pub mod svg;

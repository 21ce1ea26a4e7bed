//! vectorpaint turns a style image and a text prompt into a vector painting made of
//! parametric brushstrokes.
//!
//! Strokes are optimized in two stages:
//!
//! 1. **Imitation**: strokes learn to reproduce the brushstroke texture of the style image
//!    (pixel reconstruction, optionally regularized toward their initial positions).
//! 2. **Synthesis**: strokes are optimized against a guidance gradient from a frozen generative
//!    model, a structural similarity term (SSIM or MS-SSIM) and a positional prior.
//!
//! Every iteration renders the strokes with a differentiable [`StrokeRenderer`], composes the
//! active loss terms with [`LossComposer`], pulls the image-space gradient back onto the stroke
//! parameters and steps one [`Adam`] state per [`ParamGroup`] through the
//! [`OptimizerCoordinator`].
//!
//! Design constraints:
//!
//! - **No unsafe**: `unsafe` is forbidden in this crate.
//! - **Deterministic**: initialization is seeded and rendering reduces gradients in a fixed
//!   order, so identical inputs produce bit-identical stroke sets.
//! - **Trait seams**: the rasterizer ([`StrokeRenderer`]) and the generative model
//!   ([`GuidanceScorer`]) are pluggable. [`SoftRasterizer`] and the offline scorers are the
//!   built-in implementations.
#![forbid(unsafe_code)]

mod foundation;
mod guidance;
mod loss;
mod optim;
mod render;
mod session;
mod stroke;

pub use foundation::core::{Canvas, Point, Rect, Rgba, Rng64, Vec2};
pub use foundation::error::{PaintError, PaintResult};
pub use guidance::scorer::{
    GuidanceOutput, GuidanceRequest, GuidanceScorer, NullScorer, TargetScorer,
};
pub use loss::composer::{
    ComposedLoss, LossBreakdown, LossComposer, LossConfig, Stage, Targets,
};
pub use loss::position::{PosLoss, PositionPrior, SinkhornConfig};
pub use loss::recon::mse;
pub use loss::structure::{StructLoss, ms_ssim, ssim};
pub use optim::adam::Adam;
pub use optim::coordinator::{
    GroupState, OptimFlags, OptimizerCoordinator, StageConfig, decayed_lr,
};
pub use render::backend::{RenderSettings, RendererKind, StrokeRenderer, create_renderer};
pub use render::raster::{CHANNELS, Raster};
pub use render::soft::SoftRasterizer;
pub use render::svg::{SvgOptions, parse_svg, rasterize_svg, stroke_path, to_svg_string, write_svg};
pub use session::config::{GuidanceConfig, SessionConfig, StrokeConfig};
pub use session::observer::{IterationReport, NoopObserver, SessionObserver, SnapshotWriter};
pub use session::scheduler::{PaintSession, SessionFailure, SessionInputs, run_session};
pub use stroke::init::{InitMode, InitSpec, initialize};
pub use stroke::model::{CurveSegment, Stroke, StrokeLayout, StrokeSet};
pub use stroke::params::{ParamGroup, StrokeGrads};

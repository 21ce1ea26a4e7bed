use crate::{
    foundation::error::PaintResult,
    render::raster::Raster,
    stroke::model::StrokeSet,
    stroke::params::StrokeGrads,
};

/// A differentiable rasterizer from stroke parameters to pixels.
///
/// Implementations must be deterministic: the same stroke set always renders to the same raster.
/// Raster size is the stroke set's canvas.
pub trait StrokeRenderer {
    /// Rasterize `strokes` in paint order.
    fn render(&mut self, strokes: &StrokeSet) -> PaintResult<Raster>;

    /// Pull an image-space gradient `d loss / d pixel` back onto the stroke parameters.
    fn backward(&mut self, strokes: &StrokeSet, grad: &Raster) -> PaintResult<StrokeGrads>;
}

/// Available renderer kinds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RendererKind {
    /// Anti-aliased distance-field rasterizer on the CPU.
    #[default]
    Soft,
}

/// Renderer settings shared by every backend.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RenderSettings {
    /// Renderer implementation.
    #[serde(default)]
    pub kind: RendererKind,
    /// Edge falloff in pixels; larger values blur stroke edges and widen gradient support.
    #[serde(default = "default_softness")]
    pub softness: f64,
    /// Canvas color under all strokes.
    #[serde(default = "default_background")]
    pub background: [f64; 3],
}

fn default_softness() -> f64 {
    0.5
}

fn default_background() -> [f64; 3] {
    [1.0, 1.0, 1.0]
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            kind: RendererKind::Soft,
            softness: default_softness(),
            background: default_background(),
        }
    }
}

/// Create a renderer implementation.
pub fn create_renderer(settings: &RenderSettings) -> PaintResult<Box<dyn StrokeRenderer>> {
    match settings.kind {
        RendererKind::Soft => Ok(Box::new(crate::render::soft::SoftRasterizer::new(
            *settings,
        )?)),
    }
}

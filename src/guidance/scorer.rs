use crate::{
    foundation::error::{PaintError, PaintResult},
    render::raster::Raster,
};

/// Text conditioning and sampler knobs passed to a [`GuidanceScorer`].
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GuidanceRequest {
    /// Prompt describing the desired content.
    pub prompt: String,
    /// Prompt describing what to steer away from.
    #[serde(default)]
    pub negative_prompt: String,
    /// Optional description of the style image; runtimes may caption the image when absent.
    #[serde(default)]
    pub style_prompt: Option<String>,
    /// Diffusion steps (more steps trade compute for fidelity).
    pub num_inference_steps: u32,
    /// Classifier-free guidance scale.
    pub guidance_scale: f64,
    /// Session seed, for runtimes that sample noise.
    pub seed: u64,
    /// Synthesis-stage iteration the request is issued for.
    pub iteration: u64,
}

/// Gradient signal returned by a scorer.
#[derive(Clone, Debug, PartialEq)]
pub struct GuidanceOutput {
    /// `d loss / d pixel`, same size as the scored raster.
    pub grad: Raster,
    /// Diagnostic scalar; score-distillation style scorers have no meaningful loss value.
    pub loss: Option<f64>,
}

/// A frozen generative model used only as a gradient source.
///
/// Implementations never update model weights. The session calls [`GuidanceScorer::score_or_grad`]
/// once per synthesis iteration with the freshly rendered raster.
pub trait GuidanceScorer {
    /// Gradient of the guidance objective with respect to `image`.
    fn score_or_grad(
        &mut self,
        image: &Raster,
        request: &GuidanceRequest,
    ) -> PaintResult<GuidanceOutput>;

    /// Optionally synthesize a stylized target image from the style reference before the
    /// synthesis stage (for example by inverting the style image and re-sampling it under the
    /// prompt). `None` keeps the style reference as the target.
    fn synthesize_target(
        &mut self,
        _style: &Raster,
        _request: &GuidanceRequest,
    ) -> PaintResult<Option<Raster>> {
        Ok(None)
    }
}

/// Scorer contributing no gradient.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullScorer;

impl GuidanceScorer for NullScorer {
    fn score_or_grad(
        &mut self,
        image: &Raster,
        _request: &GuidanceRequest,
    ) -> PaintResult<GuidanceOutput> {
        Ok(GuidanceOutput {
            grad: Raster::zeros(image.width, image.height),
            loss: None,
        })
    }
}

/// Offline scorer pulling the painting toward a fixed image.
///
/// The gradient is that of `0.5 * mean((image - target)^2)` scaled by the request's guidance
/// scale, which stands in for a denoiser's residual when no diffusion runtime is available.
#[derive(Clone, Debug)]
pub struct TargetScorer {
    target: Raster,
}

impl TargetScorer {
    pub fn new(target: Raster) -> Self {
        Self { target }
    }

    pub fn target(&self) -> &Raster {
        &self.target
    }
}

impl GuidanceScorer for TargetScorer {
    fn score_or_grad(
        &mut self,
        image: &Raster,
        request: &GuidanceRequest,
    ) -> PaintResult<GuidanceOutput> {
        image
            .check_same_size(&self.target)
            .map_err(|e| PaintError::guidance(e.to_string()))?;
        let n = image.data.len().max(1) as f64;
        let scale = request.guidance_scale;
        let mut grad = Raster::zeros(image.width, image.height);
        let mut loss = 0.0;
        for ((g, x), t) in grad.data.iter_mut().zip(&image.data).zip(&self.target.data) {
            let d = x - t;
            loss += d * d;
            *g = scale * d / n;
        }
        Ok(GuidanceOutput {
            grad,
            loss: Some(scale * 0.5 * loss / n),
        })
    }

    fn synthesize_target(
        &mut self,
        _style: &Raster,
        _request: &GuidanceRequest,
    ) -> PaintResult<Option<Raster>> {
        Ok(Some(self.target.clone()))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/guidance/scorer.rs"]
mod tests;

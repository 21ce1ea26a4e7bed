use crate::{
    foundation::error::{PaintError, PaintResult},
    guidance::scorer::{GuidanceRequest, GuidanceScorer},
    loss::position::{PosLoss, PositionPrior, SinkhornConfig},
    loss::recon::mse,
    loss::structure::StructLoss,
    render::raster::Raster,
    stroke::model::StrokeSet,
    stroke::params::StrokeGrads,
};

/// Optimization phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Imitate the brushstroke texture of the style image.
    Imitation,
    /// Optimize against guidance, structure and position.
    Synthesis,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Self::Imitation => "imitation",
            Self::Synthesis => "synthesis",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Reference images the loss terms compare against.
#[derive(Clone, Debug, PartialEq)]
pub struct Targets {
    /// Style image, the imitation target.
    pub style: Raster,
    /// Synthesis target; the style image unless the scorer synthesized one.
    pub synthesis: Raster,
}

impl Targets {
    pub fn from_style(style: Raster) -> Self {
        Self {
            synthesis: style.clone(),
            style,
        }
    }
}

/// Loss weights and formulations.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LossConfig {
    /// Imitation-stage reconstruction weight.
    #[serde(default = "one")]
    pub recon_weight: f64,
    /// Synthesis-stage MSE against the synthesis target; 0 disables it.
    #[serde(default)]
    pub l2_weight: f64,
    #[serde(default)]
    pub struct_loss: StructLoss,
    /// 0 disables the structural term.
    #[serde(default = "one")]
    pub struct_loss_weight: f64,
    #[serde(default)]
    pub pos_type: PosLoss,
    /// 0 disables the positional term.
    #[serde(default)]
    pub pos_loss_weight: f64,
    /// Also apply the positional term during imitation, against the initial layout.
    #[serde(default)]
    pub imitation_pos_loss: bool,
    /// Curve samples per segment for [`PosLoss::Bez`].
    #[serde(default = "default_bez_samples")]
    pub bez_samples: usize,
    #[serde(default)]
    pub sinkhorn: SinkhornConfig,
}

fn one() -> f64 {
    1.0
}

fn default_bez_samples() -> usize {
    4
}

impl Default for LossConfig {
    fn default() -> Self {
        Self {
            recon_weight: one(),
            l2_weight: 0.0,
            struct_loss: StructLoss::default(),
            struct_loss_weight: one(),
            pos_type: PosLoss::default(),
            pos_loss_weight: 0.0,
            imitation_pos_loss: false,
            bez_samples: default_bez_samples(),
            sinkhorn: SinkhornConfig::default(),
        }
    }
}

impl LossConfig {
    pub fn validate(&self) -> PaintResult<()> {
        for (name, w) in [
            ("recon_weight", self.recon_weight),
            ("l2_weight", self.l2_weight),
            ("struct_loss_weight", self.struct_loss_weight),
            ("pos_loss_weight", self.pos_loss_weight),
        ] {
            if !w.is_finite() || w < 0.0 {
                return Err(PaintError::config(format!(
                    "{name} must be finite and >= 0, got {w}"
                )));
            }
        }
        if self.bez_samples == 0 {
            return Err(PaintError::config("bez_samples must be > 0"));
        }
        self.sinkhorn.validate()
    }

    /// Whether the positional term is active in `stage`.
    pub fn position_active(&self, stage: Stage) -> bool {
        self.pos_loss_weight > 0.0
            && match stage {
                Stage::Imitation => self.imitation_pos_loss,
                Stage::Synthesis => true,
            }
    }
}

/// Weighted value of every term; inactive terms are 0.
#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize)]
pub struct LossBreakdown {
    pub recon: f64,
    pub l2: f64,
    pub structure: f64,
    /// Only present when the scorer reports a value.
    pub guidance: Option<f64>,
    pub position: f64,
}

impl LossBreakdown {
    pub fn total(&self) -> f64 {
        self.recon + self.l2 + self.structure + self.guidance.unwrap_or(0.0) + self.position
    }
}

/// Result of one composition: the scalar plus both gradient halves.
#[derive(Clone, Debug)]
pub struct ComposedLoss {
    pub total: f64,
    pub breakdown: LossBreakdown,
    /// `d total / d pixel`, to be pulled back through the renderer.
    pub image_grad: Raster,
    /// Gradient of terms that depend on stroke parameters directly.
    pub param_grad: StrokeGrads,
}

/// Combines the active loss terms of a stage into one objective.
#[derive(Clone, Debug)]
pub struct LossComposer {
    config: LossConfig,
    guidance_weight: f64,
    request: GuidanceRequest,
    prior: Option<PositionPrior>,
}

impl LossComposer {
    /// `request` is the template sent to the scorer; its iteration is overwritten per call.
    pub fn new(config: LossConfig, guidance_weight: f64, request: GuidanceRequest) -> Self {
        Self {
            config,
            guidance_weight,
            request,
            prior: None,
        }
    }

    pub fn config(&self) -> &LossConfig {
        &self.config
    }

    /// Record the positional prior from the current strokes.
    pub fn capture_prior(&mut self, strokes: &StrokeSet) {
        self.prior = Some(PositionPrior::capture(strokes, self.config.bez_samples));
    }

    pub fn prior(&self) -> Option<&PositionPrior> {
        self.prior.as_ref()
    }

    pub fn compose(
        &mut self,
        rendered: &Raster,
        strokes: &StrokeSet,
        targets: &Targets,
        stage: Stage,
        scorer: &mut dyn GuidanceScorer,
        iteration: u64,
    ) -> PaintResult<ComposedLoss> {
        let mut breakdown = LossBreakdown::default();
        let mut image_grad = Raster::zeros(rendered.width, rendered.height);
        let mut param_grad = StrokeGrads::zeros_like(strokes);
        let cfg = &self.config;

        match stage {
            Stage::Imitation => {
                if cfg.recon_weight > 0.0 {
                    let (v, g) = mse(rendered, &targets.style)?;
                    breakdown.recon = cfg.recon_weight * v;
                    image_grad.add_scaled(&g, cfg.recon_weight)?;
                }
            }
            Stage::Synthesis => {
                if cfg.l2_weight > 0.0 {
                    let (v, g) = mse(rendered, &targets.synthesis)?;
                    breakdown.l2 = cfg.l2_weight * v;
                    image_grad.add_scaled(&g, cfg.l2_weight)?;
                }
                if cfg.struct_loss_weight > 0.0 {
                    let (v, g) = cfg.struct_loss.loss(rendered, &targets.synthesis)?;
                    breakdown.structure = cfg.struct_loss_weight * v;
                    image_grad.add_scaled(&g, cfg.struct_loss_weight)?;
                }
                if self.guidance_weight > 0.0 {
                    self.request.iteration = iteration;
                    let out = scorer.score_or_grad(rendered, &self.request)?;
                    out.grad
                        .check_same_size(rendered)
                        .map_err(|e| PaintError::guidance(e.to_string()))?;
                    breakdown.guidance = out.loss.map(|l| self.guidance_weight * l);
                    image_grad.add_scaled(&out.grad, self.guidance_weight)?;
                }
            }
        }

        if cfg.position_active(stage) {
            let prior = self
                .prior
                .as_mut()
                .ok_or_else(|| PaintError::config("positional prior has not been captured"))?;
            let (v, g) = prior.loss(cfg.pos_type, strokes, &cfg.sinkhorn)?;
            breakdown.position = cfg.pos_loss_weight * v;
            param_grad.add_scaled(&g, cfg.pos_loss_weight);
        }

        let total = breakdown.total();
        if !total.is_finite() {
            return Err(PaintError::numerical(format!(
                "{stage} loss is not finite at iteration {iteration}"
            )));
        }
        if !image_grad.is_finite() || !param_grad.is_finite() {
            return Err(PaintError::numerical(format!(
                "{stage} loss gradient is not finite at iteration {iteration}"
            )));
        }
        Ok(ComposedLoss {
            total,
            breakdown,
            image_grad,
            param_grad,
        })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/loss/composer.rs"]
mod tests;

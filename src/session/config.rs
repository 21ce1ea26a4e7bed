use std::path::Path;

use anyhow::Context;

use crate::{
    foundation::core::Canvas,
    foundation::error::{PaintError, PaintResult},
    guidance::scorer::GuidanceRequest,
    loss::composer::LossConfig,
    optim::coordinator::{OptimFlags, StageConfig},
    render::backend::RenderSettings,
    stroke::init::{InitMode, InitSpec},
    stroke::model::StrokeLayout,
};

/// Stroke count, shape and initial attributes.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StrokeConfig {
    pub num_paths: usize,
    #[serde(flatten)]
    pub layout: StrokeLayout,
    #[serde(default = "default_init_width")]
    pub init_width: f64,
    #[serde(default = "default_max_width")]
    pub max_width: f64,
    #[serde(default = "default_init_alpha")]
    pub init_alpha: f64,
    #[serde(default = "default_radius_frac")]
    pub radius_frac: f64,
    #[serde(default)]
    pub init_mode: InitMode,
}

fn default_init_width() -> f64 {
    1.5
}

fn default_max_width() -> f64 {
    4.0
}

fn default_init_alpha() -> f64 {
    1.0
}

fn default_radius_frac() -> f64 {
    0.05
}

impl Default for StrokeConfig {
    fn default() -> Self {
        Self {
            num_paths: 256,
            layout: StrokeLayout::default(),
            init_width: default_init_width(),
            max_width: default_max_width(),
            init_alpha: default_init_alpha(),
            radius_frac: default_radius_frac(),
            init_mode: InitMode::default(),
        }
    }
}

/// Prompt and sampler settings forwarded to the guidance scorer.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GuidanceConfig {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: String,
    #[serde(default)]
    pub style_prompt: Option<String>,
    #[serde(default = "default_inference_steps")]
    pub num_inference_steps: u32,
    #[serde(default = "default_guidance_scale")]
    pub guidance_scale: f64,
    /// Weight of the guidance gradient in the synthesis loss; 0 skips the scorer.
    #[serde(default = "default_guidance_weight")]
    pub weight: f64,
}

fn default_inference_steps() -> u32 {
    50
}

fn default_guidance_scale() -> f64 {
    7.5
}

fn default_guidance_weight() -> f64 {
    1.0
}

impl Default for GuidanceConfig {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            negative_prompt: String::new(),
            style_prompt: None,
            num_inference_steps: default_inference_steps(),
            guidance_scale: default_guidance_scale(),
            weight: default_guidance_weight(),
        }
    }
}

/// Immutable description of one painting session.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SessionConfig {
    pub canvas: Canvas,
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub strokes: StrokeConfig,
    #[serde(default)]
    pub optim: OptimFlags,
    #[serde(default)]
    pub imitation: StageConfig,
    #[serde(default)]
    pub synthesis: StageConfig,
    #[serde(default)]
    pub loss: LossConfig,
    #[serde(default)]
    pub guidance: GuidanceConfig,
    #[serde(default)]
    pub render: RenderSettings,
    /// Snapshot interval in iterations; `None` disables snapshots.
    #[serde(default)]
    pub save_step: Option<u64>,
}

impl SessionConfig {
    /// Defaults for everything except the canvas.
    pub fn new(canvas: Canvas) -> Self {
        Self {
            canvas,
            seed: 0,
            strokes: StrokeConfig::default(),
            optim: OptimFlags::default(),
            imitation: StageConfig::default(),
            synthesis: StageConfig::default(),
            loss: LossConfig::default(),
            guidance: GuidanceConfig::default(),
            render: RenderSettings::default(),
            save_step: None,
        }
    }

    pub fn from_json_str(s: &str) -> PaintResult<Self> {
        serde_json::from_str(s).map_err(|e| PaintError::serde(e.to_string()))
    }

    pub fn from_json_file(path: &Path) -> PaintResult<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config '{}'", path.display()))?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> PaintResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| PaintError::serde(e.to_string()))
    }

    /// Reject every invalid setting before any work starts.
    pub fn validate(&self) -> PaintResult<()> {
        self.canvas.validate()?;
        self.init_spec().validate()?;
        self.imitation.validate("imitation")?;
        self.synthesis.validate("synthesis")?;
        self.loss.validate()?;
        let g = &self.guidance;
        if !g.weight.is_finite() || g.weight < 0.0 {
            return Err(PaintError::config(format!(
                "guidance weight must be finite and >= 0, got {}",
                g.weight
            )));
        }
        if !g.guidance_scale.is_finite() {
            return Err(PaintError::config("guidance_scale must be finite"));
        }
        if !self.render.softness.is_finite() || self.render.softness <= 0.0 {
            return Err(PaintError::config("render softness must be finite and > 0"));
        }
        if self.save_step == Some(0) {
            return Err(PaintError::config("save_step must be > 0"));
        }
        Ok(())
    }

    pub fn init_spec(&self) -> InitSpec {
        let s = &self.strokes;
        InitSpec {
            num_paths: s.num_paths,
            canvas: self.canvas,
            seed: self.seed,
            mode: s.init_mode,
            layout: s.layout,
            init_width: s.init_width,
            max_width: s.max_width,
            init_alpha: s.init_alpha,
            radius_frac: s.radius_frac,
        }
    }

    /// Scorer request template; the session fills in the iteration.
    pub fn guidance_request(&self) -> GuidanceRequest {
        let g = &self.guidance;
        GuidanceRequest {
            prompt: g.prompt.clone(),
            negative_prompt: g.negative_prompt.clone(),
            style_prompt: g.style_prompt.clone(),
            num_inference_steps: g.num_inference_steps,
            guidance_scale: g.guidance_scale,
            seed: self.seed,
            iteration: 0,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/session/config.rs"]
mod tests;

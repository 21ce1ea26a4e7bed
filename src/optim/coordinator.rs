use crate::{
    foundation::error::{PaintError, PaintResult},
    optim::adam::Adam,
    stroke::model::StrokeSet,
    stroke::params::{ParamGroup, StrokeGrads},
};

/// Which parameter groups (and color channels) may change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct OptimFlags {
    /// Control point positions.
    #[serde(default = "yes")]
    pub points: bool,
    /// RGB channels of the color group.
    #[serde(default = "yes")]
    pub rgba: bool,
    /// Alpha channel of the color group.
    #[serde(default = "yes")]
    pub opacity: bool,
    #[serde(default = "yes")]
    pub width: bool,
}

fn yes() -> bool {
    true
}

impl Default for OptimFlags {
    fn default() -> Self {
        Self {
            points: true,
            rgba: true,
            opacity: true,
            width: true,
        }
    }
}

/// Per-stage iteration budget and learning-rate policy.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StageConfig {
    #[serde(default)]
    pub num_iter: u64,
    /// Control point learning rate, in pixels.
    #[serde(default = "default_lr")]
    pub lr: f64,
    #[serde(default = "default_color_lr")]
    pub color_lr: f64,
    #[serde(default = "default_width_lr")]
    pub width_lr: f64,
    /// Enable step decay.
    #[serde(default)]
    pub lr_schedule: bool,
    /// Iterations at which every learning rate is multiplied by `decay_factor`. Ascending.
    #[serde(default)]
    pub decay_steps: Vec<u64>,
    #[serde(default = "default_decay_factor")]
    pub decay_factor: f64,
}

fn default_lr() -> f64 {
    1.0
}

fn default_color_lr() -> f64 {
    0.01
}

fn default_width_lr() -> f64 {
    0.1
}

fn default_decay_factor() -> f64 {
    0.5
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            num_iter: 0,
            lr: default_lr(),
            color_lr: default_color_lr(),
            width_lr: default_width_lr(),
            lr_schedule: false,
            decay_steps: Vec::new(),
            decay_factor: default_decay_factor(),
        }
    }
}

impl StageConfig {
    pub fn base_lr(&self, group: ParamGroup) -> f64 {
        match group {
            ParamGroup::Points => self.lr,
            ParamGroup::Color => self.color_lr,
            ParamGroup::Width => self.width_lr,
        }
    }

    pub fn validate(&self, stage: &str) -> PaintResult<()> {
        for group in ParamGroup::ALL {
            let lr = self.base_lr(group);
            if !lr.is_finite() || lr < 0.0 {
                return Err(PaintError::config(format!(
                    "{stage} {group} learning rate must be finite and >= 0, got {lr}"
                )));
            }
        }
        if !(self.decay_factor > 0.0 && self.decay_factor <= 1.0) {
            return Err(PaintError::config(format!(
                "{stage} decay_factor must be in (0, 1], got {}",
                self.decay_factor
            )));
        }
        if self.decay_steps.windows(2).any(|w| w[0] > w[1]) {
            return Err(PaintError::config(format!(
                "{stage} decay_steps must be ascending"
            )));
        }
        Ok(())
    }
}

/// Piecewise-constant step decay: `base * factor^(number of decay steps <= iteration)`.
pub fn decayed_lr(base: f64, factor: f64, decay_steps: &[u64], iteration: u64) -> f64 {
    let passed = decay_steps.iter().filter(|&&d| d <= iteration).count();
    base * factor.powi(passed as i32)
}

/// Optimizer record of one parameter group.
#[derive(Clone, Debug)]
pub struct GroupState {
    pub group: ParamGroup,
    pub base_lr: f64,
    pub lr: f64,
    pub adam: Adam,
    /// Disabled groups are never written.
    pub enabled: bool,
    /// For the color group: which of `r, g, b, a` may change. All true elsewhere.
    pub channel_mask: [bool; 4],
}

/// Applies one optimizer step per iteration to every enabled group, then projects the
/// stroke set back into its valid range.
#[derive(Clone, Debug)]
pub struct OptimizerCoordinator {
    groups: Vec<GroupState>,
    schedule: Option<(Vec<u64>, f64)>,
    max_width: f64,
}

impl OptimizerCoordinator {
    pub fn new(
        strokes: &StrokeSet,
        stage: &StageConfig,
        flags: OptimFlags,
        max_width: f64,
    ) -> PaintResult<Self> {
        stage.validate("stage")?;
        let groups = ParamGroup::ALL
            .into_iter()
            .map(|group| {
                let (enabled, channel_mask) = match group {
                    ParamGroup::Points => (flags.points, [true; 4]),
                    ParamGroup::Width => (flags.width, [true; 4]),
                    ParamGroup::Color => {
                        let mask = [flags.rgba, flags.rgba, flags.rgba, flags.opacity];
                        (flags.rgba || flags.opacity, mask)
                    }
                };
                let base_lr = stage.base_lr(group);
                GroupState {
                    group,
                    base_lr,
                    lr: base_lr,
                    adam: Adam::new(strokes.tensor(group).len()),
                    enabled,
                    channel_mask,
                }
            })
            .collect();
        Ok(Self {
            groups,
            schedule: stage
                .lr_schedule
                .then(|| (stage.decay_steps.clone(), stage.decay_factor)),
            max_width,
        })
    }

    pub fn groups(&self) -> &[GroupState] {
        &self.groups
    }

    pub fn group(&self, group: ParamGroup) -> Option<&GroupState> {
        self.groups.iter().find(|g| g.group == group)
    }

    /// Current learning rate of `group`.
    pub fn lr(&self, group: ParamGroup) -> f64 {
        self.group(group).map_or(0.0, |g| g.lr)
    }

    /// Apply the step-decay schedule for `iteration`. No-op when scheduling is off.
    pub fn update_lr(&mut self, iteration: u64) {
        let Some((steps, factor)) = &self.schedule else {
            return;
        };
        for g in &mut self.groups {
            g.lr = decayed_lr(g.base_lr, *factor, steps, iteration);
        }
    }

    pub fn step(&mut self, strokes: &mut StrokeSet, grads: &StrokeGrads) -> PaintResult<()> {
        grads.check_shape(strokes)?;
        if !grads.is_finite() {
            return Err(PaintError::numerical("stroke gradient is not finite"));
        }
        for state in self.groups.iter_mut().filter(|g| g.enabled) {
            let (group, lr, mask) = (state.group, state.lr, state.channel_mask);
            let active = |i: usize| match group {
                ParamGroup::Color => mask[i % 4],
                _ => true,
            };
            state
                .adam
                .step(strokes.tensor_mut(group), grads.tensor(group), lr, active)?;
        }
        strokes.clamp_in_place(self.max_width);
        if !strokes.is_finite() {
            return Err(PaintError::numerical(
                "stroke parameters are not finite after the optimizer step",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/optim/coordinator.rs"]
mod tests;

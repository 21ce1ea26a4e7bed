use std::ops::ControlFlow;

use crate::{
    foundation::error::{PaintError, PaintResult},
    guidance::scorer::GuidanceScorer,
    loss::composer::{LossComposer, Stage, Targets},
    optim::coordinator::OptimizerCoordinator,
    render::backend::StrokeRenderer,
    render::raster::Raster,
    session::config::SessionConfig,
    session::observer::{IterationReport, SessionObserver},
    stroke::init::initialize,
    stroke::model::StrokeSet,
    stroke::params::ParamGroup,
};

/// Caller-provided images and optional starting strokes.
#[derive(Clone, Debug)]
pub struct SessionInputs {
    /// Style reference at canvas size.
    pub style: Raster,
    /// Skip initialization and start from these strokes.
    pub initial: Option<StrokeSet>,
}

/// A session that stopped on an error.
#[derive(Debug)]
pub struct SessionFailure {
    pub error: PaintError,
    /// `None` when the session failed before the first stage.
    pub stage: Option<Stage>,
    pub iteration: u64,
    /// Last stroke set with finite parameters, when one exists.
    pub checkpoint: Option<StrokeSet>,
}

impl SessionFailure {
    fn setup(error: PaintError) -> Self {
        Self {
            error,
            stage: None,
            iteration: 0,
            checkpoint: None,
        }
    }
}

impl std::fmt::Display for SessionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.stage {
            Some(stage) => write!(
                f,
                "{stage} stage failed at iteration {}: {}",
                self.iteration, self.error
            ),
            None => write!(f, "session setup failed: {}", self.error),
        }
    }
}

impl std::error::Error for SessionFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// All state of one painting run.
///
/// The stroke set is owned here and only written by the optimizer coordinator; renderers,
/// scorers and observers get shared borrows.
#[derive(Debug)]
pub struct PaintSession {
    config: SessionConfig,
    strokes: StrokeSet,
    targets: Targets,
    composer: LossComposer,
    stage: Stage,
    iteration: u64,
    checkpoint: StrokeSet,
}

impl PaintSession {
    /// Validate `config` and build the initial stroke set.
    pub fn new(config: SessionConfig, inputs: SessionInputs) -> PaintResult<Self> {
        config.validate()?;
        if inputs.style.canvas() != config.canvas {
            return Err(PaintError::config(format!(
                "style image is {}x{}, canvas is {}x{}",
                inputs.style.width, inputs.style.height, config.canvas.width, config.canvas.height
            )));
        }
        let strokes = match inputs.initial {
            Some(s) => {
                if s.canvas() != config.canvas || s.layout() != config.strokes.layout {
                    return Err(PaintError::config(
                        "initial strokes do not match the configured canvas and layout",
                    ));
                }
                s
            }
            None => initialize(&config.init_spec(), Some(&inputs.style))?,
        };
        let composer = LossComposer::new(
            config.loss.clone(),
            config.guidance.weight,
            config.guidance_request(),
        );
        Ok(Self {
            checkpoint: strokes.clone(),
            strokes,
            targets: Targets::from_style(inputs.style),
            composer,
            config,
            stage: Stage::Imitation,
            iteration: 0,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Live stroke set.
    pub fn strokes(&self) -> &StrokeSet {
        &self.strokes
    }

    pub fn targets(&self) -> &Targets {
        &self.targets
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// Last stroke set with finite parameters.
    pub fn checkpoint(&self) -> &StrokeSet {
        &self.checkpoint
    }

    pub fn into_strokes(self) -> StrokeSet {
        self.strokes
    }

    fn fail(&self, error: PaintError) -> SessionFailure {
        tracing::error!(stage = %self.stage, iteration = self.iteration, %error, "session aborted");
        SessionFailure {
            error,
            stage: Some(self.stage),
            iteration: self.iteration,
            checkpoint: Some(self.checkpoint.clone()),
        }
    }

    /// Run both stages to completion or until the observer stops the session.
    pub fn run(
        &mut self,
        renderer: &mut dyn StrokeRenderer,
        scorer: &mut dyn GuidanceScorer,
        observer: &mut dyn SessionObserver,
    ) -> Result<(), SessionFailure> {
        self.stage = Stage::Imitation;
        match self.run_stage(renderer, scorer, observer) {
            Ok(ControlFlow::Continue(())) => {}
            Ok(ControlFlow::Break(())) => return Ok(()),
            Err(e) => return Err(self.fail(e)),
        }

        self.stage = Stage::Synthesis;
        self.iteration = 0;
        if let Err(e) = self.prepare_synthesis(scorer) {
            return Err(self.fail(e));
        }
        match self.run_stage(renderer, scorer, observer) {
            Ok(_) => Ok(()),
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Resolve the synthesis target and record the positional prior.
    fn prepare_synthesis(&mut self, scorer: &mut dyn GuidanceScorer) -> PaintResult<()> {
        if self.config.synthesis.num_iter > 0 {
            let request = self.config.guidance_request();
            if let Some(target) = scorer.synthesize_target(&self.targets.style, &request)? {
                if target.canvas() != self.config.canvas {
                    return Err(PaintError::guidance(format!(
                        "synthesized target is {}x{}, canvas is {}x{}",
                        target.width,
                        target.height,
                        self.config.canvas.width,
                        self.config.canvas.height
                    )));
                }
                tracing::info!("using synthesized target for the synthesis stage");
                self.targets.synthesis = target;
            }
        }
        self.composer.capture_prior(&self.strokes);
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(stage = %self.stage))]
    fn run_stage(
        &mut self,
        renderer: &mut dyn StrokeRenderer,
        scorer: &mut dyn GuidanceScorer,
        observer: &mut dyn SessionObserver,
    ) -> PaintResult<ControlFlow<()>> {
        let stage = self.stage;
        let stage_cfg = match stage {
            Stage::Imitation => &self.config.imitation,
            Stage::Synthesis => &self.config.synthesis,
        };
        let num_iter = stage_cfg.num_iter;
        let mut coordinator = OptimizerCoordinator::new(
            &self.strokes,
            stage_cfg,
            self.config.optim,
            self.config.strokes.max_width,
        )?;
        if stage == Stage::Imitation && self.config.loss.position_active(stage) {
            self.composer.capture_prior(&self.strokes);
        }
        tracing::info!(num_iter, num_paths = self.strokes.len(), "stage started");

        let mut last_total = None;
        for it in 0..num_iter {
            self.iteration = it;
            coordinator.update_lr(it);

            let rendered = renderer.render(&self.strokes)?;
            if rendered.canvas() != self.strokes.canvas() {
                return Err(PaintError::render(format!(
                    "renderer produced {}x{}, canvas is {}x{}",
                    rendered.width,
                    rendered.height,
                    self.strokes.canvas().width,
                    self.strokes.canvas().height
                )));
            }
            if !rendered.is_finite() {
                return Err(PaintError::numerical("rendered raster is not finite"));
            }

            let loss = self.composer.compose(
                &rendered,
                &self.strokes,
                &self.targets,
                stage,
                scorer,
                it,
            )?;
            let mut grads = renderer.backward(&self.strokes, &loss.image_grad)?;
            grads.check_shape(&self.strokes)?;
            grads.add_scaled(&loss.param_grad, 1.0);
            coordinator.step(&mut self.strokes, &grads)?;

            if let Some(step) = self.config.save_step
                && it % step == 0
            {
                observer.on_snapshot(stage, it, &rendered, &self.checkpoint)?;
            }
            self.checkpoint.clone_from(&self.strokes);

            let report = IterationReport {
                stage,
                iteration: it,
                total: loss.total,
                breakdown: loss.breakdown,
                lrs: ParamGroup::ALL.map(|g| (g, coordinator.lr(g))),
            };
            tracing::debug!(
                iteration = it,
                total = loss.total,
                recon = loss.breakdown.recon,
                structure = loss.breakdown.structure,
                position = loss.breakdown.position,
                lr_points = report.lrs[0].1,
                "iteration"
            );
            last_total = Some(loss.total);
            if observer.on_iteration(&report).is_break() {
                tracing::info!(iteration = it, "stopped by observer");
                return Ok(ControlFlow::Break(()));
            }
        }

        if num_iter > 0 && self.config.save_step.is_some() {
            let rendered = renderer.render(&self.strokes)?;
            observer.on_snapshot(stage, num_iter, &rendered, &self.strokes)?;
        }
        observer.on_stage_end(stage, &self.strokes)?;
        tracing::info!(final_loss = ?last_total, "stage finished");
        Ok(ControlFlow::Continue(()))
    }
}

/// Run a full two-stage session and return the final stroke set.
///
/// Stage 2 starts from stage 1's strokes exactly. When the observer breaks early the strokes
/// as of that iteration are returned.
pub fn run_session(
    config: SessionConfig,
    inputs: SessionInputs,
    renderer: &mut dyn StrokeRenderer,
    scorer: &mut dyn GuidanceScorer,
    observer: &mut dyn SessionObserver,
) -> Result<StrokeSet, SessionFailure> {
    let mut session = PaintSession::new(config, inputs).map_err(|e| {
        tracing::error!(error = %e, "invalid session");
        SessionFailure::setup(e)
    })?;
    session.run(renderer, scorer, observer)?;
    Ok(session.into_strokes())
}

#[cfg(test)]
#[path = "../../tests/unit/session/scheduler.rs"]
mod tests;

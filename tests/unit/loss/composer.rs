use super::*;
use crate::foundation::core::{Canvas, Point, Rgba};
use crate::guidance::scorer::{GuidanceOutput, NullScorer, TargetScorer};
use crate::stroke::model::{Stroke, StrokeLayout};
use crate::stroke::params::ParamGroup;

fn request() -> GuidanceRequest {
    GuidanceRequest {
        prompt: "a lighthouse at dusk".to_owned(),
        negative_prompt: String::new(),
        style_prompt: None,
        num_inference_steps: 50,
        guidance_scale: 1.0,
        seed: 0,
        iteration: 0,
    }
}

fn strokes() -> StrokeSet {
    let stroke = Stroke {
        points: vec![
            Point::new(2.0, 2.0),
            Point::new(6.0, 3.0),
            Point::new(9.0, 10.0),
            Point::new(13.0, 13.0),
        ],
        width: 2.0,
        color: Rgba::new(0.1, 0.2, 0.3, 1.0),
    };
    StrokeSet::new(StrokeLayout::default(), Canvas::new(16, 16).unwrap(), vec![stroke]).unwrap()
}

/// Counts calls and returns a constant gradient.
struct CountingScorer {
    calls: usize,
    last_iteration: u64,
}

impl GuidanceScorer for CountingScorer {
    fn score_or_grad(
        &mut self,
        image: &Raster,
        request: &GuidanceRequest,
    ) -> PaintResult<GuidanceOutput> {
        self.calls += 1;
        self.last_iteration = request.iteration;
        Ok(GuidanceOutput {
            grad: Raster::filled(image.width, image.height, [0.5, 0.5, 0.5]),
            loss: None,
        })
    }
}

#[test]
fn imitation_uses_reconstruction_only() {
    let c = [0.4, 0.4, 0.4];
    let targets = Targets::from_style(Raster::filled(16, 16, c));
    let config = LossConfig {
        recon_weight: 2.0,
        ..LossConfig::default()
    };
    let mut composer = LossComposer::new(config, 1.0, request());
    let mut scorer = CountingScorer {
        calls: 0,
        last_iteration: 0,
    };
    let rendered = Raster::filled(16, 16, [0.6, 0.4, 0.4]);
    let out = composer
        .compose(&rendered, &strokes(), &targets, Stage::Imitation, &mut scorer, 0)
        .unwrap();
    assert_eq!(scorer.calls, 0);
    let expected = 2.0 * (0.2f64 * 0.2) / 3.0;
    assert!((out.total - expected).abs() < 1e-12);
    assert!((out.breakdown.recon - expected).abs() < 1e-12);
    assert_eq!(out.breakdown.structure, 0.0);
    assert!(out.param_grad.points.iter().all(|g| *g == 0.0));
}

#[test]
fn uniform_target_matched_gives_zero_loss() {
    let c = [0.3, 0.7, 0.2];
    let targets = Targets::from_style(Raster::filled(16, 16, c));
    let mut composer = LossComposer::new(LossConfig::default(), 0.0, request());
    let out = composer
        .compose(
            &Raster::filled(16, 16, c),
            &strokes(),
            &targets,
            Stage::Imitation,
            &mut NullScorer,
            0,
        )
        .unwrap();
    assert_eq!(out.total, 0.0);
    assert!(out.image_grad.data.iter().all(|g| *g == 0.0));
}

#[test]
fn synthesis_adds_weighted_guidance_gradient() {
    let target = Raster::filled(16, 16, [0.5, 0.5, 0.5]);
    let config = LossConfig {
        struct_loss_weight: 0.0,
        ..LossConfig::default()
    };
    let mut composer = LossComposer::new(config, 3.0, request());
    let mut scorer = CountingScorer {
        calls: 0,
        last_iteration: 0,
    };
    let out = composer
        .compose(
            &target,
            &strokes(),
            &Targets::from_style(target.clone()),
            Stage::Synthesis,
            &mut scorer,
            17,
        )
        .unwrap();
    assert_eq!(scorer.calls, 1);
    assert_eq!(scorer.last_iteration, 17);
    assert!(out.image_grad.data.iter().all(|g| (*g - 1.5).abs() < 1e-15));
    assert_eq!(out.breakdown.guidance, None);
    assert_eq!(out.total, 0.0);
}

#[test]
fn scorer_is_skipped_when_guidance_weight_is_zero() {
    let target = Raster::filled(16, 16, [0.5, 0.5, 0.5]);
    let mut composer = LossComposer::new(LossConfig::default(), 0.0, request());
    let mut scorer = CountingScorer {
        calls: 0,
        last_iteration: 0,
    };
    composer
        .compose(
            &target,
            &strokes(),
            &Targets::from_style(target.clone()),
            Stage::Synthesis,
            &mut scorer,
            0,
        )
        .unwrap();
    assert_eq!(scorer.calls, 0);
}

#[test]
fn target_scorer_loss_enters_total() {
    let rendered = Raster::filled(16, 16, [1.0, 1.0, 1.0]);
    let goal = Raster::filled(16, 16, [0.0, 0.0, 0.0]);
    let config = LossConfig {
        struct_loss_weight: 0.0,
        ..LossConfig::default()
    };
    let mut composer = LossComposer::new(config, 2.0, request());
    let mut scorer = TargetScorer::new(goal.clone());
    let out = composer
        .compose(
            &rendered,
            &strokes(),
            &Targets::from_style(goal),
            Stage::Synthesis,
            &mut scorer,
            0,
        )
        .unwrap();
    assert_eq!(out.breakdown.guidance, Some(1.0));
    assert_eq!(out.total, 1.0);
}

#[test]
fn position_term_requires_prior_and_feeds_param_grad() {
    let target = Raster::filled(16, 16, [0.5, 0.5, 0.5]);
    let targets = Targets::from_style(target.clone());
    let config = LossConfig {
        struct_loss_weight: 0.0,
        pos_loss_weight: 10.0,
        ..LossConfig::default()
    };
    let mut composer = LossComposer::new(config, 0.0, request());
    let mut set = strokes();
    let err = composer
        .compose(&target, &set, &targets, Stage::Synthesis, &mut NullScorer, 0)
        .unwrap_err();
    assert!(matches!(err, PaintError::Config(_)));

    composer.capture_prior(&set);
    set.tensor_mut(ParamGroup::Points)[0] += 4.0;
    let out = composer
        .compose(&target, &set, &targets, Stage::Synthesis, &mut NullScorer, 0)
        .unwrap();
    assert!(out.breakdown.position > 0.0);
    assert!(out.param_grad.points[0] > 0.0);
    assert!(out.image_grad.data.iter().all(|g| *g == 0.0));

    // Not active during imitation unless requested.
    let out = composer
        .compose(&target, &set, &targets, Stage::Imitation, &mut NullScorer, 0)
        .unwrap();
    assert_eq!(out.breakdown.position, 0.0);
}

#[test]
fn non_finite_loss_is_numerical_error() {
    let mut rendered = Raster::filled(16, 16, [0.5, 0.5, 0.5]);
    rendered.data[3] = f64::NAN;
    let mut composer = LossComposer::new(LossConfig::default(), 0.0, request());
    let err = composer
        .compose(
            &rendered,
            &strokes(),
            &Targets::from_style(Raster::filled(16, 16, [0.5, 0.5, 0.5])),
            Stage::Imitation,
            &mut NullScorer,
            4,
        )
        .unwrap_err();
    assert!(err.is_numerical());
}

#[test]
fn config_validation() {
    assert!(LossConfig::default().validate().is_ok());
    let bad = LossConfig {
        pos_loss_weight: -1.0,
        ..LossConfig::default()
    };
    assert!(bad.validate().is_err());
    let bad = LossConfig {
        l2_weight: f64::INFINITY,
        ..LossConfig::default()
    };
    assert!(bad.validate().is_err());
}

#[test]
fn stage_names() {
    assert_eq!(Stage::Imitation.to_string(), "imitation");
    assert_eq!(Stage::Synthesis.to_string(), "synthesis");
}

use super::*;
use crate::loss::position::PosLoss;
use crate::loss::structure::StructLoss;

fn base() -> SessionConfig {
    SessionConfig::new(Canvas::new(64, 48).unwrap())
}

fn rejects(mutate: impl FnOnce(&mut SessionConfig)) {
    let mut c = base();
    mutate(&mut c);
    let err = c.validate().unwrap_err();
    assert!(matches!(err, PaintError::Config(_)), "unexpected error: {err}");
}

#[test]
fn defaults_are_valid() {
    assert!(base().validate().is_ok());
}

#[test]
fn parses_minimal_json() {
    let c = SessionConfig::from_json_str(r#"{ "canvas": { "width": 32, "height": 16 } }"#).unwrap();
    assert_eq!(c.canvas, Canvas::new(32, 16).unwrap());
    assert_eq!(c.strokes.layout.points_per_segment, 3);
    assert_eq!(c.loss.pos_type, PosLoss::Pos);
    assert_eq!(c.loss.struct_loss, StructLoss::Ssim);
    assert!(c.validate().is_ok());
}

#[test]
fn parses_full_json() {
    let json = r#"{
        "canvas": { "width": 128, "height": 128 },
        "seed": 7,
        "strokes": { "num_paths": 500, "num_segments": 2, "points_per_segment": 2, "max_width": 6.0 },
        "optim": { "width": false },
        "imitation": { "num_iter": 100, "lr_schedule": true, "decay_steps": [50, 80], "decay_factor": 0.4 },
        "synthesis": { "num_iter": 200, "color_lr": 0.02 },
        "loss": { "pos_type": "sinkhorn", "pos_loss_weight": 0.5, "struct_loss": "msssim" },
        "guidance": { "prompt": "a harbor", "guidance_scale": 5.0 },
        "save_step": 25
    }"#;
    let c = SessionConfig::from_json_str(json).unwrap();
    c.validate().unwrap();
    assert_eq!(c.strokes.num_paths, 500);
    assert_eq!(c.strokes.layout.num_segments, 2);
    assert!(!c.optim.width && c.optim.points);
    assert_eq!(c.imitation.decay_steps, vec![50, 80]);
    assert_eq!(c.loss.pos_type, PosLoss::Sinkhorn);
    assert_eq!(c.loss.struct_loss, StructLoss::Msssim);
    assert_eq!(c.save_step, Some(25));

    let req = c.guidance_request();
    assert_eq!(req.prompt, "a harbor");
    assert_eq!(req.seed, 7);
    assert_eq!(req.guidance_scale, 5.0);

    let round = SessionConfig::from_json_str(&c.to_json_string().unwrap()).unwrap();
    assert_eq!(round, c);
}

#[test]
fn unknown_loss_names_fail_to_parse() {
    let err = SessionConfig::from_json_str(
        r#"{ "canvas": { "width": 8, "height": 8 }, "loss": { "pos_type": "l1" } }"#,
    )
    .unwrap_err();
    assert!(matches!(err, PaintError::Serde(_)));
    assert!(
        SessionConfig::from_json_str(
            r#"{ "canvas": { "width": 8, "height": 8 }, "loss": { "struct_loss": "lpips" } }"#,
        )
        .is_err()
    );
}

#[test]
fn validation_rejects_each_invalid_setting() {
    rejects(|c| c.strokes.num_paths = 0);
    rejects(|c| c.canvas.width = 0);
    rejects(|c| c.strokes.layout.points_per_segment = 4);
    rejects(|c| c.strokes.layout.num_segments = 0);
    rejects(|c| c.strokes.init_width = 0.0);
    rejects(|c| c.strokes.init_width = c.strokes.max_width + 1.0);
    rejects(|c| c.imitation.lr = -1.0);
    rejects(|c| c.synthesis.width_lr = f64::NAN);
    rejects(|c| c.loss.struct_loss_weight = -0.5);
    rejects(|c| c.guidance.weight = f64::INFINITY);
    rejects(|c| c.synthesis.decay_factor = 1.5);
    rejects(|c| c.imitation.decay_steps = vec![10, 5]);
    rejects(|c| c.render.softness = 0.0);
    rejects(|c| c.save_step = Some(0));
    rejects(|c| c.loss.sinkhorn.epsilon = 0.0);
    rejects(|c| c.loss.sinkhorn.tolerance = f64::NAN);
}

#[test]
fn missing_config_file_reports_path() {
    let err = SessionConfig::from_json_file(Path::new("does/not/exist.json")).unwrap_err();
    assert!(err.to_string().contains("exist.json"));
}

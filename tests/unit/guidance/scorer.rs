use super::*;

fn request() -> GuidanceRequest {
    GuidanceRequest {
        prompt: "a lighthouse at dusk".to_owned(),
        negative_prompt: String::new(),
        style_prompt: None,
        num_inference_steps: 30,
        guidance_scale: 2.0,
        seed: 1,
        iteration: 0,
    }
}

#[test]
fn null_scorer_returns_zero_gradient() {
    let img = Raster::filled(4, 3, [0.3, 0.4, 0.5]);
    let out = NullScorer.score_or_grad(&img, &request()).unwrap();
    assert_eq!((out.grad.width, out.grad.height), (4, 3));
    assert!(out.grad.data.iter().all(|&v| v == 0.0));
    assert!(out.loss.is_none());
    assert!(NullScorer.synthesize_target(&img, &request()).unwrap().is_none());
}

#[test]
fn target_scorer_gradient_points_toward_target() {
    let target = Raster::filled(2, 2, [1.0, 0.0, 0.5]);
    let img = Raster::filled(2, 2, [0.0, 0.0, 0.5]);
    let mut scorer = TargetScorer::new(target.clone());
    let out = scorer.score_or_grad(&img, &request()).unwrap();
    let n = 12.0;
    assert!((out.grad.data[0] - 2.0 * -1.0 / n).abs() < 1e-12);
    assert_eq!(out.grad.data[1], 0.0);
    assert!((out.loss.unwrap() - 2.0 * 0.5 * 4.0 / n).abs() < 1e-12);

    let synthesized = scorer.synthesize_target(&img, &request()).unwrap();
    assert_eq!(synthesized, Some(target));
}

#[test]
fn target_scorer_rejects_size_mismatch() {
    let mut scorer = TargetScorer::new(Raster::zeros(2, 2));
    let err = scorer
        .score_or_grad(&Raster::zeros(3, 2), &request())
        .unwrap_err();
    assert!(err.to_string().contains("guidance error"));
}

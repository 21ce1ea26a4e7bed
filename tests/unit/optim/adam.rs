use super::*;

#[test]
fn first_step_moves_by_learning_rate() {
    let mut adam = Adam::new(2);
    let mut p = vec![1.0, -1.0];
    adam.step(&mut p, &[3.0, -0.5], 0.1, |_| true).unwrap();
    // Bias-corrected first step is lr * sign(g) up to eps.
    assert!((p[0] - 0.9).abs() < 1e-6);
    assert!((p[1] + 0.9).abs() < 1e-6);
    assert_eq!(adam.step_count(), 1);
}

#[test]
fn inactive_entries_are_untouched() {
    let mut adam = Adam::new(4);
    let mut p = vec![0.25, 0.5, 0.75, 1.0];
    for _ in 0..5 {
        adam.step(&mut p, &[1.0, 1.0, 1.0, 1.0], 0.01, |i| i % 4 != 3)
            .unwrap();
    }
    assert_eq!(p[3].to_bits(), 1.0f64.to_bits());
    assert!(p[0] < 0.25);
}

#[test]
fn zero_gradient_keeps_parameters() {
    let mut adam = Adam::new(3);
    let mut p = vec![0.1, 0.2, 0.3];
    adam.step(&mut p, &[0.0; 3], 0.5, |_| true).unwrap();
    assert_eq!(p, vec![0.1, 0.2, 0.3]);
}

#[test]
fn converges_on_quadratic() {
    let mut adam = Adam::new(1);
    let mut p = vec![5.0];
    for _ in 0..2000 {
        let g = [2.0 * (p[0] - 2.0)];
        adam.step(&mut p, &g, 0.05, |_| true).unwrap();
    }
    assert!((p[0] - 2.0).abs() < 1e-2);
}

#[test]
fn rejects_bad_inputs() {
    let mut adam = Adam::new(2);
    let mut p = vec![0.0; 2];
    assert!(adam.step(&mut p, &[0.0; 3], 0.1, |_| true).is_err());
    assert!(adam.step(&mut p, &[0.0; 2], f64::NAN, |_| true).is_err());
    assert!(adam.step(&mut p, &[0.0; 2], -1.0, |_| true).is_err());
    let mut bad = Adam::new(2).betas(1.0, 0.5);
    assert!(bad.step(&mut p, &[0.0; 2], 0.1, |_| true).is_err());
    let mut bad = Adam::new(2).eps(0.0);
    assert!(bad.step(&mut p, &[0.0; 2], 0.1, |_| true).is_err());
}

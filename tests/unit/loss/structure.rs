use super::*;
use crate::foundation::core::Rng64;

fn noise(width: u32, height: u32, seed: u64) -> Raster {
    let mut rng = Rng64::new(seed);
    let mut r = Raster::zeros(width, height);
    for v in &mut r.data {
        *v = rng.range_f64(0.1, 0.9);
    }
    r
}

fn check_gradient(f: impl Fn(&Raster) -> (f64, Raster), x: &Raster) {
    let (_, grad) = f(x);
    let h = 1e-6;
    for idx in [0, 7, 40, x.data.len() / 2 + 1, x.data.len() - 1] {
        let mut plus = x.clone();
        plus.data[idx] += h;
        let mut minus = x.clone();
        minus.data[idx] -= h;
        let fd = (f(&plus).0 - f(&minus).0) / (2.0 * h);
        let an = grad.data[idx];
        assert!(
            (fd - an).abs() <= 1e-6 + 1e-4 * fd.abs().max(an.abs()),
            "idx {idx}: finite difference {fd} vs analytic {an}"
        );
    }
}

#[test]
fn parses_names() {
    assert_eq!("ssim".parse::<StructLoss>().unwrap(), StructLoss::Ssim);
    assert_eq!("msssim".parse::<StructLoss>().unwrap(), StructLoss::Msssim);
    let err = "psnr".parse::<StructLoss>().unwrap_err();
    assert!(err.to_string().contains("psnr"));
    let parsed: StructLoss = serde_json::from_str("\"msssim\"").unwrap();
    assert_eq!(parsed, StructLoss::Msssim);
}

#[test]
fn identical_images_score_one() {
    let x = noise(12, 12, 3);
    let (v, g) = ssim(&x, &x).unwrap();
    assert!((v - 1.0).abs() < 1e-12);
    assert!(g.data.iter().all(|g| g.abs() < 1e-12));

    let y = noise(24, 24, 4);
    let (v, g) = ms_ssim(&y, &y).unwrap();
    assert!((v - 1.0).abs() < 1e-12);
    assert!(g.data.iter().all(|g| g.abs() < 1e-12));
}

#[test]
fn different_images_score_below_one() {
    let (v, _) = ssim(&noise(12, 12, 1), &noise(12, 12, 2)).unwrap();
    assert!(v < 0.9);
    let (loss, _) = StructLoss::Ssim.loss(&noise(12, 12, 1), &noise(12, 12, 2)).unwrap();
    assert!((loss - (1.0 - v)).abs() < 1e-15);
}

#[test]
fn ssim_gradient_matches_finite_differences() {
    let y = noise(12, 12, 11);
    let x = noise(12, 12, 12);
    check_gradient(|r| ssim(r, &y).unwrap(), &x);
}

#[test]
fn ms_ssim_gradient_matches_finite_differences() {
    let y = noise(24, 24, 21);
    // Correlated input keeps every contrast-structure factor above the floor.
    let mut x = y.clone();
    let n = noise(24, 24, 22);
    for (a, b) in x.data.iter_mut().zip(&n.data) {
        *a = 0.7 * *a + 0.3 * b;
    }
    check_gradient(|r| ms_ssim(r, &y).unwrap(), &x);
}

#[test]
fn loss_gradient_is_negated_similarity_gradient() {
    let y = noise(12, 12, 31);
    let x = noise(12, 12, 32);
    let (_, g) = ssim(&x, &y).unwrap();
    let (_, lg) = StructLoss::Ssim.loss(&x, &y).unwrap();
    for (a, b) in g.data.iter().zip(&lg.data) {
        assert_eq!(*a, -*b);
    }
}

#[test]
fn small_images_shrink_the_window() {
    let x = noise(5, 4, 1);
    let (v, g) = ssim(&x, &x).unwrap();
    assert!((v - 1.0).abs() < 1e-12);
    assert_eq!(g.data.len(), x.data.len());
    assert_eq!(ms_levels(10), 1);
    assert_eq!(ms_levels(22), 2);
    assert_eq!(ms_levels(512), 5);
}

#[test]
fn size_mismatch_fails() {
    assert!(ssim(&Raster::zeros(4, 4), &Raster::zeros(4, 5)).is_err());
    assert!(ms_ssim(&Raster::zeros(4, 4), &Raster::zeros(5, 4)).is_err());
}

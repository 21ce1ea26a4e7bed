use super::*;

#[test]
fn identical_uniform_images_have_zero_loss() {
    let c = [0.2, 0.6, 0.9];
    let (loss, grad) = mse(&Raster::filled(5, 5, c), &Raster::filled(5, 5, c)).unwrap();
    assert_eq!(loss, 0.0);
    assert!(grad.data.iter().all(|&g| g == 0.0));
}

#[test]
fn value_and_gradient() {
    let a = Raster::filled(1, 1, [1.0, 0.0, 0.0]);
    let b = Raster::filled(1, 1, [0.0, 0.0, 0.0]);
    let (loss, grad) = mse(&a, &b).unwrap();
    assert!((loss - 1.0 / 3.0).abs() < 1e-15);
    assert!((grad.data[0] - 2.0 / 3.0).abs() < 1e-15);
    assert_eq!(grad.data[1], 0.0);
}

#[test]
fn size_mismatch_fails() {
    assert!(mse(&Raster::zeros(2, 2), &Raster::zeros(1, 2)).is_err());
}

use std::io::Cursor;

use super::*;

#[test]
fn filled_and_pixel_access() {
    let mut r = Raster::filled(3, 2, [0.25, 0.5, 1.0]);
    assert_eq!(r.data.len(), 18);
    assert_eq!(r.pixel(2, 1), [0.25, 0.5, 1.0]);
    r.set_pixel(1, 0, [0.0, 0.0, 0.0]);
    assert_eq!(r.pixel(1, 0), [0.0; 3]);
    assert_eq!(r.pixel(0, 0), [0.25, 0.5, 1.0]);
}

#[test]
fn size_mismatch_is_an_error() {
    let a = Raster::zeros(2, 2);
    let b = Raster::zeros(2, 3);
    assert!(a.check_same_size(&b).is_err());
    let mut c = Raster::zeros(2, 2);
    assert!(c.add_scaled(&b, 1.0).is_err());
    c.add_scaled(&Raster::filled(2, 2, [1.0; 3]), 0.5).unwrap();
    assert!(c.data.iter().all(|&v| v == 0.5));
}

#[test]
fn rgb8_conversion_quantizes_and_clamps() {
    let r = Raster::filled(1, 1, [1.2, 0.5, -0.1]);
    let img = r.to_rgb8();
    assert_eq!(img.get_pixel(0, 0).0, [255, 128, 0]);
    let back = Raster::from_rgb8(&img);
    assert_eq!(back.pixel(0, 0)[0], 1.0);
}

#[test]
fn decode_resizes_to_canvas() {
    let img = image::RgbImage::from_pixel(8, 4, image::Rgb([255, 0, 0]));
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();

    let r = Raster::decode(&buf, Canvas::new(4, 4).unwrap()).unwrap();
    assert_eq!((r.width, r.height), (4, 4));
    let px = r.pixel(1, 1);
    assert!((px[0] - 1.0).abs() < 1e-9);
    assert!(px[1].abs() < 1e-9);

    assert!(Raster::decode(b"not an image", Canvas::new(4, 4).unwrap()).is_err());
}

#[test]
fn save_png_writes_file() {
    let dir = std::path::PathBuf::from("target").join("raster_unit");
    let path = dir.join("solid.png");
    let _ = std::fs::remove_file(&path);
    Raster::filled(4, 4, [0.0, 1.0, 0.0]).save_png(&path).unwrap();
    let loaded = Raster::load(&path, Canvas::new(4, 4).unwrap()).unwrap();
    assert_eq!(loaded.pixel(3, 3), [0.0, 1.0, 0.0]);
}

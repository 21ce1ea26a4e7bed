use super::*;
use crate::{
    foundation::core::{Canvas, Rgba},
    stroke::model::{Stroke, StrokeLayout},
    stroke::params::ParamGroup,
};

fn line_scene() -> StrokeSet {
    let layout = StrokeLayout {
        num_segments: 1,
        points_per_segment: 1,
    };
    let strokes = vec![
        Stroke {
            points: vec![Point::new(3.1, 4.2), Point::new(15.3, 12.7)],
            width: 3.0,
            color: Rgba::new(0.9, 0.2, 0.1, 0.8),
        },
        Stroke {
            points: vec![Point::new(4.3, 15.4), Point::new(16.2, 5.1)],
            width: 2.5,
            color: Rgba::new(0.1, 0.3, 0.9, 0.6),
        },
    ];
    StrokeSet::new(layout, Canvas::new(20, 20).unwrap(), strokes).unwrap()
}

fn weights(n: usize) -> Raster {
    let mut g = Raster::zeros(20, 20);
    for k in 0..n {
        g.data[k] = ((k as f64) * 0.37).sin();
    }
    g
}

fn weighted_sum(r: &Raster, g: &Raster) -> f64 {
    r.data.iter().zip(&g.data).map(|(a, b)| a * b).sum()
}

fn rasterizer() -> SoftRasterizer {
    SoftRasterizer::new(RenderSettings::default()).unwrap()
}

#[test]
fn rejects_bad_settings() {
    let mut s = RenderSettings::default();
    s.softness = 0.0;
    assert!(SoftRasterizer::new(s).is_err());
    let mut s = RenderSettings::default();
    s.background = [1.5, 0.0, 0.0];
    assert!(SoftRasterizer::new(s).is_err());
}

#[test]
fn empty_set_renders_background() {
    let set = StrokeSet::new(StrokeLayout::default(), Canvas::new(7, 5).unwrap(), vec![]).unwrap();
    let r = rasterizer().render(&set).unwrap();
    assert_eq!((r.width, r.height), (7, 5));
    assert!(r.data.iter().all(|&v| v == 1.0));
}

#[test]
fn opaque_stroke_covers_its_center() {
    let s = Stroke {
        points: vec![
            Point::new(2.0, 10.0),
            Point::new(8.0, 10.0),
            Point::new(12.0, 10.0),
            Point::new(18.0, 10.0),
        ],
        width: 6.0,
        color: Rgba::new(0.0, 0.0, 1.0, 1.0),
    };
    let set = StrokeSet::new(StrokeLayout::default(), Canvas::new(20, 20).unwrap(), vec![s]).unwrap();
    let r = rasterizer().render(&set).unwrap();
    let center = r.pixel(10, 9);
    assert!(center[0] < 0.01, "{center:?}");
    assert!(center[2] > 0.99);
    let far = r.pixel(10, 0);
    assert_eq!(far, [1.0, 1.0, 1.0]);
}

#[test]
fn later_strokes_paint_on_top() {
    let mk = |color: Rgba| Stroke {
        points: vec![Point::new(0.0, 4.0), Point::new(8.0, 4.0)],
        width: 6.0,
        color,
    };
    let layout = StrokeLayout {
        num_segments: 1,
        points_per_segment: 1,
    };
    let set = StrokeSet::new(
        layout,
        Canvas::new(8, 8).unwrap(),
        vec![mk(Rgba::new(1.0, 0.0, 0.0, 1.0)), mk(Rgba::new(0.0, 1.0, 0.0, 1.0))],
    )
    .unwrap();
    let px = rasterizer().render(&set).unwrap().pixel(4, 3);
    assert!(px[1] > 0.99 && px[0] < 0.01, "{px:?}");
}

#[test]
fn rendering_is_deterministic() {
    let set = line_scene();
    let a = rasterizer().render(&set).unwrap();
    let b = rasterizer().render(&set).unwrap();
    assert_eq!(a, b);
    let g = weights(20 * 20 * 3);
    let ga = rasterizer().backward(&set, &g).unwrap();
    let gb = rasterizer().backward(&set, &g).unwrap();
    assert_eq!(ga, gb);
}

fn assert_backward_matches_finite_differences(set: &StrokeSet) {
    let g = weights(20 * 20 * 3);
    let mut r = rasterizer();
    let analytic = r.backward(set, &g).unwrap();

    let h = 1e-5;
    for group in ParamGroup::ALL {
        for k in 0..set.tensor(group).len() {
            let mut plus = set.clone();
            plus.tensor_mut(group)[k] += h;
            let mut minus = set.clone();
            minus.tensor_mut(group)[k] -= h;
            let fd = (weighted_sum(&r.render(&plus).unwrap(), &g)
                - weighted_sum(&r.render(&minus).unwrap(), &g))
                / (2.0 * h);
            let an = analytic.tensor(group)[k];
            assert!(
                (fd - an).abs() <= 1e-4 + 1e-3 * fd.abs(),
                "{group}[{k}]: fd {fd} analytic {an}"
            );
        }
    }
}

#[test]
fn backward_matches_finite_differences() {
    assert_backward_matches_finite_differences(&line_scene());
}

#[test]
fn thin_stroke_gradients_include_the_fade() {
    let mut set = line_scene();
    // Below the default softness of 0.5.
    set.tensor_mut(ParamGroup::Width)[0] = 0.3;
    set.tensor_mut(ParamGroup::Width)[1] = 0.2;
    assert_backward_matches_finite_differences(&set);
}

#[test]
fn zero_width_stroke_is_invisible() {
    let mut set = line_scene();
    set.tensor_mut(ParamGroup::Width)[0] = 0.0;
    set.tensor_mut(ParamGroup::Width)[1] = 0.0;
    let r = rasterizer().render(&set).unwrap();
    assert!(r.data.iter().all(|&v| v == 1.0));

    // Still recoverable: the fade pushes width back up where the stroke helps.
    let g = weights(20 * 20 * 3);
    let grads = rasterizer().backward(&set, &g).unwrap();
    assert!(grads.widths.iter().any(|w| *w != 0.0));
}

#[test]
fn backward_rejects_mismatched_gradient() {
    let set = line_scene();
    assert!(rasterizer().backward(&set, &Raster::zeros(3, 3)).is_err());
}

use super::*;
use crate::{
    foundation::core::{Canvas, Point, Rgba},
    stroke::model::{Stroke, StrokeLayout},
};

fn one_stroke() -> StrokeSet {
    let s = Stroke {
        points: vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(2.0, 1.0),
            Point::new(3.0, 3.0),
        ],
        width: 1.0,
        color: Rgba::WHITE,
    };
    StrokeSet::new(StrokeLayout::default(), Canvas::new(4, 4).unwrap(), vec![s]).unwrap()
}

#[test]
fn zeros_like_matches_shape() {
    let set = one_stroke();
    let g = StrokeGrads::zeros_like(&set);
    assert_eq!(g.points.len(), 8);
    assert_eq!(g.colors.len(), 4);
    assert_eq!(g.widths.len(), 1);
    g.check_shape(&set).unwrap();
}

#[test]
fn check_shape_reports_group() {
    let set = one_stroke();
    let mut g = StrokeGrads::zeros_like(&set);
    g.widths.push(0.0);
    let err = g.check_shape(&set).unwrap_err();
    assert!(err.to_string().contains("width"));
}

#[test]
fn add_scaled_accumulates() {
    let set = one_stroke();
    let mut a = StrokeGrads::zeros_like(&set);
    let mut b = StrokeGrads::zeros_like(&set);
    b.points[3] = 2.0;
    b.widths[0] = -1.0;
    a.add_scaled(&b, 0.5);
    a.add_scaled(&b, 0.5);
    assert_eq!(a.points[3], 2.0);
    assert_eq!(a.widths[0], -1.0);
    assert!(a.is_finite());
    a.colors[0] = f64::INFINITY;
    assert!(!a.is_finite());
}

#[test]
fn group_names_are_stable() {
    let names: Vec<String> = ParamGroup::ALL.iter().map(|g| g.to_string()).collect();
    assert_eq!(names, ["points", "color", "width"]);
}

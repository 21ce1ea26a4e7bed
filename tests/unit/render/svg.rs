use super::*;
use crate::{
    foundation::core::{Canvas, Point, Rgba},
    stroke::model::{Stroke, StrokeLayout},
};

fn set() -> StrokeSet {
    let mk = |y: f64, color: Rgba| Stroke {
        points: vec![
            Point::new(2.0, y),
            Point::new(8.0, y),
            Point::new(14.0, y),
            Point::new(30.0, y),
        ],
        width: 4.0,
        color,
    };
    StrokeSet::new(
        StrokeLayout::default(),
        Canvas::new(32, 24).unwrap(),
        vec![
            mk(6.0, Rgba::new(1.0, 0.0, 0.0, 1.0)),
            mk(16.0, Rgba::new(0.0, 0.0, 1.0, 0.5)),
        ],
    )
    .unwrap()
}

fn count_paths(group: &usvg::Group) -> usize {
    let mut n = 0usize;
    for child in group.children() {
        match child {
            usvg::Node::Group(g) => n += count_paths(g.as_ref()),
            usvg::Node::Path(_) => n += 1,
            _ => {}
        }
    }
    n
}

#[test]
fn stroke_path_uses_layout_degree() {
    let s = set();
    let svg = stroke_path(&s, 0).to_svg();
    assert!(svg.starts_with('M'), "{svg}");
    assert!(svg.contains('C'), "{svg}");
    assert!(!svg.contains('Q'), "{svg}");
}

#[test]
fn export_parses_with_one_path_per_stroke() {
    let s = set();
    let text = to_svg_string(&s, SvgOptions::default());
    assert!(text.contains(r#"width="32" height="24""#));
    assert!(text.contains("rgb(255,0,0)"));
    assert!(text.contains(r#"stroke-opacity="0.500000""#));
    let tree = parse_svg(text.as_bytes()).unwrap();
    assert_eq!(count_paths(tree.root()), 2);
}

#[test]
fn background_rect_is_optional() {
    let s = set();
    let with_bg = to_svg_string(
        &s,
        SvgOptions {
            background: Some([1.0, 1.0, 1.0]),
        },
    );
    assert!(with_bg.contains("<rect"));
    assert!(!to_svg_string(&s, SvgOptions::default()).contains("<rect"));
}

#[test]
fn rasterized_export_shows_strokes() {
    let s = set();
    let text = to_svg_string(&s, SvgOptions::default());
    let r = rasterize_svg(text.as_bytes()).unwrap();
    assert_eq!((r.width, r.height), (32, 24));
    let red = r.pixel(16, 6);
    assert!(red[0] > 0.9 && red[1] < 0.1, "{red:?}");
    let empty = r.pixel(16, 22);
    assert!(empty.iter().all(|v| (v - 1.0).abs() < 1e-9), "{empty:?}");
}

#[test]
fn write_svg_creates_file() {
    let path = std::path::PathBuf::from("target")
        .join("svg_unit")
        .join("out.svg");
    let _ = std::fs::remove_file(&path);
    write_svg(&path, &set(), SvgOptions::default()).unwrap();
    let bytes = std::fs::read(&path).unwrap();
    parse_svg(&bytes).unwrap();
    assert!(parse_svg(b"<svg").is_err());
}

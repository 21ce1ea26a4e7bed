use std::fmt::Write as _;
use std::path::Path;

use anyhow::Context;
use kurbo::BezPath;

use crate::{
    foundation::error::{PaintError, PaintResult},
    render::raster::{CHANNELS, Raster},
    stroke::model::StrokeSet,
};

/// SVG export options.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SvgOptions {
    /// Emit a full-canvas background rectangle under the strokes.
    pub background: Option<[f64; 3]>,
}

/// The curve of stroke `i` as a kurbo path.
pub fn stroke_path(strokes: &StrokeSet, i: usize) -> BezPath {
    let pts = strokes.control_points(i);
    let degree = strokes.layout().degree();
    let mut path = BezPath::new();
    path.move_to(pts[0]);
    for seg in pts[1..].chunks_exact(degree) {
        match seg {
            [p1] => path.line_to(*p1),
            [p1, p2] => path.quad_to(*p1, *p2),
            [p1, p2, p3] => path.curve_to(*p1, *p2, *p3),
            _ => {}
        }
    }
    path
}

fn rgb_attr(c: [f64; 3]) -> String {
    let q = |v: f64| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    format!("rgb({},{},{})", q(c[0]), q(c[1]), q(c[2]))
}

/// Serialize strokes as an SVG document, one `<path>` per stroke in paint order.
pub fn to_svg_string(strokes: &StrokeSet, opts: SvgOptions) -> String {
    let canvas = strokes.canvas();
    let mut out = String::new();
    let _ = writeln!(
        out,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = canvas.width,
        h = canvas.height
    );
    if let Some(bg) = opts.background {
        let _ = writeln!(
            out,
            r#"  <rect x="0" y="0" width="{}" height="{}" fill="{}"/>"#,
            canvas.width,
            canvas.height,
            rgb_attr(bg)
        );
    }
    for i in 0..strokes.len() {
        let c = strokes.color(i);
        let _ = writeln!(
            out,
            r#"  <path d="{}" fill="none" stroke="{}" stroke-opacity="{:.6}" stroke-width="{:.6}" stroke-linecap="round" stroke-linejoin="round"/>"#,
            stroke_path(strokes, i).to_svg(),
            rgb_attr([c.r, c.g, c.b]),
            c.a.clamp(0.0, 1.0),
            strokes.width(i).max(0.0)
        );
    }
    out.push_str("</svg>\n");
    out
}

/// Write strokes to an SVG file, creating parent directories.
pub fn write_svg(path: &Path, strokes: &StrokeSet, opts: SvgOptions) -> PaintResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    std::fs::write(path, to_svg_string(strokes, opts))
        .with_context(|| format!("write svg '{}'", path.display()))?;
    Ok(())
}

/// Parse SVG bytes into a `usvg` tree.
pub fn parse_svg(bytes: &[u8]) -> PaintResult<usvg::Tree> {
    let opts = usvg::Options::default();
    let tree = usvg::Tree::from_data(bytes, &opts).context("parse svg tree")?;
    Ok(tree)
}

/// Rasterize an SVG document at its intrinsic size, composited over white.
pub fn rasterize_svg(bytes: &[u8]) -> PaintResult<Raster> {
    let tree = parse_svg(bytes)?;
    let size = tree.size();
    let width = (size.width().ceil() as u32).max(1);
    let height = (size.height().ceil() as u32).max(1);
    let mut pixmap = resvg::tiny_skia::Pixmap::new(width, height)
        .ok_or_else(|| PaintError::render("failed to allocate svg pixmap"))?;
    resvg::render(
        &tree,
        resvg::tiny_skia::Transform::identity(),
        &mut pixmap.as_mut(),
    );

    let mut out = Raster::zeros(width, height);
    for (dst, px) in out
        .data
        .chunks_exact_mut(CHANNELS)
        .zip(pixmap.data().chunks_exact(4))
    {
        let a = f64::from(px[3]) / 255.0;
        for ch in 0..CHANNELS {
            dst[ch] = f64::from(px[ch]) / 255.0 + (1.0 - a);
        }
    }
    Ok(out)
}

#[cfg(test)]
#[path = "../../tests/unit/render/svg.rs"]
mod tests;

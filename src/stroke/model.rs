use kurbo::{CubicBez, Line, ParamCurve, ParamCurveNearest, QuadBez};

use crate::{
    foundation::core::{Canvas, Point, Rect, Rgba},
    foundation::error::{PaintError, PaintResult},
    stroke::params::ParamGroup,
};

/// Shape of every stroke in a set: number of Bezier segments and control points per segment.
///
/// Consecutive segments share their end point, so a stroke carries
/// `num_segments * points_per_segment + 1` control points.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StrokeLayout {
    /// Bezier segments per stroke.
    pub num_segments: usize,
    /// New control points per segment: 1 = line, 2 = quadratic, 3 = cubic.
    #[serde(default = "default_points_per_segment")]
    pub points_per_segment: usize,
}

fn default_points_per_segment() -> usize {
    3
}

impl Default for StrokeLayout {
    fn default() -> Self {
        Self {
            num_segments: 1,
            points_per_segment: default_points_per_segment(),
        }
    }
}

impl StrokeLayout {
    pub fn validate(self) -> PaintResult<()> {
        if self.num_segments == 0 {
            return Err(PaintError::config("num_segments must be > 0"));
        }
        if !(1..=3).contains(&self.points_per_segment) {
            return Err(PaintError::config(
                "points_per_segment must be 1 (line), 2 (quadratic) or 3 (cubic)",
            ));
        }
        Ok(())
    }

    /// Control points carried by one stroke.
    pub fn points_per_stroke(self) -> usize {
        self.num_segments * self.points_per_segment + 1
    }

    /// Bezier degree of each segment.
    pub fn degree(self) -> usize {
        self.points_per_segment
    }
}

/// A single brushstroke.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Stroke {
    /// Control points in pixel space.
    pub points: Vec<Point>,
    /// Stroke width in pixels.
    pub width: f64,
    /// Straight-alpha stroke color.
    pub color: Rgba,
}

/// One Bezier segment of a stroke, in pixel space.
#[derive(Clone, Copy, Debug)]
pub enum CurveSegment {
    Line(Line),
    Quad(QuadBez),
    Cubic(CubicBez),
}

impl CurveSegment {
    /// Squared distance from `p` to the curve and the parameter where it is reached.
    pub fn nearest(&self, p: Point) -> (f64, f64) {
        const ACCURACY: f64 = 1e-6;
        let n = match self {
            Self::Line(c) => c.nearest(p, ACCURACY),
            Self::Quad(c) => c.nearest(p, ACCURACY),
            Self::Cubic(c) => c.nearest(p, ACCURACY),
        };
        (n.distance_sq, n.t)
    }

    pub fn eval(&self, t: f64) -> Point {
        match self {
            Self::Line(c) => c.eval(t),
            Self::Quad(c) => c.eval(t),
            Self::Cubic(c) => c.eval(t),
        }
    }
}

/// The ordered, exclusively owned set of strokes being optimized.
///
/// Parameters live in three flat tensors, one per [`ParamGroup`]:
///
/// - points: `x, y` per control point, strokes contiguous
/// - widths: one value per stroke
/// - colors: `r, g, b, a` per stroke
///
/// Insertion order is paint order: later strokes are composited on top.
#[derive(Clone, Debug, PartialEq)]
pub struct StrokeSet {
    layout: StrokeLayout,
    canvas: Canvas,
    points: Vec<f64>,
    widths: Vec<f64>,
    colors: Vec<f64>,
}

impl StrokeSet {
    /// Build a set from owned strokes, checking every stroke matches `layout`.
    pub fn new(layout: StrokeLayout, canvas: Canvas, strokes: Vec<Stroke>) -> PaintResult<Self> {
        layout.validate()?;
        canvas.validate()?;
        let per = layout.points_per_stroke();
        let mut points = Vec::with_capacity(strokes.len() * per * 2);
        let mut widths = Vec::with_capacity(strokes.len());
        let mut colors = Vec::with_capacity(strokes.len() * 4);
        for (i, s) in strokes.into_iter().enumerate() {
            if s.points.len() != per {
                return Err(PaintError::config(format!(
                    "stroke {i} has {} control points, layout requires {per}",
                    s.points.len()
                )));
            }
            for p in &s.points {
                points.push(p.x);
                points.push(p.y);
            }
            widths.push(s.width);
            colors.extend_from_slice(&s.color.to_array());
        }
        Ok(Self {
            layout,
            canvas,
            points,
            widths,
            colors,
        })
    }

    pub fn layout(&self) -> StrokeLayout {
        self.layout
    }

    pub fn canvas(&self) -> Canvas {
        self.canvas
    }

    /// Number of strokes.
    pub fn len(&self) -> usize {
        self.widths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.widths.is_empty()
    }

    /// Flat parameter tensor of `group`.
    pub fn tensor(&self, group: ParamGroup) -> &[f64] {
        match group {
            ParamGroup::Points => &self.points,
            ParamGroup::Color => &self.colors,
            ParamGroup::Width => &self.widths,
        }
    }

    /// Mutable flat parameter tensor of `group`.
    pub fn tensor_mut(&mut self, group: ParamGroup) -> &mut [f64] {
        match group {
            ParamGroup::Points => &mut self.points,
            ParamGroup::Color => &mut self.colors,
            ParamGroup::Width => &mut self.widths,
        }
    }

    /// Raw `x, y` pairs of stroke `i`.
    pub fn control_coords(&self, i: usize) -> &[f64] {
        let n = self.layout.points_per_stroke() * 2;
        &self.points[i * n..(i + 1) * n]
    }

    pub fn control_points(&self, i: usize) -> Vec<Point> {
        self.control_coords(i)
            .chunks_exact(2)
            .map(|c| Point::new(c[0], c[1]))
            .collect()
    }

    pub fn width(&self, i: usize) -> f64 {
        self.widths[i]
    }

    pub fn color(&self, i: usize) -> Rgba {
        let c = &self.colors[i * 4..i * 4 + 4];
        Rgba::new(c[0], c[1], c[2], c[3])
    }

    /// Owned copy of stroke `i`.
    pub fn stroke(&self, i: usize) -> Stroke {
        Stroke {
            points: self.control_points(i),
            width: self.width(i),
            color: self.color(i),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Stroke> + '_ {
        (0..self.len()).map(|i| self.stroke(i))
    }

    /// Segment `s` of stroke `i`.
    pub fn segment(&self, i: usize, s: usize) -> CurveSegment {
        let coords = self.control_coords(i);
        let d = self.layout.degree();
        let p = |k: usize| {
            let j = (s * d + k) * 2;
            Point::new(coords[j], coords[j + 1])
        };
        match d {
            1 => CurveSegment::Line(Line::new(p(0), p(1))),
            2 => CurveSegment::Quad(QuadBez::new(p(0), p(1), p(2))),
            _ => CurveSegment::Cubic(CubicBez::new(p(0), p(1), p(2), p(3))),
        }
    }

    /// Bounding box of the control polygon of stroke `i`, which contains the curve.
    pub fn control_bounds(&self, i: usize) -> Rect {
        let mut it = self.control_coords(i).chunks_exact(2);
        let Some(first) = it.next() else {
            return Rect::ZERO;
        };
        let mut r = Rect::new(first[0], first[1], first[0], first[1]);
        for c in it {
            r = r.union_pt(Point::new(c[0], c[1]));
        }
        r
    }

    /// Mean of the control points of stroke `i`.
    pub fn centroid(&self, i: usize) -> Point {
        let coords = self.control_coords(i);
        let n = (coords.len() / 2) as f64;
        let (sx, sy) = coords
            .chunks_exact(2)
            .fold((0.0, 0.0), |(x, y), c| (x + c[0], y + c[1]));
        Point::new(sx / n, sy / n)
    }

    /// Return `true` when every parameter is finite.
    pub fn is_finite(&self) -> bool {
        self.points
            .iter()
            .chain(&self.widths)
            .chain(&self.colors)
            .all(|v| v.is_finite())
    }

    /// Project widths into `[0, max_width]` and colors into `[0, 1]`.
    ///
    /// Values already inside their range are left bit-identical.
    pub fn clamp_in_place(&mut self, max_width: f64) {
        for w in &mut self.widths {
            *w = w.clamp(0.0, max_width);
        }
        for c in &mut self.colors {
            *c = c.clamp(0.0, 1.0);
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/stroke/model.rs"]
mod tests;

use rayon::prelude::*;

use crate::{
    foundation::core::{Point, Rect},
    foundation::error::{PaintError, PaintResult},
    foundation::math::{bernstein, sigmoid},
    render::backend::{RenderSettings, StrokeRenderer},
    render::raster::{CHANNELS, Raster},
    stroke::model::StrokeSet,
    stroke::params::StrokeGrads,
};

/// Tile edge in pixels used for binning strokes; also the row band processed per rayon task.
const TILE: u32 = 16;

/// Coverage is exactly zero once `(w/2 - d) / softness` drops below `-CUTOFF_Z`.
const CUTOFF_Z: f64 = 8.0;

/// CPU rasterizer with analytic reverse-mode gradients.
///
/// Each stroke is a thick Bezier chain whose coverage at a pixel center is a logistic falloff of
/// the distance to the curve:
///
/// ```text
/// z    = (width / 2 - dist) / softness
/// cov  = (sigmoid(z) - sigmoid(-CUTOFF_Z)) / (1 - sigmoid(-CUTOFF_Z)),  clamped at 0
/// cov *= min(width / softness, 1)
/// ```
///
/// The last factor fades strokes thinner than `softness` out, so a stroke clamped to width 0
/// leaves no trace.
///
/// Strokes are composited with straight-alpha "over" in paint order onto an opaque background.
/// The gradient of `dist` with respect to the control points uses the closest curve parameter
/// held fixed (the minimum is attained there, so its own derivative does not contribute).
///
/// Work is split into row bands of [`TILE`] pixels. Backward passes accumulate one gradient
/// buffer per band and reduce them in band order, so results do not depend on thread count.
#[derive(Clone, Debug)]
pub struct SoftRasterizer {
    settings: RenderSettings,
    floor: f64,
}

impl SoftRasterizer {
    pub fn new(settings: RenderSettings) -> PaintResult<Self> {
        if !settings.softness.is_finite() || settings.softness <= 0.0 {
            return Err(PaintError::config("render softness must be finite and > 0"));
        }
        if settings
            .background
            .iter()
            .any(|c| !c.is_finite() || !(0.0..=1.0).contains(c))
        {
            return Err(PaintError::config("render background channels must be in [0, 1]"));
        }
        Ok(Self {
            settings,
            floor: sigmoid(-CUTOFF_Z),
        })
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    fn hit(&self, scene: &Scene<'_>, i: usize, p: Point) -> Option<Hit> {
        if !scene.rects[i].contains(p) {
            return None;
        }
        let strokes = scene.strokes;
        let mut best = (f64::INFINITY, 0usize, 0.0f64);
        for s in 0..strokes.layout().num_segments {
            let (d2, t) = strokes.segment(i, s).nearest(p);
            if d2 < best.0 {
                best = (d2, s, t);
            }
        }
        let dist = best.0.sqrt();
        let z = (0.5 * strokes.width(i) - dist) / self.settings.softness;
        if z.is_nan() || z <= -CUTOFF_Z {
            return None;
        }
        let sig = sigmoid(z);
        let norm = 1.0 - self.floor;
        let base = (sig - self.floor) / norm;
        let ramp = strokes.width(i) / self.settings.softness;
        let (fade, dfade_dw) = if ramp >= 1.0 {
            (1.0, 0.0)
        } else {
            (ramp.max(0.0), 1.0 / self.settings.softness)
        };
        Some(Hit {
            stroke: i,
            cov: base * fade,
            dcov_dz: sig * (1.0 - sig) / norm * fade,
            dcov_dw: base * dfade_dw,
            dist,
            seg: best.1,
            t: best.2,
        })
    }

    /// Composite pixel `p`, recording every contributing stroke with the color beneath it.
    fn composite(
        &self,
        scene: &Scene<'_>,
        candidates: &[u32],
        p: Point,
        hits: &mut Vec<(Hit, [f64; CHANNELS])>,
    ) -> [f64; CHANNELS] {
        hits.clear();
        let mut c = self.settings.background;
        for &i in candidates {
            let Some(h) = self.hit(scene, i as usize, p) else {
                continue;
            };
            hits.push((h, c));
            let col = scene.strokes.color(h.stroke);
            let a = col.a * h.cov;
            let rgb = [col.r, col.g, col.b];
            for ch in 0..CHANNELS {
                c[ch] = c[ch] * (1.0 - a) + rgb[ch] * a;
            }
        }
        c
    }

    fn check_canvas(strokes: &StrokeSet) -> PaintResult<()> {
        strokes
            .canvas()
            .validate()
            .map_err(|e| PaintError::render(e.to_string()))
    }
}

impl StrokeRenderer for SoftRasterizer {
    #[tracing::instrument(skip_all, fields(strokes = strokes.len()))]
    fn render(&mut self, strokes: &StrokeSet) -> PaintResult<Raster> {
        Self::check_canvas(strokes)?;
        let canvas = strokes.canvas();
        let scene = Scene::bin(strokes, self.settings.softness);
        let mut out = Raster::filled(canvas.width, canvas.height, self.settings.background);

        let row_len = canvas.width as usize * CHANNELS;
        let this = &*self;
        out.data
            .par_chunks_mut(row_len * TILE as usize)
            .enumerate()
            .for_each(|(ty, band)| {
                let mut hits = Vec::new();
                for (ry, row) in band.chunks_mut(row_len).enumerate() {
                    let y = ty as u32 * TILE + ry as u32;
                    for x in 0..canvas.width {
                        let candidates = scene.tile(x / TILE, ty as u32);
                        if candidates.is_empty() {
                            continue;
                        }
                        let p = Point::new(f64::from(x) + 0.5, f64::from(y) + 0.5);
                        let c = this.composite(&scene, candidates, p, &mut hits);
                        let o = x as usize * CHANNELS;
                        row[o..o + CHANNELS].copy_from_slice(&c);
                    }
                }
            });

        if !out.is_finite() {
            return Err(PaintError::numerical("renderer produced non-finite pixels"));
        }
        Ok(out)
    }

    #[tracing::instrument(skip_all, fields(strokes = strokes.len()))]
    fn backward(&mut self, strokes: &StrokeSet, grad: &Raster) -> PaintResult<StrokeGrads> {
        Self::check_canvas(strokes)?;
        let canvas = strokes.canvas();
        if grad.canvas() != canvas {
            return Err(PaintError::render(format!(
                "gradient raster is {}x{}, canvas is {}x{}",
                grad.width, grad.height, canvas.width, canvas.height
            )));
        }
        let scene = Scene::bin(strokes, self.settings.softness);
        let softness = self.settings.softness;
        let layout = strokes.layout();
        let degree = layout.degree();
        let per_stroke = layout.points_per_stroke();
        let this = &*self;

        let partials: Vec<StrokeGrads> = (0..scene.tiles_y)
            .into_par_iter()
            .map(|ty| {
                let mut g = StrokeGrads::zeros_like(strokes);
                let mut hits = Vec::new();
                let y_end = ((ty + 1) * TILE).min(canvas.height);
                for y in ty * TILE..y_end {
                    for x in 0..canvas.width {
                        let candidates = scene.tile(x / TILE, ty);
                        if candidates.is_empty() {
                            continue;
                        }
                        let mut gc = grad.pixel(x, y);
                        if gc.iter().all(|v| *v == 0.0) {
                            continue;
                        }
                        let p = Point::new(f64::from(x) + 0.5, f64::from(y) + 0.5);
                        this.composite(&scene, candidates, p, &mut hits);

                        for (h, below) in hits.iter().rev() {
                            let i = h.stroke;
                            let col = strokes.color(i);
                            let rgb = [col.r, col.g, col.b];
                            let a = col.a * h.cov;

                            let mut d_a = 0.0;
                            for ch in 0..CHANNELS {
                                g.colors[i * 4 + ch] += gc[ch] * a;
                                d_a += gc[ch] * (rgb[ch] - below[ch]);
                                gc[ch] *= 1.0 - a;
                            }
                            g.colors[i * 4 + 3] += d_a * h.cov;

                            let d_z = d_a * col.a * h.dcov_dz;
                            g.widths[i] += d_z * 0.5 / softness + d_a * col.a * h.dcov_dw;

                            if h.dist <= 1e-12 {
                                continue;
                            }
                            let d_dist = -d_z / softness;
                            let b = strokes.segment(i, h.seg).eval(h.t);
                            let dir_x = (b.x - p.x) / h.dist;
                            let dir_y = (b.y - p.y) / h.dist;
                            let basis = bernstein(degree, h.t);
                            let base = (i * per_stroke + h.seg * degree) * 2;
                            for (k, w) in basis.iter().take(degree + 1).enumerate() {
                                g.points[base + 2 * k] += d_dist * w * dir_x;
                                g.points[base + 2 * k + 1] += d_dist * w * dir_y;
                            }
                        }
                    }
                }
                g
            })
            .collect();

        let mut total = StrokeGrads::zeros_like(strokes);
        for part in &partials {
            total.add_scaled(part, 1.0);
        }
        if !total.is_finite() {
            return Err(PaintError::numerical("renderer produced non-finite gradients"));
        }
        Ok(total)
    }
}

#[derive(Clone, Copy, Debug)]
struct Hit {
    stroke: usize,
    cov: f64,
    dcov_dz: f64,
    /// Width derivative of the thin-stroke fade alone.
    dcov_dw: f64,
    dist: f64,
    seg: usize,
    t: f64,
}

/// Strokes binned into screen tiles, in paint order.
struct Scene<'a> {
    strokes: &'a StrokeSet,
    rects: Vec<Rect>,
    tiles_x: u32,
    tiles_y: u32,
    bins: Vec<Vec<u32>>,
}

impl<'a> Scene<'a> {
    fn bin(strokes: &'a StrokeSet, softness: f64) -> Self {
        let canvas = strokes.canvas();
        let tiles_x = canvas.width.div_ceil(TILE);
        let tiles_y = canvas.height.div_ceil(TILE);
        let mut bins = vec![Vec::new(); (tiles_x * tiles_y) as usize];
        let mut rects = Vec::with_capacity(strokes.len());
        let t = f64::from(TILE);

        for i in 0..strokes.len() {
            let reach = 0.5 * strokes.width(i).max(0.0) + CUTOFF_Z * softness;
            let r = strokes.control_bounds(i).inflate(reach, reach);
            rects.push(r);
            if !(r.x1 >= 0.0
                && r.y1 >= 0.0
                && r.x0 <= f64::from(canvas.width)
                && r.y0 <= f64::from(canvas.height))
            {
                continue;
            }
            let tx0 = (r.x0.max(0.0) / t).floor() as u32;
            let ty0 = (r.y0.max(0.0) / t).floor() as u32;
            let tx1 = ((r.x1 / t).floor() as u32).min(tiles_x - 1);
            let ty1 = ((r.y1 / t).floor() as u32).min(tiles_y - 1);
            for ty in ty0..=ty1 {
                for tx in tx0..=tx1 {
                    bins[(ty * tiles_x + tx) as usize].push(i as u32);
                }
            }
        }

        Self {
            strokes,
            rects,
            tiles_x,
            tiles_y,
            bins,
        }
    }

    fn tile(&self, tx: u32, ty: u32) -> &[u32] {
        &self.bins[(ty * self.tiles_x + tx) as usize]
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/soft.rs"]
mod tests;

use std::str::FromStr;

use rayon::prelude::*;

use crate::{
    foundation::core::Canvas,
    foundation::error::{PaintError, PaintResult},
    foundation::math::{bernstein, log_sum_exp},
    stroke::model::{StrokeLayout, StrokeSet},
    stroke::params::{ParamGroup, StrokeGrads},
};

/// Positional regularizer formulation. Exactly one is active per session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PosLoss {
    /// Control point coordinates against their prior.
    #[default]
    Pos,
    /// Points sampled along each curve against the prior curve.
    Bez,
    /// Entropic optimal transport between stroke centroids and prior centroids.
    Sinkhorn,
}

impl PosLoss {
    pub fn name(self) -> &'static str {
        match self {
            Self::Pos => "pos",
            Self::Bez => "bez",
            Self::Sinkhorn => "sinkhorn",
        }
    }
}

impl std::fmt::Display for PosLoss {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PosLoss {
    type Err = PaintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pos" => Ok(Self::Pos),
            "bez" => Ok(Self::Bez),
            "sinkhorn" => Ok(Self::Sinkhorn),
            other => Err(PaintError::config(format!(
                "unknown pos_type '{other}' (expected 'pos', 'bez' or 'sinkhorn')"
            ))),
        }
    }
}

/// Log-domain Sinkhorn solver settings.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SinkhornConfig {
    /// Entropic regularization, in squared normalized canvas units.
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    /// Upper bound on potential updates per solve.
    #[serde(default = "default_iterations")]
    pub iterations: usize,
    /// A solve stops once no potential moves by more than this in one update.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

fn default_epsilon() -> f64 {
    0.01
}

fn default_iterations() -> usize {
    100
}

fn default_tolerance() -> f64 {
    1e-6
}

impl Default for SinkhornConfig {
    fn default() -> Self {
        Self {
            epsilon: default_epsilon(),
            iterations: default_iterations(),
            tolerance: default_tolerance(),
        }
    }
}

impl SinkhornConfig {
    pub fn validate(&self) -> PaintResult<()> {
        if !self.epsilon.is_finite() || self.epsilon <= 0.0 {
            return Err(PaintError::config("sinkhorn epsilon must be finite and > 0"));
        }
        if self.iterations == 0 {
            return Err(PaintError::config("sinkhorn iterations must be > 0"));
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(PaintError::config("sinkhorn tolerance must be finite and >= 0"));
        }
        Ok(())
    }
}

/// Stroke geometry recorded when the synthesis stage starts, in canvas-normalized coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct PositionPrior {
    canvas: Canvas,
    layout: StrokeLayout,
    bez_samples: usize,
    points: Vec<f64>,
    curves: Vec<f64>,
    centroids: Vec<[f64; 2]>,
    /// `OT(prior, prior)`, constant for the session.
    self_transport: Option<Transport>,
    /// Potentials of the previous `OT(c, q)` and `OT(c, c)` solves, used as starting points.
    cross_warm: Option<Transport>,
    own_warm: Option<Transport>,
}

impl PositionPrior {
    /// Record the current geometry of `strokes`.
    pub fn capture(strokes: &StrokeSet, bez_samples: usize) -> Self {
        let canvas = strokes.canvas();
        let points = normalize(strokes.tensor(ParamGroup::Points), canvas);
        let curves = sample_curves(strokes, bez_samples.max(1));
        let centroids = centroids(strokes);
        Self {
            canvas,
            layout: strokes.layout(),
            bez_samples: bez_samples.max(1),
            points,
            curves,
            centroids,
            self_transport: None,
            cross_warm: None,
            own_warm: None,
        }
    }

    /// Number of strokes captured.
    pub fn len(&self) -> usize {
        self.centroids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.centroids.is_empty()
    }

    fn check(&self, strokes: &StrokeSet) -> PaintResult<()> {
        if strokes.len() != self.len()
            || strokes.layout() != self.layout
            || strokes.canvas() != self.canvas
        {
            return Err(PaintError::config(format!(
                "position prior covers {} strokes, got {}",
                self.len(),
                strokes.len()
            )));
        }
        Ok(())
    }

    /// Value and control point gradient of the selected positional term.
    pub fn loss(
        &mut self,
        kind: PosLoss,
        strokes: &StrokeSet,
        sinkhorn: &SinkhornConfig,
    ) -> PaintResult<(f64, StrokeGrads)> {
        self.check(strokes)?;
        match kind {
            PosLoss::Pos => Ok(self.point_loss(strokes)),
            PosLoss::Bez => Ok(self.curve_loss(strokes)),
            PosLoss::Sinkhorn => self.transport_loss(strokes, sinkhorn),
        }
    }

    fn point_loss(&self, strokes: &StrokeSet) -> (f64, StrokeGrads) {
        let canvas = self.canvas;
        let (sx, sy) = scales(canvas);
        let cur = strokes.tensor(ParamGroup::Points);
        let n = cur.len().max(1) as f64;
        let mut grads = StrokeGrads::zeros_like(strokes);
        let g = grads.tensor_mut(ParamGroup::Points);
        let mut sum = 0.0;
        for (k, (c, p)) in cur.iter().zip(&self.points).enumerate() {
            let s = if k % 2 == 0 { sx } else { sy };
            let d = c * s - p;
            sum += d * d;
            g[k] = 2.0 * d * s / n;
        }
        (sum / n, grads)
    }

    fn curve_loss(&self, strokes: &StrokeSet) -> (f64, StrokeGrads) {
        let (sx, sy) = scales(self.canvas);
        let layout = self.layout;
        let degree = layout.degree();
        let m = self.bez_samples;
        let per = layout.points_per_stroke() * 2;
        let cur = strokes.tensor(ParamGroup::Points);
        let n = self.curves.len().max(1) as f64;

        let mut grads = StrokeGrads::zeros_like(strokes);
        let g = grads.tensor_mut(ParamGroup::Points);
        let mut sum = 0.0;
        let mut idx = 0;
        for i in 0..strokes.len() {
            for s in 0..layout.num_segments {
                let base = i * per + s * degree * 2;
                for k in 0..m {
                    let b = bernstein(degree, sample_t(k, m));
                    let (mut bx, mut by) = (0.0, 0.0);
                    for (j, bj) in b.iter().take(degree + 1).enumerate() {
                        bx += bj * cur[base + 2 * j];
                        by += bj * cur[base + 2 * j + 1];
                    }
                    let dx = bx * sx - self.curves[idx];
                    let dy = by * sy - self.curves[idx + 1];
                    idx += 2;
                    sum += dx * dx + dy * dy;
                    for (j, bj) in b.iter().take(degree + 1).enumerate() {
                        g[base + 2 * j] += 2.0 * dx * sx * bj / n;
                        g[base + 2 * j + 1] += 2.0 * dy * sy * bj / n;
                    }
                }
            }
        }
        (sum / n, grads)
    }

    /// Debiased Sinkhorn divergence `OT(c, q) - OT(c, c)/2 - OT(q, q)/2`, zero at the prior.
    ///
    /// Every solve after the first starts from the potentials of the previous call, so an
    /// optimizer moving the strokes a little per step pays for a few updates, not a cold solve.
    fn transport_loss(
        &mut self,
        strokes: &StrokeSet,
        cfg: &SinkhornConfig,
    ) -> PaintResult<(f64, StrokeGrads)> {
        cfg.validate()?;
        let cur = centroids(strokes);
        let prior_centroids = &self.centroids;
        let prior: &Transport = self
            .self_transport
            .get_or_insert_with(|| Transport::solve_symmetric(prior_centroids, cfg, None));

        let cross = Transport::solve(
            &cur,
            &self.centroids,
            cfg,
            Some(self.cross_warm.as_ref().unwrap_or(prior)),
        );
        let own = Transport::solve_symmetric(
            &cur,
            cfg,
            Some(self.own_warm.as_ref().unwrap_or(prior)),
        );
        let value = cross.value - 0.5 * own.value - 0.5 * prior.value;

        // `OT(c, c)` moves through both arguments; its symmetric plan makes the two halves equal.
        let g_cross = cross.grad_x(&cur, &self.centroids, cfg);
        let g_own = own.grad_x(&cur, &cur, cfg);

        let (sx, sy) = scales(self.canvas);
        let per = self.layout.points_per_stroke();
        let mut grads = StrokeGrads::zeros_like(strokes);
        let g = grads.tensor_mut(ParamGroup::Points);
        for i in 0..cur.len() {
            let gx = g_cross[i][0] - g_own[i][0];
            let gy = g_cross[i][1] - g_own[i][1];
            for k in 0..per {
                let o = (i * per + k) * 2;
                g[o] = gx * sx / per as f64;
                g[o + 1] = gy * sy / per as f64;
            }
        }

        if !value.is_finite() || !grads.is_finite() {
            return Err(PaintError::numerical("sinkhorn positional loss is not finite"));
        }
        self.cross_warm = Some(cross);
        self.own_warm = Some(own);
        Ok((value, grads))
    }
}

fn scales(canvas: Canvas) -> (f64, f64) {
    (1.0 / f64::from(canvas.width), 1.0 / f64::from(canvas.height))
}

fn normalize(coords: &[f64], canvas: Canvas) -> Vec<f64> {
    let (sx, sy) = scales(canvas);
    coords
        .chunks_exact(2)
        .flat_map(|c| [c[0] * sx, c[1] * sy])
        .collect()
}

/// Midpoint rule, so shared segment end points are not sampled twice.
fn sample_t(k: usize, m: usize) -> f64 {
    (k as f64 + 0.5) / m as f64
}

fn sample_curves(strokes: &StrokeSet, m: usize) -> Vec<f64> {
    let (sx, sy) = scales(strokes.canvas());
    let layout = strokes.layout();
    let mut out = Vec::with_capacity(strokes.len() * layout.num_segments * m * 2);
    for i in 0..strokes.len() {
        for s in 0..layout.num_segments {
            let seg = strokes.segment(i, s);
            for k in 0..m {
                let p = seg.eval(sample_t(k, m));
                out.push(p.x * sx);
                out.push(p.y * sy);
            }
        }
    }
    out
}

fn centroids(strokes: &StrokeSet) -> Vec<[f64; 2]> {
    let (sx, sy) = scales(strokes.canvas());
    (0..strokes.len())
        .map(|i| {
            let c = strokes.centroid(i);
            [c.x * sx, c.y * sy]
        })
        .collect()
}

fn cost(a: [f64; 2], b: [f64; 2]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    dx * dx + dy * dy
}

/// Dual potentials of a uniform-weight entropic transport problem.
///
/// Costs are recomputed on the fly so memory stays linear in the number of points.
#[derive(Clone, Debug, PartialEq)]
struct Transport {
    f: Vec<f64>,
    g: Vec<f64>,
    value: f64,
}

/// Softmin update `-eps * log sum_j b_j exp((g_j - C(x_i, y_j)) / eps)` for every `x_i`.
fn potential(x: &[[f64; 2]], y: &[[f64; 2]], g: &[f64], eps: f64) -> Vec<f64> {
    let log_b = -(y.len().max(1) as f64).ln();
    x.par_iter()
        .map(|xi| {
            -eps * log_sum_exp(
                g.iter()
                    .zip(y)
                    .map(|(gj, yj)| (gj - cost(*xi, *yj)) / eps + log_b),
            )
        })
        .collect()
}

fn max_change(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(a, b)| (a - b).abs()).fold(0.0, f64::max)
}

fn diameter_sq(x: &[[f64; 2]]) -> f64 {
    let (mut lo, mut hi) = ([f64::INFINITY; 2], [f64::NEG_INFINITY; 2]);
    for p in x {
        for k in 0..2 {
            lo[k] = lo[k].min(p[k]);
            hi[k] = hi[k].max(p[k]);
        }
    }
    if x.is_empty() {
        return 0.0;
    }
    cost(lo, hi)
}

fn mean(v: &[f64]) -> f64 {
    v.iter().sum::<f64>() / v.len().max(1) as f64
}

impl Transport {
    /// Alternating updates for `OT(x, y)`, starting from `warm` when its sizes fit.
    fn solve(
        x: &[[f64; 2]],
        y: &[[f64; 2]],
        cfg: &SinkhornConfig,
        warm: Option<&Transport>,
    ) -> Self {
        let eps = cfg.epsilon;
        let (mut f, mut g) = match warm {
            Some(w) if w.f.len() == x.len() && w.g.len() == y.len() => (w.f.clone(), w.g.clone()),
            _ => (vec![0.0; x.len()], vec![0.0; y.len()]),
        };
        for _ in 0..cfg.iterations {
            let next_f = potential(x, y, &g, eps);
            let next_g = potential(y, x, &next_f, eps);
            let delta = max_change(&f, &next_f).max(max_change(&g, &next_g));
            f = next_f;
            g = next_g;
            if delta <= cfg.tolerance {
                break;
            }
        }
        let value = mean(&f) + mean(&g);
        Self { f, g, value }
    }

    /// Averaged fixed-point updates for `OT(x, x)`, whose potentials coincide.
    ///
    /// A cold start anneals epsilon down from the squared point-cloud diameter, halving it
    /// every update, and only tests for convergence once the target epsilon is reached.
    fn solve_symmetric(x: &[[f64; 2]], cfg: &SinkhornConfig, warm: Option<&Transport>) -> Self {
        let (mut f, mut eps) = match warm {
            Some(w) if w.f.len() == x.len() => (w.f.clone(), cfg.epsilon),
            _ => (vec![0.0; x.len()], diameter_sq(x).max(cfg.epsilon)),
        };
        for _ in 0..cfg.iterations {
            let next: Vec<f64> = potential(x, x, &f, eps)
                .into_iter()
                .zip(&f)
                .map(|(t, f)| 0.5 * (t + f))
                .collect();
            let delta = max_change(&f, &next);
            f = next;
            if eps > cfg.epsilon {
                eps = (0.5 * eps).max(cfg.epsilon);
            } else if delta <= cfg.tolerance {
                break;
            }
        }
        let value = 2.0 * mean(&f);
        Self {
            g: f.clone(),
            f,
            value,
        }
    }

    fn plan(&self, i: usize, j: usize, c: f64, eps: f64, weight: f64) -> f64 {
        ((self.f[i] + self.g[j] - c) / eps).exp() * weight
    }

    /// `d value / d x_i = sum_j P_ij * 2 (x_i - y_j)`.
    fn grad_x(&self, x: &[[f64; 2]], y: &[[f64; 2]], cfg: &SinkhornConfig) -> Vec<[f64; 2]> {
        let w = 1.0 / (x.len().max(1) * y.len().max(1)) as f64;
        x.par_iter()
            .enumerate()
            .map(|(i, xi)| {
                let mut acc = [0.0; 2];
                for (j, yj) in y.iter().enumerate() {
                    let p = self.plan(i, j, cost(*xi, *yj), cfg.epsilon, w);
                    acc[0] += 2.0 * p * (xi[0] - yj[0]);
                    acc[1] += 2.0 * p * (xi[1] - yj[1]);
                }
                acc
            })
            .collect()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/loss/position.rs"]
mod tests;

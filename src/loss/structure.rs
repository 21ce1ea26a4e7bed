use std::str::FromStr;

use crate::{
    foundation::error::{PaintError, PaintResult},
    render::raster::{CHANNELS, Raster},
};

/// Structural similarity formulation used by the synthesis stage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StructLoss {
    /// Single-scale SSIM.
    #[default]
    Ssim,
    /// Multi-scale SSIM.
    Msssim,
}

impl FromStr for StructLoss {
    type Err = PaintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ssim" => Ok(Self::Ssim),
            "msssim" => Ok(Self::Msssim),
            other => Err(PaintError::config(format!(
                "unknown struct_loss '{other}' (expected 'ssim' or 'msssim')"
            ))),
        }
    }
}

impl StructLoss {
    /// `1 - similarity` and its gradient with respect to `rendered`.
    pub fn loss(self, rendered: &Raster, target: &Raster) -> PaintResult<(f64, Raster)> {
        let (value, mut grad) = match self {
            Self::Ssim => ssim(rendered, target)?,
            Self::Msssim => ms_ssim(rendered, target)?,
        };
        for g in &mut grad.data {
            *g = -*g;
        }
        Ok((1.0 - value, grad))
    }
}

const WINDOW: usize = 11;
const SIGMA: f64 = 1.5;
const C1: f64 = 0.01 * 0.01;
const C2: f64 = 0.03 * 0.03;
const MS_WEIGHTS: [f64; 5] = [0.0448, 0.2856, 0.3001, 0.2363, 0.1333];
const MS_FLOOR: f64 = 1e-6;

/// Mean SSIM over RGB channels and the valid window positions, with its gradient.
pub fn ssim(x: &Raster, y: &Raster) -> PaintResult<(f64, Raster)> {
    x.check_same_size(y)?;
    let xs = Plane::split(x);
    let ys = Plane::split(y);
    let mut value = 0.0;
    let mut grads = Vec::with_capacity(CHANNELS);
    for (xc, yc) in xs.iter().zip(&ys) {
        let t = channel_terms(xc, yc);
        value += t.ssim / CHANNELS as f64;
        grads.push(t.ssim_grad.scaled(1.0 / CHANNELS as f64));
    }
    Ok((value, Plane::merge(&grads)))
}

/// Multi-scale SSIM (product of per-scale contrast-structure terms and the coarsest SSIM).
///
/// Uses as many of the five standard scales as the image supports, with the scale weights
/// renormalized to sum to one.
pub fn ms_ssim(x: &Raster, y: &Raster) -> PaintResult<(f64, Raster)> {
    x.check_same_size(y)?;
    let levels = ms_levels(x.width.min(x.height) as usize);
    let wsum: f64 = MS_WEIGHTS[..levels].iter().sum();
    let weights: Vec<f64> = MS_WEIGHTS[..levels].iter().map(|w| w / wsum).collect();

    let mut value = 0.0;
    let mut grads = Vec::with_capacity(CHANNELS);
    for (xc, yc) in Plane::split(x).into_iter().zip(Plane::split(y)) {
        let mut px = vec![xc];
        let mut py = vec![yc];
        for _ in 1..levels {
            let (nx, ny) = match (px.last(), py.last()) {
                (Some(a), Some(b)) => (a.downsample(), b.downsample()),
                _ => break,
            };
            px.push(nx);
            py.push(ny);
        }

        let terms: Vec<ChannelTerms> = px
            .iter()
            .zip(&py)
            .map(|(a, b)| channel_terms(a, b))
            .collect();

        let mut factors = Vec::with_capacity(levels);
        for (j, t) in terms.iter().enumerate() {
            let raw = if j + 1 == levels { t.ssim } else { t.cs };
            factors.push((raw, raw.max(MS_FLOOR)));
        }
        let ms: f64 = factors
            .iter()
            .zip(&weights)
            .map(|((_, m), w)| m.powf(*w))
            .product();
        value += ms / CHANNELS as f64;

        // Coarse to fine: seed each scale with its own term, then push through the pooling adjoint.
        let mut acc: Option<Plane> = None;
        for j in (0..levels).rev() {
            let (raw, m) = factors[j];
            let dm = if raw > MS_FLOOR {
                weights[j] * ms / m / CHANNELS as f64
            } else {
                0.0
            };
            let term = if j + 1 == levels {
                &terms[j].ssim_grad
            } else {
                &terms[j].cs_grad
            };
            let mut g = term.scaled(dm);
            if let Some(coarse) = acc.take() {
                g.add_assign(&coarse.downsample_adjoint(g.w, g.h));
            }
            acc = Some(g);
        }
        if let Some(g) = acc {
            grads.push(g);
        }
    }
    Ok((value, Plane::merge(&grads)))
}

fn ms_levels(min_dim: usize) -> usize {
    let mut levels = 1;
    let mut d = min_dim;
    while levels < MS_WEIGHTS.len() && d / 2 >= WINDOW {
        d /= 2;
        levels += 1;
    }
    levels
}

/// Mean SSIM / contrast-structure of one channel and their gradients with respect to `x`.
struct ChannelTerms {
    ssim: f64,
    cs: f64,
    ssim_grad: Plane,
    cs_grad: Plane,
}

fn channel_terms(x: &Plane, y: &Plane) -> ChannelTerms {
    let (w, h) = (x.w, x.h);
    let kernel = gaussian_kernel(window_for(w.min(h)));
    let r = kernel.len() / 2;

    let mu_x = x.filter(&kernel);
    let mu_y = y.filter(&kernel);
    let exx = x.map2(x, |a, b| a * b).filter(&kernel);
    let eyy = y.map2(y, |a, b| a * b).filter(&kernel);
    let exy = x.map2(y, |a, b| a * b).filter(&kernel);

    let n = ((w - 2 * r) * (h - 2 * r)) as f64;
    let mut ssim_sum = 0.0;
    let mut cs_sum = 0.0;
    // Partials of the per-position maps with respect to mu_x, sigma_x^2 and sigma_xy.
    let mut s_mu = Plane::zeros(w, h);
    let mut s_v = Plane::zeros(w, h);
    let mut s_c = Plane::zeros(w, h);
    let mut c_v = Plane::zeros(w, h);
    let mut c_c = Plane::zeros(w, h);

    for py in r..h - r {
        for px in r..w - r {
            let i = py * w + px;
            let (mx, my) = (mu_x.data[i], mu_y.data[i]);
            let vx = exx.data[i] - mx * mx;
            let vy = eyy.data[i] - my * my;
            let cxy = exy.data[i] - mx * my;

            let a1 = 2.0 * mx * my + C1;
            let a2 = 2.0 * cxy + C2;
            let b1 = mx * mx + my * my + C1;
            let b2 = vx + vy + C2;
            let s = a1 * a2 / (b1 * b2);
            let cs = a2 / b2;
            ssim_sum += s;
            cs_sum += cs;

            s_mu.data[i] = (2.0 * my * a2 / (b1 * b2) - 2.0 * mx * s / b1) / n;
            s_v.data[i] = -s / b2 / n;
            s_c.data[i] = 2.0 * a1 / (b1 * b2) / n;
            c_v.data[i] = -cs / b2 / n;
            c_c.data[i] = 2.0 / b2 / n;
        }
    }

    let zero = Plane::zeros(w, h);
    ChannelTerms {
        ssim: ssim_sum / n,
        cs: cs_sum / n,
        ssim_grad: stat_adjoint(x, y, &mu_x, &mu_y, &s_mu, &s_v, &s_c, &kernel),
        cs_grad: stat_adjoint(x, y, &mu_x, &mu_y, &zero, &c_v, &c_c, &kernel),
    }
}

/// Pull per-position partials on (mu_x, sigma_x^2, sigma_xy) back to the pixels of `x`.
#[allow(clippy::too_many_arguments)]
fn stat_adjoint(
    x: &Plane,
    y: &Plane,
    mu_x: &Plane,
    mu_y: &Plane,
    d_mu: &Plane,
    d_v: &Plane,
    d_c: &Plane,
    kernel: &[f64],
) -> Plane {
    let mut base = Plane::zeros(x.w, x.h);
    for i in 0..base.data.len() {
        base.data[i] = d_mu.data[i] - 2.0 * d_v.data[i] * mu_x.data[i] - d_c.data[i] * mu_y.data[i];
    }
    let base = base.filter(kernel);
    let gv = d_v.filter(kernel);
    let gc = d_c.filter(kernel);
    let mut out = Plane::zeros(x.w, x.h);
    for i in 0..out.data.len() {
        out.data[i] = base.data[i] + 2.0 * x.data[i] * gv.data[i] + y.data[i] * gc.data[i];
    }
    out
}

/// Largest odd window not exceeding the standard size or the image.
fn window_for(min_dim: usize) -> usize {
    let k = WINDOW.min(min_dim.max(1));
    if k % 2 == 0 { k - 1 } else { k }
}

fn gaussian_kernel(size: usize) -> Vec<f64> {
    let r = (size / 2) as f64;
    let mut k: Vec<f64> = (0..size)
        .map(|i| {
            let d = i as f64 - r;
            (-(d * d) / (2.0 * SIGMA * SIGMA)).exp()
        })
        .collect();
    let sum: f64 = k.iter().sum();
    for v in &mut k {
        *v /= sum;
    }
    k
}

/// Single-channel image plane.
#[derive(Clone, Debug)]
struct Plane {
    w: usize,
    h: usize,
    data: Vec<f64>,
}

impl Plane {
    fn zeros(w: usize, h: usize) -> Self {
        Self {
            w,
            h,
            data: vec![0.0; w * h],
        }
    }

    fn split(r: &Raster) -> Vec<Plane> {
        let (w, h) = (r.width as usize, r.height as usize);
        (0..CHANNELS)
            .map(|c| Plane {
                w,
                h,
                data: r.data.iter().skip(c).step_by(CHANNELS).copied().collect(),
            })
            .collect()
    }

    fn merge(planes: &[Plane]) -> Raster {
        let (w, h) = planes.first().map(|p| (p.w, p.h)).unwrap_or((0, 0));
        let mut out = Raster::zeros(w as u32, h as u32);
        for (c, p) in planes.iter().enumerate() {
            for (i, v) in p.data.iter().enumerate() {
                out.data[i * CHANNELS + c] = *v;
            }
        }
        out
    }

    fn map2(&self, other: &Plane, f: impl Fn(f64, f64) -> f64) -> Plane {
        Plane {
            w: self.w,
            h: self.h,
            data: self
                .data
                .iter()
                .zip(&other.data)
                .map(|(a, b)| f(*a, *b))
                .collect(),
        }
    }

    fn scaled(&self, s: f64) -> Plane {
        Plane {
            w: self.w,
            h: self.h,
            data: self.data.iter().map(|v| v * s).collect(),
        }
    }

    fn add_assign(&mut self, other: &Plane) {
        for (a, b) in self.data.iter_mut().zip(&other.data) {
            *a += b;
        }
    }

    /// Separable "same"-size correlation with zero padding.
    ///
    /// With a symmetric kernel this operator is its own adjoint.
    fn filter(&self, kernel: &[f64]) -> Plane {
        let r = (kernel.len() / 2) as isize;
        let (w, h) = (self.w as isize, self.h as isize);
        let mut tmp = Plane::zeros(self.w, self.h);
        for y in 0..h {
            for x in 0..w {
                let mut acc = 0.0;
                for (k, kv) in kernel.iter().enumerate() {
                    let sx = x + k as isize - r;
                    if (0..w).contains(&sx) {
                        acc += kv * self.data[(y * w + sx) as usize];
                    }
                }
                tmp.data[(y * w + x) as usize] = acc;
            }
        }
        let mut out = Plane::zeros(self.w, self.h);
        for y in 0..h {
            for x in 0..w {
                let mut acc = 0.0;
                for (k, kv) in kernel.iter().enumerate() {
                    let sy = y + k as isize - r;
                    if (0..h).contains(&sy) {
                        acc += kv * tmp.data[(sy * w + x) as usize];
                    }
                }
                out.data[(y * w + x) as usize] = acc;
            }
        }
        out
    }

    /// 2x2 average pooling; an odd trailing row/column is dropped.
    fn downsample(&self) -> Plane {
        let (w, h) = (self.w / 2, self.h / 2);
        let mut out = Plane::zeros(w, h);
        for y in 0..h {
            for x in 0..w {
                let i = (2 * y) * self.w + 2 * x;
                out.data[y * w + x] = 0.25
                    * (self.data[i]
                        + self.data[i + 1]
                        + self.data[i + self.w]
                        + self.data[i + self.w + 1]);
            }
        }
        out
    }

    /// Adjoint of [`Plane::downsample`] onto a `w x h` plane.
    fn downsample_adjoint(&self, w: usize, h: usize) -> Plane {
        let mut out = Plane::zeros(w, h);
        for y in 0..self.h {
            for x in 0..self.w {
                let g = 0.25 * self.data[y * self.w + x];
                let i = (2 * y) * w + 2 * x;
                out.data[i] += g;
                out.data[i + 1] += g;
                out.data[i + w] += g;
                out.data[i + w + 1] += g;
            }
        }
        out
    }
}

#[cfg(test)]
#[path = "../../tests/unit/loss/structure.rs"]
mod tests;

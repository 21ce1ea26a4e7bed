use crate::{
    foundation::core::{Canvas, Point, Rgba, Rng64},
    foundation::error::{PaintError, PaintResult},
    foundation::math::luminance,
    render::raster::Raster,
    stroke::model::{Stroke, StrokeLayout, StrokeSet},
};

/// How initial stroke positions and colors are chosen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitMode {
    /// Uniform scatter over the canvas with random colors.
    #[default]
    Random,
    /// Start points drawn in proportion to the reference image's edge strength, colored by it.
    Salient,
}

/// Everything that determines an initial layout.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InitSpec {
    pub num_paths: usize,
    pub canvas: Canvas,
    pub seed: u64,
    pub mode: InitMode,
    pub layout: StrokeLayout,
    /// Width given to every new stroke, in pixels.
    pub init_width: f64,
    /// Upper width bound; `init_width` must not exceed it.
    pub max_width: f64,
    /// Opacity given to every new stroke.
    pub init_alpha: f64,
    /// Control point spread as a fraction of the larger canvas dimension.
    pub radius_frac: f64,
}

impl InitSpec {
    pub fn validate(&self) -> PaintResult<()> {
        if self.num_paths == 0 {
            return Err(PaintError::config("num_paths must be > 0"));
        }
        self.canvas.validate()?;
        self.layout.validate()?;
        if !self.max_width.is_finite() || self.max_width <= 0.0 {
            return Err(PaintError::config("max_width must be finite and > 0"));
        }
        if !self.init_width.is_finite()
            || self.init_width <= 0.0
            || self.init_width > self.max_width
        {
            return Err(PaintError::config("init_width must be in (0, max_width]"));
        }
        if !(0.0..=1.0).contains(&self.init_alpha) {
            return Err(PaintError::config("init_alpha must be in [0, 1]"));
        }
        if !self.radius_frac.is_finite() || self.radius_frac <= 0.0 {
            return Err(PaintError::config("radius_frac must be finite and > 0"));
        }
        Ok(())
    }
}

/// Build the initial stroke set.
///
/// The result depends only on `spec` and `reference`: identical inputs give bit-identical sets.
/// [`InitMode::Salient`] requires a `reference` raster the size of the canvas.
#[tracing::instrument(skip(reference), fields(num_paths = spec.num_paths, mode = ?spec.mode))]
pub fn initialize(spec: &InitSpec, reference: Option<&Raster>) -> PaintResult<StrokeSet> {
    spec.validate()?;
    let mut rng = Rng64::new(spec.seed);
    let sampler = match spec.mode {
        InitMode::Random => None,
        InitMode::Salient => {
            let reference = reference.ok_or_else(|| {
                PaintError::config("salient initialization requires a reference image")
            })?;
            if reference.canvas() != spec.canvas {
                return Err(PaintError::config(format!(
                    "reference image is {}x{}, canvas is {}x{}",
                    reference.width, reference.height, spec.canvas.width, spec.canvas.height
                )));
            }
            Some(SaliencySampler::new(reference))
        }
    };

    let radius = spec.radius_frac * spec.canvas.max_dim();
    let per = spec.layout.points_per_stroke();
    let w = f64::from(spec.canvas.width);
    let h = f64::from(spec.canvas.height);

    let mut strokes = Vec::with_capacity(spec.num_paths);
    for _ in 0..spec.num_paths {
        let (start, rgb) = match &sampler {
            None => {
                let p = Point::new(rng.range_f64(0.0, w), rng.range_f64(0.0, h));
                let rgb = [rng.next_f64_01(), rng.next_f64_01(), rng.next_f64_01()];
                (p, rgb)
            }
            Some(s) => s.sample(&mut rng),
        };

        let mut points = Vec::with_capacity(per);
        points.push(start);
        let mut prev = start;
        for _ in 1..per {
            let p = Point::new(
                prev.x + radius * (rng.next_f64_01() - 0.5),
                prev.y + radius * (rng.next_f64_01() - 0.5),
            );
            points.push(p);
            prev = p;
        }
        separate_coincident(&mut points);

        strokes.push(Stroke {
            points,
            width: spec.init_width,
            color: Rgba::new(rgb[0], rgb[1], rgb[2], spec.init_alpha),
        });
    }

    StrokeSet::new(spec.layout, spec.canvas, strokes)
}

fn separate_coincident(points: &mut [Point]) {
    let first = points[0];
    if points.iter().all(|p| (*p - first).hypot2() < 1e-18) {
        let last = points.len() - 1;
        points[last].x += 1.0;
    }
}

/// Inverse-CDF sampler over per-pixel edge strength of a reference image.
struct SaliencySampler<'a> {
    reference: &'a Raster,
    cdf: Vec<f64>,
}

impl<'a> SaliencySampler<'a> {
    /// Keeps flat regions reachable.
    const FLOOR: f64 = 1e-3;

    fn new(reference: &'a Raster) -> Self {
        let (w, h) = (reference.width, reference.height);
        let lum = |x: u32, y: u32| {
            let [r, g, b] = reference.pixel(x, y);
            luminance(r, g, b)
        };
        let mut cdf = Vec::with_capacity(reference.pixel_count());
        let mut acc = 0.0;
        for y in 0..h {
            for x in 0..w {
                let gx = lum((x + 1).min(w - 1), y) - lum(x.saturating_sub(1), y);
                let gy = lum(x, (y + 1).min(h - 1)) - lum(x, y.saturating_sub(1));
                acc += (gx * gx + gy * gy).sqrt() + Self::FLOOR;
                cdf.push(acc);
            }
        }
        Self { reference, cdf }
    }

    fn sample(&self, rng: &mut Rng64) -> (Point, [f64; 3]) {
        let total = self.cdf.last().copied().unwrap_or(0.0);
        let u = rng.next_f64_01() * total;
        let idx = self
            .cdf
            .partition_point(|&c| c <= u)
            .min(self.cdf.len() - 1);
        let w = self.reference.width as usize;
        let (x, y) = ((idx % w) as u32, (idx / w) as u32);
        let p = Point::new(
            f64::from(x) + rng.next_f64_01(),
            f64::from(y) + rng.next_f64_01(),
        );
        (p, self.reference.pixel(x, y))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/stroke/init.rs"]
mod tests;

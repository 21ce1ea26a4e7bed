use crate::{foundation::error::PaintResult, render::raster::Raster};

/// Mean squared error over every channel value, with its gradient with respect to `rendered`.
pub fn mse(rendered: &Raster, target: &Raster) -> PaintResult<(f64, Raster)> {
    rendered.check_same_size(target)?;
    let n = rendered.data.len().max(1) as f64;
    let mut grad = Raster::zeros(rendered.width, rendered.height);
    let mut sum = 0.0;
    for ((g, x), y) in grad.data.iter_mut().zip(&rendered.data).zip(&target.data) {
        let d = x - y;
        sum += d * d;
        *g = 2.0 * d / n;
    }
    Ok((sum / n, grad))
}

#[cfg(test)]
#[path = "../../tests/unit/loss/recon.rs"]
mod tests;

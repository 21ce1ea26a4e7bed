use std::path::Path;

use anyhow::Context;

use crate::{
    foundation::core::Canvas,
    foundation::error::{PaintError, PaintResult},
};

/// Channels stored per pixel.
pub const CHANNELS: usize = 3;

/// An RGB image with `f64` channels in nominal range `[0, 1]`, row-major, tightly packed.
///
/// Rasters double as image-space gradients, in which case values are unbounded.
#[derive(Clone, Debug, PartialEq)]
pub struct Raster {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// `width * height * 3` channel values.
    pub data: Vec<f64>,
}

impl Raster {
    /// All-zero raster.
    pub fn zeros(width: u32, height: u32) -> Self {
        Self::filled(width, height, [0.0; CHANNELS])
    }

    /// Raster filled with one color.
    pub fn filled(width: u32, height: u32, rgb: [f64; CHANNELS]) -> Self {
        let n = (width as usize) * (height as usize);
        let mut data = Vec::with_capacity(n * CHANNELS);
        for _ in 0..n {
            data.extend_from_slice(&rgb);
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn canvas(&self) -> Canvas {
        Canvas {
            width: self.width,
            height: self.height,
        }
    }

    pub fn pixel_count(&self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        ((y as usize) * (self.width as usize) + (x as usize)) * CHANNELS
    }

    pub fn pixel(&self, x: u32, y: u32) -> [f64; CHANNELS] {
        let o = self.offset(x, y);
        [self.data[o], self.data[o + 1], self.data[o + 2]]
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, rgb: [f64; CHANNELS]) {
        let o = self.offset(x, y);
        self.data[o..o + CHANNELS].copy_from_slice(&rgb);
    }

    /// Error unless `other` has the same dimensions.
    pub fn check_same_size(&self, other: &Raster) -> PaintResult<()> {
        if self.width != other.width || self.height != other.height {
            return Err(PaintError::render(format!(
                "raster size mismatch: {}x{} vs {}x{}",
                self.width, self.height, other.width, other.height
            )));
        }
        Ok(())
    }

    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }

    /// Element-wise `self += other * scale`.
    pub fn add_scaled(&mut self, other: &Raster, scale: f64) -> PaintResult<()> {
        self.check_same_size(other)?;
        for (a, b) in self.data.iter_mut().zip(&other.data) {
            *a += b * scale;
        }
        Ok(())
    }

    /// Convert an 8-bit RGB image.
    pub fn from_rgb8(img: &image::RgbImage) -> Self {
        let (width, height) = img.dimensions();
        let data = img.as_raw().iter().map(|&v| f64::from(v) / 255.0).collect();
        Self {
            width,
            height,
            data,
        }
    }

    /// Quantize to an 8-bit RGB image (values clamped to `[0, 1]`).
    pub fn to_rgb8(&self) -> image::RgbImage {
        let bytes = self
            .data
            .iter()
            .map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
            .collect();
        image::RgbImage::from_raw(self.width, self.height, bytes)
            .unwrap_or_else(|| image::RgbImage::new(self.width, self.height))
    }

    /// Decode encoded image bytes and resize to `canvas` (alpha is dropped).
    pub fn decode(bytes: &[u8], canvas: Canvas) -> PaintResult<Self> {
        let dyn_img = image::load_from_memory(bytes).context("decode image from memory")?;
        Ok(Self::from_dynamic(dyn_img, canvas))
    }

    /// Load an image file and resize it to `canvas`.
    pub fn load(path: &Path, canvas: Canvas) -> PaintResult<Self> {
        let dyn_img =
            image::open(path).with_context(|| format!("open image '{}'", path.display()))?;
        Ok(Self::from_dynamic(dyn_img, canvas))
    }

    fn from_dynamic(img: image::DynamicImage, canvas: Canvas) -> Self {
        let rgb = img.to_rgb8();
        if rgb.dimensions() == (canvas.width, canvas.height) {
            return Self::from_rgb8(&rgb);
        }
        let resized = image::imageops::resize(
            &rgb,
            canvas.width,
            canvas.height,
            image::imageops::FilterType::Triangle,
        );
        Self::from_rgb8(&resized)
    }

    /// Write the raster as a PNG, creating parent directories.
    pub fn save_png(&self, path: &Path) -> PaintResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create output dir '{}'", parent.display()))?;
        }
        self.to_rgb8()
            .save_with_format(path, image::ImageFormat::Png)
            .with_context(|| format!("write png '{}'", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/raster.rs"]
mod tests;

// Image types for loading targets and exporting results
use image::{imageops::FilterType, DynamicImage, Rgba, RgbaImage};

use std::path::Path;

use crate::error::Result;

/// Normalized RGBA pixel, each channel in `[0, 1]`
pub type Pixel = [f32; 4];

/// A mutable `H × W × 4` float buffer
///
/// The working canvas, the target, and the high-resolution output all use this
/// type. Floats keep repeated compositing from accumulating 8-bit rounding error;
/// we only quantize when exporting with [`Canvas::to_rgba8`].
///
/// **Rust Concept: Private fields with accessor methods**
/// `data` is private so nobody can resize it out from under `width`/`height`.
/// Every public method keeps `data.len() == width * height * 4`.
#[derive(Clone, Debug, PartialEq)]
pub struct Canvas {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl Canvas {
    /// Create a canvas where every pixel has the same value
    pub fn filled(height: u32, width: u32, pixel: Pixel) -> Self {
        let count = (width as usize) * (height as usize);
        let mut data = Vec::with_capacity(count * 4);
        for _ in 0..count {
            data.extend_from_slice(&pixel);
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// Opaque canvas filled with a flat color
    pub fn with_color(height: u32, width: u32, rgb: [f32; 3]) -> Self {
        Self::filled(height, width, [rgb[0], rgb[1], rgb[2], 1.0])
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw row-major RGBA data
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    fn offset(&self, x: u32, y: u32) -> usize {
        ((y as usize) * (self.width as usize) + x as usize) * 4
    }

    /// Read one pixel
    ///
    /// # Panics
    /// Panics if `(x, y)` is outside the canvas, like slice indexing.
    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> Pixel {
        let i = self.offset(x, y);
        [
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ]
    }

    /// Overwrite one pixel
    #[inline]
    pub fn set_pixel(&mut self, x: u32, y: u32, pixel: Pixel) {
        let i = self.offset(x, y);
        self.data[i..i + 4].copy_from_slice(&pixel);
    }

    /// Convert an 8-bit RGBA image, flattening any transparency onto white
    ///
    /// The result is fully opaque, which is what the scorer assumes about targets.
    pub fn from_rgba_image(img: &RgbaImage) -> Self {
        let (width, height) = img.dimensions();
        let mut data = Vec::with_capacity((width as usize) * (height as usize) * 4);

        for px in img.pixels() {
            let alpha = px[3] as f32 / 255.0;
            for c in 0..3 {
                let value = px[c] as f32 / 255.0;
                // Over a white background: c * a + 1 * (1 - a)
                data.push(value * alpha + (1.0 - alpha));
            }
            data.push(1.0);
        }

        Self {
            width,
            height,
            data,
        }
    }

    /// Convert any decoded image (see [`Canvas::from_rgba_image`])
    pub fn from_image(img: &DynamicImage) -> Self {
        Self::from_rgba_image(&img.to_rgba8())
    }

    /// Mean RGB over every pixel
    ///
    /// Used to seed both the working canvas and the output canvas, so the first
    /// strokes only need to correct deviations from the average.
    pub fn average_rgb(&self) -> [f32; 3] {
        let count = (self.width as usize) * (self.height as usize);
        if count == 0 {
            return [0.0; 3];
        }

        // Accumulate in f64: large canvases have millions of pixels
        let mut sum = [0.0f64; 3];
        for px in self.data.chunks_exact(4) {
            for c in 0..3 {
                sum[c] += px[c] as f64;
            }
        }

        sum.map(|s| (s / count as f64) as f32)
    }

    /// Quantize back to an 8-bit image for encoding
    pub fn to_rgba8(&self) -> RgbaImage {
        let mut img = RgbaImage::new(self.width, self.height);
        for (px, chunk) in img.pixels_mut().zip(self.data.chunks_exact(4)) {
            *px = Rgba(chunk_to_u8(chunk));
        }
        img
    }
}

fn chunk_to_u8(chunk: &[f32]) -> [u8; 4] {
    let mut out = [0u8; 4];
    for (o, &v) in out.iter_mut().zip(chunk) {
        *o = (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    }
    out
}

/// Dimensions that make the shorter side equal `shorter`, keeping the aspect ratio
pub fn shorter_side_dimensions(width: u32, height: u32, shorter: u32) -> (u32, u32) {
    if width <= height {
        let h = (height as f64 * shorter as f64 / width.max(1) as f64).round() as u32;
        (shorter, h.max(1))
    } else {
        let w = (width as f64 * shorter as f64 / height.max(1) as f64).round() as u32;
        (w.max(1), shorter)
    }
}

/// Load a target image from disk at computation resolution
///
/// The image is resized so its shorter side equals `computation_size`, then
/// flattened onto white.
pub fn load_target<P: AsRef<Path>>(path: P, computation_size: u32) -> Result<Canvas> {
    let img = image::open(path)?;
    Ok(prepare_target(&img, computation_size))
}

/// Resize an already-decoded image for use as a target
pub fn prepare_target(img: &DynamicImage, computation_size: u32) -> Canvas {
    let (w, h) = shorter_side_dimensions(img.width(), img.height(), computation_size);
    let resized = image::imageops::resize(&img.to_rgba8(), w, h, FilterType::Triangle);
    Canvas::from_rgba_image(&resized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filled_canvas() {
        let canvas = Canvas::filled(3, 5, [0.1, 0.2, 0.3, 1.0]);
        assert_eq!(canvas.width(), 5);
        assert_eq!(canvas.height(), 3);
        assert_eq!(canvas.data().len(), 5 * 3 * 4);
        assert_eq!(canvas.pixel(4, 2), [0.1, 0.2, 0.3, 1.0]);
    }

    #[test]
    fn test_transparency_flattens_to_white() {
        let mut img = RgbaImage::from_pixel(2, 1, Rgba([0, 0, 0, 255]));
        img.put_pixel(1, 0, Rgba([0, 0, 0, 0]));

        let canvas = Canvas::from_rgba_image(&img);
        assert_eq!(canvas.pixel(0, 0), [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(canvas.pixel(1, 0), [1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_average_rgb() {
        let mut canvas = Canvas::with_color(2, 2, [0.0, 0.0, 0.0]);
        canvas.set_pixel(0, 0, [1.0, 1.0, 1.0, 1.0]);
        canvas.set_pixel(1, 1, [1.0, 0.0, 0.0, 1.0]);

        let avg = canvas.average_rgb();
        assert!((avg[0] - 0.5).abs() < 1e-6);
        assert!((avg[1] - 0.25).abs() < 1e-6);
        assert!((avg[2] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_to_rgba8_round_trip_of_extremes() {
        let canvas = Canvas::filled(1, 1, [1.0, 0.0, 1.5, -0.2]);
        let img = canvas.to_rgba8();
        assert_eq!(img.get_pixel(0, 0), &Rgba([255, 0, 255, 0]));
    }

    #[test]
    fn test_shorter_side_dimensions() {
        assert_eq!(shorter_side_dimensions(400, 200, 100), (200, 100));
        assert_eq!(shorter_side_dimensions(300, 600, 150), (150, 300));
        assert_eq!(shorter_side_dimensions(50, 50, 20), (20, 20));
    }

    #[test]
    fn test_prepare_target_resizes() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            80,
            40,
            Rgba([10, 20, 30, 255]),
        ));
        let target = prepare_target(&img, 20);
        assert_eq!((target.width(), target.height()), (40, 20));
    }
}

// Image types for decoding brush textures
use image::RgbaImage;

use std::path::Path;
use std::sync::Arc;

use crate::error::{PaintError, Result};
use crate::geometry::Rectangle;

/// Alpha below which a texture sample does not count toward the stroke color
pub const COLOR_SAMPLE_ALPHA: f32 = 0.2;

/// A brush texture: `H × W × 2` of (grayscale intensity, alpha)
///
/// Loaded once and then shared read-only between strokes and threads,
/// so every consumer holds it behind an `Arc`.
#[derive(Clone, Debug, PartialEq)]
pub struct TextureMask {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl TextureMask {
    /// Build a mask from an 8-bit image
    ///
    /// Intensity is the luminance pre-multiplied by the pixel's alpha. Alpha is
    /// kept as drawn; stroke opacity is applied when painting, not here.
    pub fn from_rgba_image(img: &RgbaImage) -> Self {
        let (width, height) = img.dimensions();
        let mut data = Vec::with_capacity((width as usize) * (height as usize) * 2);

        for px in img.pixels() {
            let alpha = px[3] as f32 / 255.0;
            let luma = (0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32) / 255.0;
            data.push(luma * alpha);
            data.push(alpha);
        }

        Self {
            width,
            height,
            data,
        }
    }

    /// A fully opaque white rectangle of the given size
    pub fn solid(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: [1.0, 1.0].repeat((width as usize) * (height as usize)),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    fn texel(&self, x: u32, y: u32) -> (f32, f32) {
        let i = ((y as usize) * (self.width as usize) + x as usize) * 2;
        (self.data[i], self.data[i + 1])
    }

    /// Bilinearly sample (intensity, alpha) at texture coordinates `(u, v)`
    ///
    /// Returns `None` outside `[0, width) × [0, height)`. Neighbours past the
    /// last row/column are clamped to the edge.
    pub fn sample(&self, u: f32, v: f32) -> Option<(f32, f32)> {
        if !(u >= 0.0 && v >= 0.0 && u < self.width as f32 && v < self.height as f32) {
            return None;
        }

        let x0 = u.floor() as u32;
        let y0 = v.floor() as u32;
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);
        let fx = u - x0 as f32;
        let fy = v - y0 as f32;

        let (g00, a00) = self.texel(x0, y0);
        let (g10, a10) = self.texel(x1, y0);
        let (g01, a01) = self.texel(x0, y1);
        let (g11, a11) = self.texel(x1, y1);

        let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
        let grey = lerp(lerp(g00, g10, fx), lerp(g01, g11, fx), fy);
        let alpha = lerp(lerp(a00, a10, fx), lerp(a01, a11, fx), fy);

        Some((grey, alpha))
    }
}

/// Maps canvas pixels into the texture space of a stroke
///
/// A pixel is translated to the stroke's center, rotated by `-θ`, scaled from
/// stroke size to texture size, and offset by half the texture.
#[derive(Clone, Copy, Debug)]
pub struct TextureMapping {
    center_x: f32,
    center_y: f32,
    sin: f32,
    cos: f32,
    scale_x: f32,
    scale_y: f32,
    half_w: f32,
    half_h: f32,
}

impl TextureMapping {
    pub fn new(rect: &Rectangle, texture: &TextureMask) -> Self {
        let (sin, cos) = rect.theta.sin_cos();
        let tw = texture.width() as f32;
        let th = texture.height() as f32;

        // A zero-sized stroke maps everything off the texture
        let scale = |t: f32, s: f32| if s > 0.0 { t / s } else { f32::INFINITY };

        Self {
            center_x: rect.center_x as f32,
            center_y: rect.center_y as f32,
            sin,
            cos,
            scale_x: scale(tw, rect.width),
            scale_y: scale(th, rect.height),
            half_w: tw / 2.0,
            half_h: th / 2.0,
        }
    }

    /// Texture coordinates for canvas pixel `(x, y)`
    #[inline]
    pub fn to_texture(&self, x: i32, y: i32) -> (f32, f32) {
        let dx = x as f32 - self.center_x;
        let dy = y as f32 - self.center_y;

        // Inverse rotation
        let rx = dx * self.cos + dy * self.sin;
        let ry = -dx * self.sin + dy * self.cos;

        (rx * self.scale_x + self.half_w, ry * self.scale_y + self.half_h)
    }
}

/// All textures available to a painting, addressed by index
#[derive(Clone, Debug)]
pub struct TextureSet {
    masks: Vec<Arc<TextureMask>>,
}

impl TextureSet {
    /// Wrap already-built masks
    ///
    /// Fails if the set is empty or any mask has no pixels, so bad inputs are
    /// caught before a single stroke is optimized.
    pub fn new(masks: Vec<TextureMask>) -> Result<Self> {
        if masks.is_empty() {
            return Err(PaintError::NoTextures);
        }
        if let Some(index) = masks.iter().position(|m| m.width == 0 || m.height == 0) {
            return Err(PaintError::EmptyTexture { index });
        }

        Ok(Self {
            masks: masks.into_iter().map(Arc::new).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.masks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.masks.is_empty()
    }

    /// Look up a texture by id
    pub fn get(&self, id: usize) -> Result<&Arc<TextureMask>> {
        self.masks.get(id).ok_or(PaintError::UnknownTexture(id))
    }

    /// Check that every id refers to a loaded texture
    pub fn check_ids(&self, ids: &[usize]) -> Result<()> {
        match ids.iter().find(|&&id| id >= self.masks.len()) {
            Some(&id) => Err(PaintError::UnknownTexture(id)),
            None => Ok(()),
        }
    }
}

/// Load every texture file, failing on the first one that cannot be read
pub fn load_textures<P: AsRef<Path>>(paths: &[P]) -> Result<TextureSet> {
    let masks = paths
        .iter()
        .map(|path| {
            let img = image::open(path)?.to_rgba8();
            Ok(TextureMask::from_rgba_image(&img))
        })
        .collect::<Result<Vec<_>>>()?;

    TextureSet::new(masks)
}

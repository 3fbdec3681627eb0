use crate::canvas::{Canvas, Pixel};
use crate::geometry::{Rectangle, ScanlineTable};
use crate::texture::{TextureMapping, TextureMask};

/// How a stroke's color interacts with its texture's intensity channel
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Shading {
    /// Paint the flat stroke color; the texture contributes only shape and alpha
    #[default]
    Flat,
    /// Darken the color by the texture's grayscale intensity
    Textured,
}

impl Shading {
    pub fn from_flag(shade_with_texture: bool) -> Self {
        if shade_with_texture {
            Shading::Textured
        } else {
            Shading::Flat
        }
    }

    #[inline]
    pub(crate) fn apply(self, rgb: [f32; 3], grey: f32) -> [f32; 3] {
        match self {
            Shading::Flat => rgb,
            Shading::Textured => rgb.map(|c| c * grey),
        }
    }
}

/// A texture stretched over a rectangle
#[derive(Clone, Copy, Debug)]
pub struct TexturePlacement<'a> {
    pub mask: &'a TextureMask,
    pub rect: Rectangle,
    pub shading: Shading,
}

impl<'a> TexturePlacement<'a> {
    pub fn new(mask: &'a TextureMask, rect: Rectangle, shading: Shading) -> Self {
        Self {
            mask,
            rect,
            shading,
        }
    }
}

/// Straight (non-premultiplied) alpha-over of a foreground color onto a background pixel
///
/// Returns `None` when both alphas are zero: the result is undefined there and
/// the caller should leave the pixel alone.
#[inline]
pub fn alpha_blend(fg_rgb: [f32; 3], fg_alpha: f32, bg: Pixel) -> Option<Pixel> {
    let bg_alpha = bg[3];
    if fg_alpha == 0.0 && bg_alpha == 0.0 {
        return None;
    }

    let bg_weight = bg_alpha * (1.0 - fg_alpha);
    let out_alpha = fg_alpha + bg_weight;

    let mut out = [0.0; 4];
    for c in 0..3 {
        out[c] = (fg_rgb[c] * fg_alpha + bg[c] * bg_weight) / out_alpha;
    }
    out[3] = out_alpha;
    Some(out)
}

/// One canvas pixel under a stroke, with what the texture says about it
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct StrokeSample {
    pub x: u32,
    pub y: u32,
    /// Texture intensity (1.0 for untextured strokes)
    pub grey: f32,
    /// Mask alpha alone, before the stroke alpha is applied
    pub mask_alpha: f32,
    /// Foreground alpha: mask alpha times the stroke alpha
    pub alpha: f32,
}

/// Visit every pixel of a stroke
///
/// Pixels that map outside the texture are skipped. This is the single place
/// where the stroke footprint is turned into per-pixel coverage, so the
/// compositor and the scorer can never disagree about what a stroke covers.
pub(crate) fn for_each_stroke_pixel<F>(
    table: &ScanlineTable,
    alpha: f32,
    texture: Option<&TexturePlacement<'_>>,
    mut visit: F,
) where
    F: FnMut(StrokeSample),
{
    let mapping = texture.map(|t| (t.mask, TextureMapping::new(&t.rect, t.mask)));

    for (y, left, right) in table.covered_rows() {
        for x in left..=right {
            let (grey, mask_alpha) = match &mapping {
                Some((mask, mapping)) => {
                    let (u, v) = mapping.to_texture(x, y);
                    match mask.sample(u, v) {
                        Some(sample) => sample,
                        None => continue,
                    }
                }
                None => (1.0, 1.0),
            };
            visit(StrokeSample {
                x: x as u32,
                y: y as u32,
                grey,
                mask_alpha,
                alpha: mask_alpha * alpha,
            });
        }
    }
}

/// Draw a stroke onto a canvas
///
/// Every valid `(x, y)` of the scanline table is alpha-over composited with
/// `color_rgb`. With a texture, the foreground alpha at each pixel is the
/// sampled mask alpha times `alpha`.
///
/// **Rust Concept: `&mut` for in-place updates**
/// The same routine paints the real canvas and throwaway preview copies.
/// The caller decides which by choosing what to lend us.
pub fn composite(
    canvas: &mut Canvas,
    table: &ScanlineTable,
    color_rgb: [f32; 3],
    alpha: f32,
    texture: Option<&TexturePlacement<'_>>,
) {
    let shading = texture.map_or(Shading::Flat, |t| t.shading);

    for_each_stroke_pixel(table, alpha, texture, |s| {
        let rgb = shading.apply(color_rgb, s.grey);
        if let Some(out) = alpha_blend(rgb, s.alpha, canvas.pixel(s.x, s.y)) {
            canvas.set_pixel(s.x, s.y, out);
        }
    });
}

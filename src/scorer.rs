// Scoring a candidate stroke against the target
//
// The score of a placement is how much squared RGB error it would remove if it
// were painted right now. Nothing here touches the canvas: the hill-climber
// scores thousands of candidates per stroke and only the winner is committed.

use crate::canvas::Canvas;
use crate::compositor::{alpha_blend, for_each_stroke_pixel, Shading, TexturePlacement};
use crate::geometry::{scan_polygon, Rectangle, ScanlineTable};
use crate::texture::{TextureMask, COLOR_SAMPLE_ALPHA};

/// Score given to placements too small (or too far off-canvas) to judge
///
/// Lower than every real score, so any placement that covers pixels beats it.
pub const NO_IMPROVEMENT: f32 = f32::NEG_INFINITY;

/// Placements covering fewer texture-mapped pixels than this are not scored
pub const MIN_COVERED_PIXELS: usize = 4;

/// A scored candidate stroke
///
/// Carries the scanline table and color it was scored with so that the winner
/// can be committed without redoing any work.
#[derive(Clone, Debug)]
pub struct Placement {
    pub rect: Rectangle,
    /// Squared RGB error removed; higher is better
    pub fitness: f32,
    /// Target color averaged under the stroke (the color it would be painted with)
    pub avg_rgb: [f32; 3],
    pub table: ScanlineTable,
    /// Number of canvas pixels that map onto the texture
    pub covered: usize,
}

impl Placement {
    /// Whether this placement can be compared meaningfully at all
    pub fn is_scored(&self) -> bool {
        self.fitness > NO_IMPROVEMENT
    }
}

#[inline]
fn squared_error(a: &[f32], b: &[f32]) -> f32 {
    (0..3).map(|c| (a[c] - b[c]) * (a[c] - b[c])).sum()
}

/// Score a candidate rectangle
///
/// # Arguments
/// * `rect` - Candidate stroke footprint
/// * `target` - Image we are approximating
/// * `mask` - Brush texture stretched over `rect`
/// * `canvas` - Current painting, read only
/// * `shading` - Whether the texture intensity tints the stroke color
/// * `alpha` - Stroke opacity in `[0, 1]`, multiplied into the mask alpha
///
/// The stroke color is the mask-alpha-weighted mean of the target under every
/// texture sample whose mask alpha exceeds [`COLOR_SAMPLE_ALPHA`]. The stroke
/// opacity does not enter that test, so faint strokes still pick up the target's
/// color. Fitness is `Σ ‖canvas − target‖² − ‖blend − target‖²` over the footprint.
/// A footprint with no sample above the threshold has no color and is not scored.
pub fn score(
    rect: Rectangle,
    target: &Canvas,
    mask: &TextureMask,
    canvas: &Canvas,
    shading: Shading,
    alpha: f32,
) -> Placement {
    let table = scan_polygon(&rect.polygon(), canvas.height(), canvas.width());

    let mut placement = Placement {
        rect,
        fitness: NO_IMPROVEMENT,
        avg_rgb: [0.0; 3],
        table,
        covered: 0,
    };
    if placement.table.is_empty() {
        return placement;
    }

    // Pass 1: gather the footprint and the weighted target color
    let texture = TexturePlacement::new(mask, rect, shading);
    let mut samples = Vec::with_capacity(placement.table.pixel_count());
    let mut color_sum = [0.0f32; 3];
    let mut weight_sum = 0.0f32;

    for_each_stroke_pixel(&placement.table, alpha, Some(&texture), |s| {
        if s.mask_alpha > COLOR_SAMPLE_ALPHA {
            let t = target.pixel(s.x, s.y);
            for c in 0..3 {
                color_sum[c] += t[c] * s.mask_alpha;
            }
            weight_sum += s.mask_alpha;
        }
        samples.push(s);
    });

    placement.covered = samples.len();
    if placement.covered < MIN_COVERED_PIXELS || weight_sum <= 0.0 {
        return placement;
    }
    placement.avg_rgb = color_sum.map(|c| c / weight_sum);

    // Pass 2: error removed by blending the average color over the canvas
    let mut fitness = 0.0f64;
    for s in &samples {
        let bg = canvas.pixel(s.x, s.y);
        let t = target.pixel(s.x, s.y);
        let rgb = shading.apply(placement.avg_rgb, s.grey);
        let blended = alpha_blend(rgb, s.alpha, bg).unwrap_or(bg);

        let before = squared_error(&bg, &t);
        let after = squared_error(&blended, &t);
        fitness += (before - after) as f64;
    }
    placement.fitness = fitness as f32;

    placement
}

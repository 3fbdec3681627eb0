// Random number generation - every function takes the RNG from the caller so that
// seeded runs (and tests) are reproducible
use rand::Rng;

use std::f32::consts::PI;
use std::fmt;
use std::sync::Arc;

use crate::geometry::Rectangle;

/// Largest translation step in pixels, along each axis
pub const TRANSLATE_STEP: i32 = 15;

/// Scale factors are drawn from `[1 - SCALE_STEP, 1 + SCALE_STEP]`
pub const SCALE_STEP: f32 = 0.2;

/// Largest free rotation step in radians
pub const ROTATE_STEP: f32 = 0.8;

/// Fraction of the gap to the field direction closed by one field-guided rotation
pub const FIELD_PULL: f32 = 0.5;

/// Random wobble added around the field direction
pub const FIELD_JITTER: f32 = 0.1;

/// Signature of a vector field: offset from the field center → direction `(f, g)`
pub type FieldFn = dyn Fn(f32, f32) -> (f32, f32) + Send + Sync;

/// A direction field over the canvas that biases stroke rotation
///
/// Strokes placed under a field tend to line up with it, which gives paintings a
/// sense of flow (for example, every stroke pointing at one spot).
///
/// **Rust Concept: Trait objects behind `Arc`**
/// The field function is any closure, stored as `Arc<dyn Fn ...>`.
/// `Arc` makes the field cheap to clone into each batch worker, and the
/// `Send + Sync` bounds let the compiler prove that sharing it across threads is safe.
#[derive(Clone)]
pub struct VectorField {
    center: (f32, f32),
    field_fn: Arc<FieldFn>,
}

impl fmt::Debug for VectorField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Closures have no useful Debug output
        f.debug_struct("VectorField")
            .field("center", &self.center)
            .finish_non_exhaustive()
    }
}

impl VectorField {
    /// Build a field from any direction function
    pub fn new<F>(center: (f32, f32), field_fn: F) -> Self
    where
        F: Fn(f32, f32) -> (f32, f32) + Send + Sync + 'static,
    {
        Self {
            center,
            field_fn: Arc::new(field_fn),
        }
    }

    /// Every direction points toward the center
    pub fn radial_sink(center: (f32, f32)) -> Self {
        Self::new(center, |x, y| (-x, -y))
    }

    /// Every direction points away from the center
    pub fn radial_source(center: (f32, f32)) -> Self {
        Self::new(center, |x, y| (x, y))
    }

    /// Directions circle around the center
    pub fn swirl(center: (f32, f32)) -> Self {
        Self::new(center, |x, y| (-y, x))
    }

    pub fn center(&self) -> (f32, f32) {
        self.center
    }

    /// Same field, re-centered (used to give each animation frame its own focus)
    pub fn with_center(&self, center: (f32, f32)) -> Self {
        Self {
            center,
            field_fn: Arc::clone(&self.field_fn),
        }
    }

    /// Preferred stroke angle at canvas point `(x, y)`
    ///
    /// Returns 0 where the field vanishes.
    pub fn angle_at(&self, x: f32, y: f32) -> f32 {
        let (f, g) = (self.field_fn)(x - self.center.0, y - self.center.1);
        if f == 0.0 && g == 0.0 {
            0.0
        } else {
            g.atan2(f)
        }
    }
}

/// Wrap any angle into `[-π, π)`
pub fn wrap_angle(theta: f32) -> f32 {
    (theta + PI).rem_euclid(2.0 * PI) - PI
}

/// Propose a fresh random stroke
///
/// The stroke starts `initial_width` wide with the texture's aspect ratio.
/// Without a field its angle is uniform; with one it follows the field at
/// the chosen center, give or take [`FIELD_JITTER`].
pub fn random_rect(
    canvas_h: u32,
    canvas_w: u32,
    texture_h: u32,
    texture_w: u32,
    field: Option<&VectorField>,
    initial_width: f32,
    rng: &mut impl Rng,
) -> Rectangle {
    let center_x = rng.gen_range(0..canvas_w.max(1) as i32);
    let center_y = rng.gen_range(0..canvas_h.max(1) as i32);

    let height = initial_width * texture_h as f32 / texture_w.max(1) as f32;

    let theta = match field {
        Some(field) => wrap_angle(
            field.angle_at(center_x as f32, center_y as f32)
                + rng.gen_range(-FIELD_JITTER..=FIELD_JITTER),
        ),
        None => rng.gen_range(-PI..=PI),
    };

    Rectangle {
        center_x,
        center_y,
        height,
        width: initial_width,
        theta,
    }
}

/// Kinds of local change a mutation can make
///
/// Private: callers only ever ask for "a mutation", the kind is our business.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum MutationType {
    Translate, // Move the center
    Scale,     // Grow or shrink uniformly
    Rotate,    // Turn (toward the field, if there is one)
}

/// Return a copy of `rect` with exactly one property changed
///
/// The kind of change is chosen uniformly among translate, rotate and
/// (when `allow_scale`) scale.
pub fn mutate(
    rect: Rectangle,
    canvas_h: u32,
    canvas_w: u32,
    field: Option<&VectorField>,
    allow_scale: bool,
    rng: &mut impl Rng,
) -> Rectangle {
    let kind = if allow_scale {
        match rng.gen_range(0..3) {
            0 => MutationType::Translate,
            1 => MutationType::Scale,
            _ => MutationType::Rotate,
        }
    } else if rng.gen_bool(0.5) {
        MutationType::Translate
    } else {
        MutationType::Rotate
    };

    apply_mutation(kind, rect, canvas_h, canvas_w, field, rng)
}

fn apply_mutation(
    kind: MutationType,
    rect: Rectangle,
    canvas_h: u32,
    canvas_w: u32,
    field: Option<&VectorField>,
    rng: &mut impl Rng,
) -> Rectangle {
    match kind {
        MutationType::Translate => {
            let dx = rng.gen_range(-TRANSLATE_STEP..=TRANSLATE_STEP);
            let dy = rng.gen_range(-TRANSLATE_STEP..=TRANSLATE_STEP);
            Rectangle {
                center_x: (rect.center_x + dx).clamp(0, (canvas_w as i32 - 1).max(0)),
                center_y: (rect.center_y + dy).clamp(0, (canvas_h as i32 - 1).max(0)),
                ..rect
            }
        }
        MutationType::Scale => {
            let factor = rng.gen_range(1.0 - SCALE_STEP..=1.0 + SCALE_STEP);
            Rectangle {
                width: rect.width * factor,
                height: rect.height * factor,
                ..rect
            }
        }
        MutationType::Rotate => {
            let theta = match field {
                Some(field) => {
                    let preferred =
                        field.angle_at(rect.center_x as f32, rect.center_y as f32);
                    // Shortest way round to the preferred direction
                    let gap = wrap_angle(preferred - rect.theta);
                    rect.theta + FIELD_PULL * gap + rng.gen_range(-FIELD_JITTER..=FIELD_JITTER)
                }
                None => rect.theta + rng.gen_range(-ROTATE_STEP..=ROTATE_STEP),
            };
            Rectangle {
                theta: wrap_angle(theta),
                ..rect
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn base() -> Rectangle {
        Rectangle::new(50, 40, 20.0, 10.0, 0.5)
    }

    #[test]
    fn test_wrap_angle() {
        assert!((wrap_angle(PI + 0.1) - (-PI + 0.1)).abs() < 1e-5);
        assert!((wrap_angle(-PI - 0.1) - (PI - 0.1)).abs() < 1e-5);
        assert!((wrap_angle(0.3) - 0.3).abs() < 1e-6);
        assert!((wrap_angle(0.3 + 4.0 * PI) - 0.3).abs() < 1e-4);
    }

    #[test]
    fn test_translate_changes_only_center() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..200 {
            let out = apply_mutation(MutationType::Translate, base(), 80, 100, None, &mut rng);
            assert!((out.center_x - 50).abs() <= TRANSLATE_STEP);
            assert!((out.center_y - 40).abs() <= TRANSLATE_STEP);
            assert_eq!(out.width, 20.0);
            assert_eq!(out.height, 10.0);
            assert_eq!(out.theta, 0.5);
        }
    }

    #[test]
    fn test_translate_clamps_to_canvas() {
        let mut rng = StdRng::seed_from_u64(2);
        let corner = Rectangle::new(0, 0, 5.0, 5.0, 0.0);
        for _ in 0..200 {
            let out = apply_mutation(MutationType::Translate, corner, 10, 10, None, &mut rng);
            assert!((0..10).contains(&out.center_x));
            assert!((0..10).contains(&out.center_y));
        }
    }

    #[test]
    fn test_translate_on_empty_canvas_pins_to_origin() {
        let mut rng = StdRng::seed_from_u64(2);
        for _ in 0..50 {
            let out = apply_mutation(MutationType::Translate, base(), 0, 0, None, &mut rng);
            assert_eq!((out.center_x, out.center_y), (0, 0));
        }
    }

    #[test]
    fn test_scale_changes_only_size() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..200 {
            let out = apply_mutation(MutationType::Scale, base(), 80, 100, None, &mut rng);
            let factor = out.width / 20.0;
            assert!((0.8 - 1e-5..=1.2 + 1e-5).contains(&factor));
            assert!((out.height / 10.0 - factor).abs() < 1e-5, "aspect ratio drifted");
            assert_eq!((out.center_x, out.center_y, out.theta), (50, 40, 0.5));
        }
    }

    #[test]
    fn test_rotate_changes_only_angle() {
        let mut rng = StdRng::seed_from_u64(4);
        for _ in 0..200 {
            let out = apply_mutation(MutationType::Rotate, base(), 80, 100, None, &mut rng);
            assert!((out.theta - 0.5).abs() <= ROTATE_STEP + 1e-5);
            assert_eq!((out.center_x, out.center_y), (50, 40));
            assert_eq!((out.width, out.height), (20.0, 10.0));
        }
    }

    #[test]
    fn test_rotation_wraps() {
        let mut rng = StdRng::seed_from_u64(5);
        let edge = Rectangle::new(5, 5, 4.0, 4.0, PI - 0.01);
        for _ in 0..200 {
            let out = apply_mutation(MutationType::Rotate, edge, 10, 10, None, &mut rng);
            assert!(out.theta >= -PI && out.theta <= PI);
        }
    }

    #[test]
    fn test_field_rotation_moves_toward_field() {
        let mut rng = StdRng::seed_from_u64(6);
        // Sink centered left of the stroke: preferred angle is π (pointing left)
        let field = VectorField::radial_sink((0.0, 40.0));
        let rect = Rectangle::new(50, 40, 20.0, 10.0, PI / 2.0);

        let out = apply_mutation(MutationType::Rotate, rect, 80, 100, Some(&field), &mut rng);
        // Halfway from π/2 to π, give or take the jitter
        let expected = 0.75 * PI;
        assert!(
            (out.theta - expected).abs() <= FIELD_JITTER + 1e-5,
            "theta {} not near {}",
            out.theta,
            expected
        );
    }

    #[test]
    fn test_mutate_changes_exactly_one_property() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..300 {
            let out = mutate(base(), 80, 100, None, false, &mut rng);
            let moved = out.center_x != 50 || out.center_y != 40;
            let turned = out.theta != 0.5;
            // Scaling is disabled
            assert_eq!((out.width, out.height), (20.0, 10.0));
            assert!(!(moved && turned));
        }
    }

    #[test]
    fn test_field_angle() {
        let field = VectorField::radial_source((10.0, 10.0));
        assert!((field.angle_at(20.0, 10.0) - 0.0).abs() < 1e-6);
        assert!((field.angle_at(10.0, 20.0) - PI / 2.0).abs() < 1e-6);
        // Zero vector at the center
        assert_eq!(field.angle_at(10.0, 10.0), 0.0);

        let moved = field.with_center((0.0, 0.0));
        assert_eq!(moved.center(), (0.0, 0.0));
        assert!((moved.angle_at(0.0, 5.0) - PI / 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_random_rect_shape() {
        let mut rng = StdRng::seed_from_u64(8);
        for _ in 0..100 {
            let rect = random_rect(30, 40, 50, 100, None, 12.0, &mut rng);
            assert!((0..40).contains(&rect.center_x));
            assert!((0..30).contains(&rect.center_y));
            assert_eq!(rect.width, 12.0);
            assert_eq!(rect.height, 6.0);
            assert!(rect.theta >= -PI && rect.theta <= PI);
        }
    }

    #[test]
    fn test_random_rect_follows_field() {
        let mut rng = StdRng::seed_from_u64(9);
        let field = VectorField::new((0.0, 0.0), |_, _| (0.0, 1.0));
        for _ in 0..50 {
            let rect = random_rect(30, 40, 10, 10, Some(&field), 8.0, &mut rng);
            assert!((rect.theta - PI / 2.0).abs() <= FIELD_JITTER + 1e-5);
        }
    }
}

// Point type from imageproc - the same vertex type its polygon drawing uses
use imageproc::point::Point;

/// A rotated rectangle: the footprint of a single brush stroke
///
/// The center lives on the integer pixel grid, while size and angle are
/// continuous so that mutation can nudge them by small amounts.
///
/// **Rust Concept: Copy types**
/// Every field is a plain number, so we can `#[derive(Copy)]`.
/// Passing a `Rectangle` by value just copies 20 bytes - no heap, no borrow
/// bookkeeping. The hill-climber leans on this heavily: each candidate is a
/// fresh copy of the current best.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rectangle {
    pub center_x: i32,
    pub center_y: i32,
    pub height: f32,
    pub width: f32,
    /// Rotation in radians, kept in `[-π, π]`
    pub theta: f32,
}

/// Four integer vertices of a rotated rectangle
///
/// Vertex 0 is the `(-w/2, -h/2)` corner; the rest follow in order around the shape,
/// so edge 0→1 runs along the width and edge 0→3 along the height.
pub type Polygon = [Point<i32>; 4];

impl Rectangle {
    pub fn new(center_x: i32, center_y: i32, width: f32, height: f32, theta: f32) -> Self {
        Self {
            center_x,
            center_y,
            height,
            width,
            theta,
        }
    }

    /// Shorthand for `rectangle_to_polygon(*self)`
    pub fn polygon(&self) -> Polygon {
        rectangle_to_polygon(*self)
    }
}

/// Rotate the rectangle's corners about its center and round them onto the pixel grid
///
/// No failure mode: any rectangle, even a zero-sized or off-canvas one,
/// produces four vertices.
pub fn rectangle_to_polygon(rect: Rectangle) -> Polygon {
    let (sin, cos) = rect.theta.sin_cos();
    let half_w = rect.width / 2.0;
    let half_h = rect.height / 2.0;

    // Corner offsets before rotation
    let corners = [
        (-half_w, -half_h),
        (half_w, -half_h),
        (half_w, half_h),
        (-half_w, half_h),
    ];

    // `map` on a fixed-size array returns another fixed-size array - no Vec needed
    corners.map(|(dx, dy)| {
        let x = dx * cos - dy * sin;
        let y = dx * sin + dy * cos;
        Point::new(
            rect.center_x + x.round() as i32,
            rect.center_y + y.round() as i32,
        )
    })
}

/// Recover the rectangle a polygon was built from
///
/// Width is the length of edge 0→1, height the length of edge 0→3, and the
/// angle is the direction of edge 0→1. Integer rounding of the vertices makes
/// this approximate, which is fine for re-rendering at another resolution.
pub fn polygon_to_rect(polygon: &Polygon) -> Rectangle {
    let [v0, v1, _, v3] = *polygon;

    let sum_x: i32 = polygon.iter().map(|p| p.x).sum();
    let sum_y: i32 = polygon.iter().map(|p| p.y).sum();
    let center_x = (sum_x as f32 / 4.0).round() as i32;
    let center_y = (sum_y as f32 / 4.0).round() as i32;

    let (ex, ey) = ((v1.x - v0.x) as f32, (v1.y - v0.y) as f32);
    let (hx, hy) = ((v3.x - v0.x) as f32, (v3.y - v0.y) as f32);

    Rectangle {
        center_x,
        center_y,
        width: ex.hypot(ey),
        height: hx.hypot(hy),
        theta: ey.atan2(ex),
    }
}

/// Scale every vertex about the origin, truncating toward zero
pub fn scale_polygon(polygon: &Polygon, factor: f32) -> Polygon {
    polygon.map(|p| Point::new((p.x as f32 * factor) as i32, (p.y as f32 * factor) as i32))
}

/// Sentinel stored for a row that the polygon does not cover
pub const EMPTY_ROW: (i32, i32) = (-1, -1);

/// Left/right pixel bounds of a polygon for every canvas row it spans
///
/// `rows[i]` belongs to canvas row `y_min + i`. A row with no valid span holds
/// [`EMPTY_ROW`] but still occupies its slot, so indices never drift.
#[derive(Clone, Debug, PartialEq)]
pub struct ScanlineTable {
    pub y_min: i32,
    pub y_max: i32,
    pub rows: Vec<(i32, i32)>,
}

impl ScanlineTable {
    /// Iterate `(y, left, right)` for every row that has a valid span
    ///
    /// **Rust Concept: `impl Iterator` return types**
    /// The caller gets a lazy iterator without us naming the (long, unnameable)
    /// adapter type. Nothing is allocated until someone pulls from it.
    pub fn covered_rows(&self) -> impl Iterator<Item = (i32, i32, i32)> + '_ {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row.0 >= 0)
            .map(move |(i, &(left, right))| (self.y_min + i as i32, left, right))
    }

    /// True when no row has a valid span (e.g. the polygon is fully off-canvas)
    pub fn is_empty(&self) -> bool {
        self.covered_rows().next().is_none()
    }

    /// Number of pixels covered by the valid spans
    pub fn pixel_count(&self) -> usize {
        self.covered_rows()
            .map(|(_, left, right)| (right - left + 1) as usize)
            .sum()
    }
}

/// Floor division for integers (Rust's `/` truncates toward zero)
fn floor_div(a: i32, b: i32) -> i32 {
    let q = a / b;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        q - 1
    } else {
        q
    }
}

/// Build the scanline table for a polygon on a `canvas_h × canvas_w` canvas
///
/// Each row is intersected with the polygon's edges using a half-open test
/// (`y_src < y <= y_dst` or the mirror), so a vertex shared by two edges is
/// counted once. Intersections are clamped into the canvas; a row whose two
/// intersections both fall off the same side is empty.
///
/// Only convex polygons are supported: at most two edges may cross any row.
/// A canvas with no pixels yields a table with no rows.
pub fn scan_polygon(polygon: &Polygon, canvas_h: u32, canvas_w: u32) -> ScanlineTable {
    if canvas_h == 0 || canvas_w == 0 {
        return ScanlineTable {
            y_min: 0,
            y_max: -1,
            rows: Vec::new(),
        };
    }

    let max_y = canvas_h as i32 - 1;
    let max_x = canvas_w as i32 - 1;

    let lowest = polygon.iter().map(|p| p.y).min().unwrap_or(0);
    let highest = polygon.iter().map(|p| p.y).max().unwrap_or(0);
    let y_min = lowest.clamp(0, max_y.max(0));
    let y_max = highest.clamp(0, max_y.max(0));

    let rows = (y_min..=y_max)
        .map(|y| scan_row(polygon, y, max_x))
        .collect();

    ScanlineTable { y_min, y_max, rows }
}

/// Intersect one row with the polygon outline
fn scan_row(polygon: &Polygon, y: i32, max_x: i32) -> (i32, i32) {
    let mut hits = [0i32; 2];
    let mut count = 0;

    for i in 0..polygon.len() {
        let src = polygon[i];
        let dst = polygon[(i + 1) % polygon.len()];

        let crosses = (src.y < y && y <= dst.y) || (dst.y < y && y <= src.y);
        if !crosses {
            continue;
        }

        let dy = dst.y - src.y;
        hits[count] = if dy == 0 {
            src.x
        } else {
            src.x + floor_div((y - src.y) * (dst.x - src.x), dy)
        };
        count += 1;

        if count == 2 {
            break;
        }
    }

    if count < 2 {
        return EMPTY_ROW;
    }

    let [a, b] = hits;
    let both_left = a < 0 && b < 0;
    let both_right = a > max_x && b > max_x;
    if both_left || both_right {
        return EMPTY_ROW;
    }

    let a = a.clamp(0, max_x);
    let b = b.clamp(0, max_x);
    (a.min(b), a.max(b))
}

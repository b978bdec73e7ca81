use crate::types::{Point, Value};

// Return the interpolation factor t corresponding to iso_val
pub fn find_t(v0: Value, v1: Value, iso_val: Value) -> Value {
    (iso_val - v0) / (v1 - v0)
}

// Linear interpolation
pub fn lerp(a: Value, b: Value, t: Value) -> Value {
    a + (b - a) * t
}

// Linearly interpolate between two points by factor t
pub fn interpolate_points(p0: Point, p1: Point, t: Value) -> Point {
    Point::new(
        lerp(p0.x, p1.x, t),
        lerp(p0.y, p1.y, t),
        lerp(p0.z, p1.z, t),
    )
}

/// Finds where the isosurface crosses the edge `p0 → p1`.
///
/// Returns `None` when the edge has no usable crossing: equal end values, or a
/// non-finite `t` caused by NaN samples. Otherwise `t` is clamped to `[0, 1]` so the
/// point never leaves the edge.
pub fn interpolate_edge(
    p0: Point,
    p1: Point,
    v0: Value,
    v1: Value,
    iso_val: Value,
) -> Option<Point> {
    if v0 == v1 {
        return None;
    }

    let t = find_t(v0, v1, iso_val);
    if !t.is_finite() {
        return None;
    }

    Some(interpolate_points(p0, p1, t.clamp(0.0, 1.0)))
}

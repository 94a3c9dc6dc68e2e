//! Face normal helpers

use glam::Vec3;

/// Unit normal of a counter-clockwise triangle, +Z for degenerate input
pub fn calculate_triangle_normal(v0: [f32; 3], v1: [f32; 3], v2: [f32; 3]) -> [f32; 3] {
    let (a, b, c) = (Vec3::from(v0), Vec3::from(v1), Vec3::from(v2));
    let normal = (b - a).cross(c - a).normalize_or_zero();
    if normal == Vec3::ZERO {
        [0.0, 0.0, 1.0]
    } else {
        normal.to_array()
    }
}

use lidar_3d::{linalg, plane::PlaneEquation};

const AXIS_TOLERANCE: f64 = 1e-6;

/// Translation along `axis` that moves `plane` onto `points`.
///
/// The mean signed distance `t` of the points to the plane is the offset to
/// cover along the plane normal. Moving by `s * axis` changes that offset by
/// `s * dot(axis, n)`, so the shift is `t / dot(axis, n)`, which reduces to
/// `axis * t` when the axis is the plane normal. An axis lying in the plane
/// cannot change the offset and yields a zero translation.
///
/// # Arguments
///
/// * `points` - The points the plane should pass through.
/// * `plane` - The plane to move.
/// * `axis` - The unit direction of the motion.
pub fn optimal_translation(points: &[[f64; 3]], plane: &PlaneEquation, axis: &[f64; 3]) -> [f64; 3] {
    let Some(normal) = plane.unit_normal() else {
        return [0.0; 3];
    };
    if points.is_empty() {
        return [0.0; 3];
    }

    let along = linalg::dot_product3(axis, &normal);
    if along.abs() < AXIS_TOLERANCE {
        log::debug!("translation axis {axis:?} lies in the plane, skipping");
        return [0.0; 3];
    }

    let mean = points.iter().map(|p| plane.signed_distance(p)).sum::<f64>() / points.len() as f64;

    linalg::scale3(axis, mean / along)
}

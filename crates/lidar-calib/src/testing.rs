//! Synthetic fixture clouds for the unit tests.

use lidar_3d::{pointcloud::PointCloud, transforms::RigidTransform};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::StandardNormal;

/// Sample `f(u, v)` on a `nu x nv` grid with spacing `step`.
pub(crate) fn grid(f: impl Fn(f64, f64) -> [f64; 3], nu: usize, nv: usize, step: f64) -> PointCloud {
    PointCloud::from_points(grid_points(&f, nu, nv, step))
}

fn grid_points(f: &impl Fn(f64, f64) -> [f64; 3], nu: usize, nv: usize, step: f64) -> Vec<[f64; 3]> {
    let mut points = Vec::with_capacity(nu * nv);
    for i in 0..nu {
        for j in 0..nv {
            points.push(f(i as f64 * step, j as f64 * step));
        }
    }
    points
}

// Zero mean gaussian noise of standard deviation `sigma` on every coordinate.
fn add_noise(points: &mut [[f64; 3]], sigma: f64, seed: u64) {
    if sigma <= 0.0 {
        return;
    }
    let mut rng = StdRng::seed_from_u64(seed);
    for p in points.iter_mut() {
        for v in p.iter_mut() {
            let n: f64 = rng.sample(StandardNormal);
            *v += n * sigma;
        }
    }
}

/// Floor z = 0 and a wall through the y axis leaning `wall_deg` away from it.
fn floor_and_wall(wall_deg: f64) -> Vec<[f64; 3]> {
    let (sin, cos) = wall_deg.to_radians().sin_cos();
    let mut points = grid_points(&|u, v| [u, v, 0.0], 31, 31, 0.1);
    points.extend(grid_points(&|u, v| [v * cos, u, v * sin], 26, 21, 0.1));
    points
}

/// Unit normal of the wall of [`tilted_wall_fixture`].
pub(crate) fn wall_normal(wall_deg: f64) -> [f64; 3] {
    let (sin, cos) = wall_deg.to_radians().sin_cos();
    [sin, 0.0, -cos]
}

/// Three faces sharing the origin corner, the wall at `wall_deg` to the floor.
///
/// The floor z = 0 is the largest face, then the wall, then the side y = 0.
/// Gaussian noise of standard deviation `sigma` is added to every coordinate.
pub(crate) fn tilted_wall_fixture(wall_deg: f64, sigma: f64, seed: u64) -> PointCloud {
    let mut points = floor_and_wall(wall_deg);
    points.extend(grid_points(&|u, v| [u, 0.0, v], 21, 16, 0.1));
    add_noise(&mut points, sigma, seed);
    PointCloud::from_points(points)
}

/// Three orthogonal faces of distinct sizes sharing the origin corner.
///
/// Face z = 0 is the largest, then x = 0, then y = 0.
pub(crate) fn corner_fixture(sigma: f64, seed: u64) -> PointCloud {
    tilted_wall_fixture(90.0, sigma, seed)
}

/// Only the floor z = 0 and the wall x = 0.
pub(crate) fn two_face_fixture(sigma: f64, seed: u64) -> PointCloud {
    let mut points = floor_and_wall(90.0);
    add_noise(&mut points, sigma, seed);
    PointCloud::from_points(points)
}

/// A dominant face z = 0, a smaller parallel face z = 1.2 and a face x = 0.
pub(crate) fn parallel_decoy_fixture() -> PointCloud {
    let mut points = grid_points(&|u, v| [u, v, 0.0], 31, 31, 0.1);
    points.extend(grid_points(&|u, v| [1.0 + u, v, 1.2], 21, 31, 0.1));
    points.extend(grid_points(&|u, v| [0.0, u, v], 16, 31, 0.1));
    PointCloud::from_points(points)
}

/// A rigid transform of about 20 degrees with a small offset.
pub(crate) fn sensor_offset() -> RigidTransform {
    let rotation = lidar_3d::transforms::axis_angle_to_rotation_matrix(
        &[0.3, -0.5, 0.8],
        20f64.to_radians(),
    )
    .expect("non-zero axis");
    RigidTransform::from_parts(&rotation, &[0.3, -0.2, 0.1])
}

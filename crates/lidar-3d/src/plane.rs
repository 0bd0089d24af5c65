use rand::prelude::*;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::linalg;
use crate::pointcloud::PointCloud;

/// Errors returned by the plane segmentation.
#[derive(thiserror::Error, Debug)]
pub enum PlaneFitError {
    /// Not enough points to draw a minimal sample.
    #[error("Need at least {required} points, got {got}")]
    InsufficientPoints {
        /// Minimum number of points for the sampler.
        required: usize,
        /// Number of points in the cloud.
        got: usize,
    },
    /// RANSAC did not find a plane with enough support.
    #[error("RANSAC failed to find a plane with at least {min_inliers} inliers (best: {best})")]
    NoConsensus {
        /// Minimum inliers required.
        min_inliers: usize,
        /// Best inlier count found.
        best: usize,
    },
    /// The plane normal has zero length.
    #[error("Degenerate plane: the normal has zero length")]
    DegeneratePlane,
}

/// Plane `a*x + b*y + c*z + d = 0`.
///
/// The normal `(a, b, c)` is not required to be unit length.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaneEquation {
    /// x coefficient.
    pub a: f64,
    /// y coefficient.
    pub b: f64,
    /// z coefficient.
    pub c: f64,
    /// Offset.
    pub d: f64,
}

impl PlaneEquation {
    /// Create a plane from its four coefficients.
    pub fn new(a: f64, b: f64, c: f64, d: f64) -> Self {
        Self { a, b, c, d }
    }

    /// Plane through `point` with the given `normal`.
    pub fn from_point_normal(point: &[f64; 3], normal: &[f64; 3]) -> Self {
        let d = -linalg::dot_product3(normal, point);
        Self::new(normal[0], normal[1], normal[2], d)
    }

    /// Plane through three points, `None` when they are collinear.
    pub fn from_points(p0: &[f64; 3], p1: &[f64; 3], p2: &[f64; 3]) -> Option<Self> {
        let mut n = [0.0; 3];
        linalg::cross_vec3(&linalg::sub3(p1, p0), &linalg::sub3(p2, p0), &mut n);
        let n = linalg::normalize3(&n, 1e-12)?;
        Some(Self::from_point_normal(p0, &n))
    }

    /// The raw normal `(a, b, c)`.
    #[inline]
    pub fn normal(&self) -> [f64; 3] {
        [self.a, self.b, self.c]
    }

    /// The normal scaled to unit length, `None` for a degenerate plane.
    pub fn unit_normal(&self) -> Option<[f64; 3]> {
        linalg::normalize3(&self.normal(), 1e-12)
    }

    /// Scale all coefficients so that the normal has unit length.
    pub fn normalized(&self) -> Option<Self> {
        let n = linalg::norm3(&self.normal());
        if n < 1e-12 {
            return None;
        }
        Some(Self::new(self.a / n, self.b / n, self.c / n, self.d / n))
    }

    /// Signed point-to-plane distance, normalised by the normal length.
    pub fn signed_distance(&self, p: &[f64; 3]) -> f64 {
        (linalg::dot_product3(&self.normal(), p) + self.d) / linalg::norm3(&self.normal())
    }

    /// Absolute point-to-plane distance.
    #[inline]
    pub fn distance(&self, p: &[f64; 3]) -> f64 {
        self.signed_distance(p).abs()
    }

    /// The same plane with the normal sign reversed.
    pub fn flipped(&self) -> Self {
        Self::new(-self.a, -self.b, -self.c, -self.d)
    }

    /// Angle between the two normals in degrees, in `[0, 180]`.
    pub fn angle_deg(&self, other: &Self) -> f64 {
        let n1 = linalg::norm3(&self.normal());
        let n2 = linalg::norm3(&other.normal());
        let cos = linalg::dot_product3(&self.normal(), &other.normal()) / (n1 * n2);
        cos.clamp(-1.0, 1.0).acos().to_degrees()
    }
}

/// Parameters for RANSAC plane segmentation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaneRansacParams {
    /// Maximum point-to-plane distance of an inlier.
    pub distance_threshold: f64,
    /// Number of points drawn per hypothesis.
    pub ransac_n: usize,
    /// Number of RANSAC iterations.
    pub num_iterations: usize,
    /// Minimum number of inliers required for acceptance.
    pub min_inliers: usize,
    /// Optional RNG seed for deterministic runs.
    pub random_seed: Option<u64>,
}

impl Default for PlaneRansacParams {
    fn default() -> Self {
        Self {
            distance_threshold: 0.05,
            ransac_n: 3,
            num_iterations: 1000,
            min_inliers: 3,
            random_seed: None,
        }
    }
}

/// Result of a plane segmentation.
#[derive(Debug, Clone)]
pub struct PlaneSegmentation {
    /// The fitted plane, with a unit normal.
    pub plane: PlaneEquation,
    /// Indices of the inlier points, in ascending order.
    pub inliers: Vec<usize>,
}

/// Segment the dominant plane of a point cloud with RANSAC.
///
/// Each hypothesis is built from `ransac_n` random points (a least squares fit
/// when more than three are drawn). The hypothesis with the most inliers wins,
/// ties broken by the lower distance sum. The winner is refined by a least
/// squares fit over its inliers.
///
/// # Arguments
///
/// * `cloud` - The point cloud to segment.
/// * `params` - The RANSAC parameters.
pub fn segment_plane(
    cloud: &PointCloud,
    params: &PlaneRansacParams,
) -> Result<PlaneSegmentation, PlaneFitError> {
    let points = cloud.points();
    let n = points.len();
    let sample_size = params.ransac_n.max(3);
    if n < sample_size {
        return Err(PlaneFitError::InsufficientPoints {
            required: sample_size,
            got: n,
        });
    }

    let mut rng = match params.random_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => {
            let mut tr = rand::rng();
            StdRng::from_rng(&mut tr)
        }
    };

    let mut best_model = None;
    let mut best_count = 0usize;
    let mut best_score = f64::INFINITY;

    for _ in 0..params.num_iterations {
        let sample = rand::seq::index::sample(&mut rng, n, sample_size);
        let model = if sample_size == 3 {
            PlaneEquation::from_points(
                &points[sample.index(0)],
                &points[sample.index(1)],
                &points[sample.index(2)],
            )
        } else {
            let subset = sample.iter().map(|i| points[i]).collect::<Vec<_>>();
            fit_plane_lstsq(&subset)
        };

        // collinear samples carry no plane
        let Some(model) = model else {
            continue;
        };

        let mut count = 0usize;
        let mut score = 0.0f64;
        for p in points {
            let d = model.distance(p);
            if d <= params.distance_threshold {
                count += 1;
                score += d;
            }
        }

        if count > best_count || (count == best_count && score < best_score) {
            best_model = Some(model);
            best_count = count;
            best_score = score;
        }
    }

    let model = match best_model {
        Some(m) if best_count >= params.min_inliers => m,
        _ => {
            return Err(PlaneFitError::NoConsensus {
                min_inliers: params.min_inliers,
                best: best_count,
            })
        }
    };

    let inliers = collect_inliers(points, &model, params.distance_threshold);

    // refine on the consensus set, keeping the RANSAC model if the refit loses support
    let inlier_points = inliers.iter().map(|&i| points[i]).collect::<Vec<_>>();
    let plane = match fit_plane_lstsq(&inlier_points) {
        Some(refined)
            if collect_inliers(points, &refined, params.distance_threshold).len()
                >= inliers.len() =>
        {
            refined
        }
        _ => model,
    };

    let inliers = collect_inliers(points, &plane, params.distance_threshold);

    log::debug!(
        "segment_plane: plane=({:.4}, {:.4}, {:.4}, {:.4}) inliers={}/{}",
        plane.a,
        plane.b,
        plane.c,
        plane.d,
        inliers.len(),
        n
    );

    Ok(PlaneSegmentation { plane, inliers })
}

fn collect_inliers(points: &[[f64; 3]], plane: &PlaneEquation, threshold: f64) -> Vec<usize> {
    points
        .iter()
        .enumerate()
        .filter(|(_, p)| plane.distance(p) <= threshold)
        .map(|(i, _)| i)
        .collect()
}

/// Least squares plane through a set of points.
///
/// The normal is the right singular vector of the smallest singular value of
/// the centred 3x3 scatter matrix. Returns `None` for fewer than three points
/// or a degenerate (collinear) set.
pub fn fit_plane_lstsq(points: &[[f64; 3]]) -> Option<PlaneEquation> {
    if points.len() < 3 {
        return None;
    }

    let inv_n = 1.0 / points.len() as f64;
    let centroid = points.iter().fold([0.0; 3], |acc, p| linalg::add3(&acc, p));
    let centroid = linalg::scale3(&centroid, inv_n);

    let mut scatter = [[0.0f64; 3]; 3];
    for p in points {
        let q = linalg::sub3(p, &centroid);
        for (r, row) in scatter.iter_mut().enumerate() {
            for (c, val) in row.iter_mut().enumerate() {
                *val += q[r] * q[c];
            }
        }
    }

    let mat = faer::Mat::<f64>::from_fn(3, 3, |i, j| scatter[i][j]);
    let svd = mat.svd();
    let s = svd.s_diagonal();

    // the two largest singular values span the plane
    if s.read(1) <= 1e-12 * s.read(0).max(1.0) {
        return None;
    }

    let v = svd.v().col(2);
    let normal = linalg::normalize3(&[v.read(0), v.read(1), v.read(2)], 1e-12)?;
    Some(PlaneEquation::from_point_normal(&centroid, &normal))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn grid_z(z: f64, side: usize, step: f64) -> Vec<[f64; 3]> {
        let mut points = Vec::with_capacity(side * side);
        for i in 0..side {
            for j in 0..side {
                points.push([i as f64 * step, j as f64 * step, z]);
            }
        }
        points
    }

    #[test]
    fn test_plane_equation_ops() {
        let plane = PlaneEquation::new(0.0, 0.0, 2.0, -2.0);
        assert_relative_eq!(plane.signed_distance(&[5.0, 5.0, 3.0]), 2.0);
        assert_relative_eq!(plane.distance(&[0.0, 0.0, -1.0]), 2.0);

        let unit = plane.normalized().unwrap();
        assert_relative_eq!(unit.c, 1.0);
        assert_relative_eq!(unit.d, -1.0);

        let f = plane.flipped();
        assert_eq!(f, PlaneEquation::new(-0.0, -0.0, -2.0, 2.0));
        assert_relative_eq!(plane.angle_deg(&f), 180.0);
        assert_relative_eq!(
            plane.angle_deg(&PlaneEquation::new(1.0, 0.0, 0.0, 0.0)),
            90.0
        );
    }

    #[test]
    fn test_from_points_collinear() {
        assert!(PlaneEquation::from_points(&[0.0; 3], &[1.0, 0.0, 0.0], &[2.0, 0.0, 0.0]).is_none());
    }

    #[test]
    fn test_fit_plane_lstsq() {
        let points = grid_z(1.5, 5, 0.5);
        let plane = fit_plane_lstsq(&points).unwrap();
        let n = plane.unit_normal().unwrap();
        assert_relative_eq!(n[2].abs(), 1.0, epsilon = 1e-9);
        for p in &points {
            assert_relative_eq!(plane.distance(p), 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_segment_plane_with_outliers() -> Result<(), Box<dyn std::error::Error>> {
        let mut points = grid_z(0.0, 20, 0.1);
        let num_plane = points.len();

        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            points.push([
                rng.random_range(0.0..2.0),
                rng.random_range(0.0..2.0),
                rng.random_range(0.5..2.0),
            ]);
        }

        let cloud = PointCloud::from_points(points);
        let params = PlaneRansacParams {
            random_seed: Some(0),
            ..Default::default()
        };
        let seg = segment_plane(&cloud, &params)?;

        assert_eq!(seg.inliers.len(), num_plane);
        assert!(seg.inliers.iter().all(|&i| i < num_plane));
        let n = seg.plane.unit_normal().unwrap();
        assert_relative_eq!(n[2].abs(), 1.0, epsilon = 1e-6);
        assert_relative_eq!(seg.plane.d, 0.0, epsilon = 1e-6);
        Ok(())
    }

    #[test]
    fn test_segment_plane_deterministic_with_seed() -> Result<(), Box<dyn std::error::Error>> {
        let mut points = grid_z(0.0, 10, 0.1);
        points.extend(
            grid_z(0.0, 8, 0.1)
                .into_iter()
                .map(|p| [0.0, p[0] + 0.05, p[1] + 0.1]),
        );
        let cloud = PointCloud::from_points(points);
        let params = PlaneRansacParams {
            random_seed: Some(42),
            ..Default::default()
        };
        let a = segment_plane(&cloud, &params)?;
        let b = segment_plane(&cloud, &params)?;
        assert_eq!(a.inliers, b.inliers);
        assert_eq!(a.plane, b.plane);
        Ok(())
    }

    #[test]
    fn test_segment_plane_errors() {
        let cloud = PointCloud::from_points(vec![[0.0; 3], [1.0, 0.0, 0.0]]);
        let res = segment_plane(&cloud, &PlaneRansacParams::default());
        assert!(matches!(
            res,
            Err(PlaneFitError::InsufficientPoints {
                required: 3,
                got: 2
            })
        ));

        let cloud = PointCloud::from_points(grid_z(0.0, 3, 1.0));
        let params = PlaneRansacParams {
            min_inliers: 100,
            random_seed: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            segment_plane(&cloud, &params),
            Err(PlaneFitError::NoConsensus { best: 9, .. })
        ));
    }
}

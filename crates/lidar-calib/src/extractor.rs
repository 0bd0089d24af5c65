use serde::{Deserialize, Serialize};

use lidar_3d::{
    linalg,
    plane::{segment_plane, PlaneEquation, PlaneFitError, PlaneRansacParams},
    pointcloud::PointCloud,
};

use crate::CalibError;

/// Number of fixture faces to extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaneCount {
    /// Two faces; the translation along their intersection line stays unobserved.
    Two,
    /// Three faces.
    Three,
}

/// Parameters of the fixture plane extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorParams {
    /// RANSAC parameters of every plane fit.
    pub ransac: PlaneRansacParams,
    /// Minimum number of points of the input cloud.
    pub min_points: usize,
    /// Points closer than this to an accepted or rejected plane are removed.
    pub band_distance: f64,
    /// Candidates closer than this angle (degrees) to plane 1 are duplicates.
    pub min_separation_deg: f64,
    /// Candidates further than this angle (degrees) from plane 1 are duplicates.
    pub max_separation_deg: f64,
    /// Number of rejected plane 2 candidates before giving up.
    pub max_plane_retries: usize,
    /// Number of faces to extract.
    pub plane_count: PlaneCount,
}

impl Default for ExtractorParams {
    fn default() -> Self {
        Self {
            ransac: PlaneRansacParams::default(),
            min_points: 10,
            band_distance: 0.5,
            min_separation_deg: 15.0,
            max_separation_deg: 160.0,
            max_plane_retries: 20,
            plane_count: PlaneCount::Three,
        }
    }
}

/// A fitted fixture face.
#[derive(Debug, Clone)]
pub struct Plane {
    /// Plane equation with a unit normal.
    pub equation: PlaneEquation,
    /// The points supporting the plane.
    pub inliers: PointCloud,
    /// Mean of the inliers.
    pub centroid: [f64; 3],
}

impl Plane {
    /// Create a plane from its equation and inliers.
    ///
    /// The equation is rescaled to a unit normal.
    pub fn new(equation: PlaneEquation, inliers: PointCloud) -> Result<Self, CalibError> {
        let equation = equation
            .normalized()
            .ok_or(PlaneFitError::DegeneratePlane)?;
        let centroid = inliers.centroid().ok_or(CalibError::InsufficientPoints {
            required: 1,
            got: 0,
        })?;
        Ok(Self {
            equation,
            inliers,
            centroid,
        })
    }

    /// The unit normal of the plane.
    #[inline]
    pub fn normal(&self) -> [f64; 3] {
        self.equation.normal()
    }

    /// The same plane with the normal sign reversed.
    pub fn flipped(&self) -> Self {
        Self {
            equation: self.equation.flipped(),
            inliers: self.inliers.clone(),
            centroid: self.centroid,
        }
    }
}

/// A line `point + s * direction`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Line3 {
    /// Point on the line closest to the origin.
    pub point: [f64; 3],
    /// Unit direction.
    pub direction: [f64; 3],
}

/// The fixture faces found in one point cloud.
#[derive(Debug, Clone)]
pub struct FixtureFeatures {
    /// The dominant face.
    pub plane1: Plane,
    /// The first face distinct from plane 1.
    pub plane2: Plane,
    /// The third face, when requested.
    pub plane3: Option<Plane>,
    /// Points left after all band removals.
    pub residual: PointCloud,
}

impl FixtureFeatures {
    /// Iterate over the extracted planes in order.
    pub fn planes(&self) -> impl Iterator<Item = &Plane> {
        [Some(&self.plane1), Some(&self.plane2), self.plane3.as_ref()]
            .into_iter()
            .flatten()
    }

    /// Intersection line of plane 1 and plane 2.
    ///
    /// The point is the minimum norm solution of the 2x3 system formed by the
    /// two plane equations.
    pub fn intersection_line(&self) -> Result<Line3, CalibError> {
        let p1 = &self.plane1.equation;
        let p2 = &self.plane2.equation;
        let (n1, n2) = (p1.normal(), p2.normal());

        let mut direction = [0.0; 3];
        linalg::cross_vec3(&n1, &n2, &mut direction);

        // x = A^T (A A^T)^-1 b with A = [n1; n2], b = [-d1; -d2]
        let g11 = linalg::dot_product3(&n1, &n1);
        let g12 = linalg::dot_product3(&n1, &n2);
        let g22 = linalg::dot_product3(&n2, &n2);
        let det = g11 * g22 - g12 * g12;
        if det.abs() < 1e-12 {
            return Err(CalibError::SingularSolve(format!(
                "plane 1 and plane 2 are parallel (det = {det:e})"
            )));
        }

        let (b1, b2) = (-p1.d, -p2.d);
        let l1 = (g22 * b1 - g12 * b2) / det;
        let l2 = (g11 * b2 - g12 * b1) / det;
        let point = linalg::add3(&linalg::scale3(&n1, l1), &linalg::scale3(&n2, l2));

        let direction = linalg::normalize3(&direction, 1e-12).ok_or_else(|| {
            CalibError::SingularSolve("plane normals have no cross product".to_string())
        })?;

        Ok(Line3 { point, direction })
    }
}

/// Finds the fixture faces in a point cloud.
#[derive(Debug, Clone, Default)]
pub struct PlaneExtractor {
    params: ExtractorParams,
}

impl PlaneExtractor {
    /// Create an extractor with the given parameters.
    pub fn new(params: ExtractorParams) -> Self {
        Self { params }
    }

    /// The extraction parameters.
    pub fn params(&self) -> &ExtractorParams {
        &self.params
    }

    /// Extract 2 or 3 distinct planes from `cloud`.
    ///
    /// Plane 1 is the dominant plane of the full cloud. Plane 2 is the first
    /// candidate whose angle to plane 1 lies within the separation band, each
    /// rejected candidate having its band removed before the next fit. Plane 3
    /// is fitted on what remains without any angle check.
    pub fn extract(&self, cloud: &PointCloud) -> Result<FixtureFeatures, CalibError> {
        let params = &self.params;
        if cloud.len() < params.min_points {
            return Err(CalibError::InsufficientPoints {
                required: params.min_points,
                got: cloud.len(),
            });
        }

        log::debug!(
            "extracting from {} points spanning {:?} to {:?}",
            cloud.len(),
            cloud.get_min_bound(),
            cloud.get_max_bound()
        );

        let mut num_fits = 0u64;

        let plane1 = self.fit(cloud, &mut num_fits)?;
        let mut remaining = self.remove_band(cloud, &plane1.equation)?;
        log::debug!(
            "plane 1: normal {:?}, {} inliers, {} points left",
            plane1.normal(),
            plane1.inliers.len(),
            remaining.len()
        );

        let mut rejected = 0usize;
        let plane2 = loop {
            if remaining.len() < params.ransac.ransac_n.max(3) {
                return Err(CalibError::PlaneNotDistinguishable { retries: rejected });
            }

            let candidate = self.fit(&remaining, &mut num_fits)?;
            let angle = candidate.equation.angle_deg(&plane1.equation);

            if self.is_distinct(&candidate.equation, &plane1.equation) {
                log::debug!("plane 2: angle to plane 1 {angle:.2} deg");
                break candidate;
            }

            rejected += 1;
            log::debug!("rejected candidate {rejected}: angle to plane 1 {angle:.2} deg");
            if rejected >= params.max_plane_retries {
                return Err(CalibError::PlaneNotDistinguishable { retries: rejected });
            }
            remaining = self.remove_band(&remaining, &candidate.equation)?;
        };
        remaining = self.remove_band(&remaining, &plane2.equation)?;

        let plane3 = match params.plane_count {
            PlaneCount::Two => None,
            PlaneCount::Three => {
                let plane3 = self.fit(&remaining, &mut num_fits)?;
                remaining = self.remove_band(&remaining, &plane3.equation)?;
                log::debug!(
                    "plane 3: angle to plane 1 {:.2} deg",
                    plane3.equation.angle_deg(&plane1.equation)
                );
                Some(plane3)
            }
        };

        log::info!(
            "extracted {} planes ({} rejected candidates, {} residual points)",
            2 + plane3.is_some() as usize,
            rejected,
            remaining.len()
        );

        Ok(FixtureFeatures {
            plane1,
            plane2,
            plane3,
            residual: remaining,
        })
    }

    /// Whether `candidate` is far enough from `reference` to be a new face.
    pub fn is_distinct(&self, candidate: &PlaneEquation, reference: &PlaneEquation) -> bool {
        let angle = candidate.angle_deg(reference);
        angle >= self.params.min_separation_deg && angle <= self.params.max_separation_deg
    }

    fn fit(&self, cloud: &PointCloud, num_fits: &mut u64) -> Result<Plane, CalibError> {
        // each fit of a seeded run draws from its own stream
        let ransac = PlaneRansacParams {
            random_seed: self
                .params
                .ransac
                .random_seed
                .map(|seed| seed.wrapping_add(*num_fits)),
            ..self.params.ransac.clone()
        };
        *num_fits += 1;

        let seg = segment_plane(cloud, &ransac)?;
        let inliers = cloud.select_by_index(&seg.inliers)?;
        Plane::new(seg.plane, inliers)
    }

    fn remove_band(
        &self,
        cloud: &PointCloud,
        plane: &PlaneEquation,
    ) -> Result<PointCloud, CalibError> {
        let mask = cloud
            .points()
            .iter()
            .map(|p| plane.distance(p) > self.params.band_distance)
            .collect::<Vec<_>>();
        Ok(cloud.select_by_mask(&mask)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use approx::assert_relative_eq;
    use rand::{seq::SliceRandom, SeedableRng};

    fn seeded(seed: u64) -> ExtractorParams {
        let mut params = ExtractorParams::default();
        params.ransac.random_seed = Some(seed);
        params
    }

    fn assert_axis(normal: &[f64; 3], axis: usize, tol_deg: f64) {
        let cos = normal[axis].abs() / linalg::norm3(normal);
        assert!(
            cos.clamp(-1.0, 1.0).acos().to_degrees() < tol_deg,
            "normal {normal:?} is not along axis {axis}"
        );
    }

    fn assert_normal(normal: &[f64; 3], expected: &[f64; 3], tol_deg: f64) {
        let cos = linalg::dot_product3(normal, expected).abs()
            / (linalg::norm3(normal) * linalg::norm3(expected));
        let angle = cos.clamp(-1.0, 1.0).acos().to_degrees();
        assert!(angle < tol_deg, "normal {normal:?} is {angle} deg from {expected:?}");
    }

    #[test]
    fn test_extract_three_faces() -> Result<(), Box<dyn std::error::Error>> {
        let cloud = testing::corner_fixture(0.005, 1);
        let features = PlaneExtractor::new(seeded(0)).extract(&cloud)?;

        assert_axis(&features.plane1.normal(), 2, 2.0);
        assert_axis(&features.plane2.normal(), 0, 2.0);
        let plane3 = features.plane3.as_ref().ok_or("missing plane 3")?;
        assert_axis(&plane3.normal(), 1, 2.0);
        assert_eq!(features.planes().count(), 3);

        for plane in features.planes() {
            assert_relative_eq!(linalg::norm3(&plane.normal()), 1.0, epsilon = 1e-9);
        }
        Ok(())
    }

    #[test]
    fn test_extract_independent_of_point_order() -> Result<(), Box<dyn std::error::Error>> {
        for cloud in [
            testing::corner_fixture(0.005, 1),
            testing::tilted_wall_fixture(80.0, 0.005, 1),
        ] {
            let mut points = cloud.points().to_vec();
            points.shuffle(&mut rand::rngs::StdRng::seed_from_u64(3));
            let shuffled = PointCloud::from_points(points);

            let a = PlaneExtractor::new(seeded(0)).extract(&cloud)?;
            let b = PlaneExtractor::new(seeded(11)).extract(&shuffled)?;
            assert_eq!(a.planes().count(), b.planes().count());
            for (pa, pb) in a.planes().zip(b.planes()) {
                let angle = pa.equation.angle_deg(&pb.equation);
                assert!(angle < 2.0 || angle > 178.0, "angle {angle}");
            }
        }
        Ok(())
    }

    #[test]
    fn test_extract_tilted_wall() -> Result<(), Box<dyn std::error::Error>> {
        for wall_deg in [80.0, 100.0] {
            let cloud = testing::tilted_wall_fixture(wall_deg, 0.005, 4);
            let features = PlaneExtractor::new(seeded(2)).extract(&cloud)?;

            assert_axis(&features.plane1.normal(), 2, 2.0);
            assert_normal(&features.plane2.normal(), &testing::wall_normal(wall_deg), 2.0);
            let plane3 = features.plane3.as_ref().ok_or("missing plane 3")?;
            assert_axis(&plane3.normal(), 1, 2.0);

            let angle = features.plane1.equation.angle_deg(&features.plane2.equation);
            let expected = 180.0 - wall_deg;
            assert!(
                (angle - expected).abs() < 2.0 || (angle - wall_deg).abs() < 2.0,
                "angle between floor and wall {angle}"
            );
        }
        Ok(())
    }

    #[test]
    fn test_extract_two_faces() -> Result<(), Box<dyn std::error::Error>> {
        let two = ExtractorParams {
            plane_count: PlaneCount::Two,
            ..seeded(0)
        };
        let cloud = testing::two_face_fixture(0.005, 2);
        let features = PlaneExtractor::new(two.clone()).extract(&cloud)?;

        assert_axis(&features.plane1.normal(), 2, 2.0);
        assert_axis(&features.plane2.normal(), 0, 2.0);
        assert!(features.plane3.is_none());
        assert_eq!(features.planes().count(), 2);
        assert!(features.residual.is_empty());

        // a third face is required but nothing is left to fit
        let res = PlaneExtractor::new(seeded(0)).extract(&cloud);
        assert!(matches!(
            res,
            Err(CalibError::PlaneFitFailed(
                PlaneFitError::InsufficientPoints { got: 0, .. }
            ))
        ));

        // on a three face fixture the third face is left in the residual
        let features = PlaneExtractor::new(two).extract(&testing::corner_fixture(0.0, 1))?;
        assert_eq!(features.planes().count(), 2);
        assert!(!features.residual.is_empty());
        Ok(())
    }

    #[test]
    fn test_identical_planes_are_not_distinct() {
        let extractor = PlaneExtractor::default();
        let plane = PlaneEquation::new(0.0, 0.0, 1.0, -0.3);
        assert!(!extractor.is_distinct(&plane, &plane));
        assert!(!extractor.is_distinct(&plane.flipped(), &plane));
        assert!(extractor.is_distinct(&PlaneEquation::new(1.0, 0.0, 0.0, 0.0), &plane));
    }

    #[test]
    fn test_parallel_candidate_is_rejected_and_retried() -> Result<(), Box<dyn std::error::Error>> {
        let cloud = testing::parallel_decoy_fixture();
        let params = ExtractorParams {
            plane_count: PlaneCount::Two,
            ..seeded(0)
        };
        let features = PlaneExtractor::new(params.clone()).extract(&cloud)?;
        assert_axis(&features.plane1.normal(), 2, 1.0);
        assert_axis(&features.plane2.normal(), 0, 1.0);

        let params = ExtractorParams {
            max_plane_retries: 1,
            ..params
        };
        let res = PlaneExtractor::new(params).extract(&cloud);
        assert!(matches!(
            res,
            Err(CalibError::PlaneNotDistinguishable { retries: 1 })
        ));
        Ok(())
    }

    #[test]
    fn test_single_plane_is_not_distinguishable() {
        let cloud = testing::grid(|u, v| [u, v, 0.0], 20, 20, 0.1);
        let res = PlaneExtractor::new(seeded(0)).extract(&cloud);
        assert!(matches!(
            res,
            Err(CalibError::PlaneNotDistinguishable { retries: 0 })
        ));
    }

    #[test]
    fn test_insufficient_points() {
        let cloud = PointCloud::from_points(vec![[0.0; 3]; 5]);
        let res = PlaneExtractor::default().extract(&cloud);
        assert!(matches!(
            res,
            Err(CalibError::InsufficientPoints {
                required: 10,
                got: 5
            })
        ));
    }

    #[test]
    fn test_intersection_line() -> Result<(), Box<dyn std::error::Error>> {
        let plane = |eq: PlaneEquation| Plane::new(eq, PointCloud::from_points(vec![[0.0; 3]]));
        let features = FixtureFeatures {
            plane1: plane(PlaneEquation::new(0.0, 0.0, 1.0, -1.0))?,
            plane2: plane(PlaneEquation::new(2.0, 0.0, 0.0, -4.0))?,
            plane3: None,
            residual: PointCloud::default(),
        };
        let line = features.intersection_line()?;
        assert_relative_eq!(line.point[0], 2.0, epsilon = 1e-12);
        assert_relative_eq!(line.point[1], 0.0, epsilon = 1e-12);
        assert_relative_eq!(line.point[2], 1.0, epsilon = 1e-12);
        assert_relative_eq!(line.direction[1].abs(), 1.0, epsilon = 1e-12);

        let parallel = FixtureFeatures {
            plane2: plane(PlaneEquation::new(0.0, 0.0, 1.0, 2.0))?,
            ..features
        };
        assert!(matches!(
            parallel.intersection_line(),
            Err(CalibError::SingularSolve(_))
        ));
        Ok(())
    }
}

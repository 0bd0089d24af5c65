use lidar_3d::linalg;

use crate::extractor::{FixtureFeatures, Plane};

/// Orient `plane` away from the `reference` centroid.
///
/// The normal is kept when `dot(reference - centroid, normal) <= 0` and
/// negated together with the offset otherwise.
pub fn orient_against(plane: &Plane, reference: &[f64; 3]) -> Plane {
    let towards = linalg::sub3(reference, &plane.centroid);
    if linalg::dot_product3(&towards, &plane.normal()) > 0.0 {
        plane.flipped()
    } else {
        plane.clone()
    }
}

/// Resolve the sign of every plane normal of a fixture.
///
/// Plane 1 is oriented against the centroid of plane 2, planes 2 and 3
/// against the centroid of plane 1. Orienting twice gives the same signs as
/// orienting once.
pub fn orient(features: FixtureFeatures) -> FixtureFeatures {
    let plane1 = orient_against(&features.plane1, &features.plane2.centroid);
    let plane2 = orient_against(&features.plane2, &features.plane1.centroid);
    let plane3 = features
        .plane3
        .as_ref()
        .map(|plane| orient_against(plane, &features.plane1.centroid));

    FixtureFeatures {
        plane1,
        plane2,
        plane3,
        residual: features.residual,
    }
}

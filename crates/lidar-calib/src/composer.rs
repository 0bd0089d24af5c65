use lidar_3d::transforms::RigidTransform;

/// Multiply incremental transforms into one.
///
/// The first element is applied first, so the result is `T_k ... T_1 T_0`.
/// An empty list gives the identity.
pub fn compose(transforms: &[RigidTransform]) -> RigidTransform {
    transforms
        .iter()
        .fold(RigidTransform::identity(), |acc, t| t.compose(&acc))
}

/// Chain a coarse estimate with a refinement computed on the coarsely aligned
/// cloud, giving `fine * coarse`.
pub fn compose_chain(coarse: &RigidTransform, fine: &RigidTransform) -> RigidTransform {
    fine.compose(coarse)
}

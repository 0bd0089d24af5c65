use lidar_3d::{
    io::pcd::PcdError, plane::PlaneFitError, pointcloud::PointCloudError,
    transforms::TransformError,
};

/// Errors returned by the fixture calibration.
///
/// Every error is terminal for a calibration run.
#[derive(Debug, thiserror::Error)]
pub enum CalibError {
    /// The cloud is too small to fit a plane.
    #[error("Insufficient points: need at least {required}, got {got}")]
    InsufficientPoints {
        /// Minimum number of points.
        required: usize,
        /// Number of points available.
        got: usize,
    },

    /// The RANSAC plane fit found no viable inlier set.
    #[error("Plane fit failed: {0}")]
    PlaneFitFailed(#[from] PlaneFitError),

    /// No candidate plane was distinct from plane 1 within the retry budget.
    #[error("No plane distinct from plane 1 after {retries} rejected candidates")]
    PlaneNotDistinguishable {
        /// Number of rejected candidates.
        retries: usize,
    },

    /// The two normals spanning the frame are parallel.
    #[error("Degenerate frame: residual norm {0:e} below tolerance")]
    DegenerateFrame(f64),

    /// A linear system is rank deficient.
    #[error("Singular solve: {0}")]
    SingularSolve(String),

    /// Point cloud construction or transformation failed.
    #[error(transparent)]
    PointCloud(#[from] PointCloudError),

    /// Reading or writing a point cloud failed.
    #[error(transparent)]
    Pcd(#[from] PcdError),

    /// Building or persisting a transform failed.
    #[error(transparent)]
    Transform(#[from] TransformError),
}

#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// I/O utilities for reading and writing point clouds.
pub mod io;

/// Linear algebra utilities.
pub mod linalg;

/// Plane model and RANSAC plane segmentation.
pub mod plane;

/// Point cloud container.
pub mod pointcloud;

/// 3D rigid transforms.
pub mod transforms;

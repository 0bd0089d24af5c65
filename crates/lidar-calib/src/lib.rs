#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

mod error;
pub use error::CalibError;

/// Transform composition.
pub mod composer;

/// Fixture plane extraction.
pub mod extractor;

/// Orthonormal frame from two plane normals.
pub mod frame;

/// Plane normal sign resolution.
pub mod orient;

mod pipeline;
pub use pipeline::*;

/// Rotation solvers.
pub mod rotation;

/// Along-axis translation solver.
pub mod translation;

#[cfg(test)]
mod testing;

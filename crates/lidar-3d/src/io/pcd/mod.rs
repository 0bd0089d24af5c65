mod parser;
mod writer;

pub use parser::read_pcd;
pub use writer::write_pcd_ascii;

use crate::pointcloud::PointCloudError;

/// Error types for the PCD module.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PcdError {
    /// Failed to read or write the PCD file
    #[error("Failed to read PCD file")]
    Io(#[from] std::io::Error),

    /// Unsupported header
    #[error("Unsupported PCD header")]
    UnsupportedProperty,

    /// Malformed PCD header
    #[error("Malformed PCD header")]
    MalformedHeader,

    /// A required field is missing from the header
    #[error("Missing PCD field: {0}")]
    MissingField(String),

    /// A data record could not be parsed
    #[error("Invalid PCD record: {0}")]
    InvalidRecord(String),

    /// The file ends before the announced number of points
    #[error("Truncated PCD data: expected {expected} points, got {got}")]
    Truncated {
        /// Points announced in the header.
        expected: usize,
        /// Points read.
        got: usize,
    },

    /// Invalid PCD file extension
    #[error("Invalid PCD file extension. Got:{0}")]
    InvalidFileExtension(String),

    /// The decoded records do not form a valid point cloud
    #[error(transparent)]
    PointCloud(#[from] PointCloudError),
}

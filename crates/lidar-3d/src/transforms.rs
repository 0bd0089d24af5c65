use serde::{Deserialize, Serialize};

use crate::linalg;

/// Error types for rigid transforms.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    /// The rotation axis has zero length.
    #[error("Cannot compute rotation matrix from a zero vector")]
    ZeroAxis,

    /// The matrix is not a proper rigid transform.
    #[error("Matrix is not a rigid transform: {0}")]
    NotRigid(String),

    /// Failed to read or write a transform file.
    #[error("Failed to access transform file")]
    Io(#[from] std::io::Error),

    /// Failed to parse a transform from text.
    #[error("Failed to parse transform: {0}")]
    Parse(String),

    /// Failed to (de)serialize a transform as JSON.
    #[error("Failed to (de)serialize transform")]
    Json(#[from] serde_json::Error),
}

/// Compute the rotation matrix from an axis and angle.
///
/// # Arguments
///
/// * `axis` - The axis of rotation. It does not need to be normalized.
/// * `angle` - The angle of rotation in radians.
///
/// # Returns
///
/// The rotation matrix.
///
/// Example:
///
/// ```no_run
/// use lidar_3d::transforms::axis_angle_to_rotation_matrix;
///
/// let axis = [1.0, 0.0, 0.0];
/// let angle = std::f64::consts::PI / 2.0;
/// let rotation = axis_angle_to_rotation_matrix(&axis, angle).unwrap();
/// ```
pub fn axis_angle_to_rotation_matrix(
    axis: &[f64; 3],
    angle: f64,
) -> Result<[[f64; 3]; 3], TransformError> {
    let [x, y, z] = linalg::normalize3(axis, 1e-10).ok_or(TransformError::ZeroAxis)?;

    let c = angle.cos();
    let s = angle.sin();
    let t = 1.0 - c;

    let m00 = c + x * x * t;
    let m11 = c + y * y * t;
    let m22 = c + z * z * t;

    let tmp1 = x * y * t;
    let tmp2 = z * s;

    let m10 = tmp1 + tmp2;
    let m01 = tmp1 - tmp2;

    let tmp3 = x * z * t;
    let tmp4 = y * s;

    let m20 = tmp3 - tmp4;
    let m02 = tmp3 + tmp4;

    let tmp5 = y * z * t;
    let tmp6 = x * s;

    let m12 = tmp5 - tmp6;
    let m21 = tmp5 + tmp6;

    Ok([[m00, m01, m02], [m10, m11, m12], [m20, m21, m22]])
}

/// Angle in radians of the rotation encoded by a rotation matrix.
pub fn rotation_angle(rotation: &[[f64; 3]; 3]) -> f64 {
    let trace = rotation[0][0] + rotation[1][1] + rotation[2][2];
    ((trace - 1.0) / 2.0).clamp(-1.0, 1.0).acos()
}

/// A rigid transform stored as a 4x4 row-major homogeneous matrix.
///
/// The upper-left 3x3 block is a proper rotation and the bottom row is
/// always `[0, 0, 0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RigidTransform {
    matrix: [[f64; 4]; 4],
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl RigidTransform {
    /// Default tolerance used to validate rotation blocks.
    pub const RIGID_TOLERANCE: f64 = 1e-6;

    /// The identity transform.
    pub fn identity() -> Self {
        Self::from_parts(
            &[[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            &[0.0; 3],
        )
    }

    /// Build a transform from a rotation and a translation.
    ///
    /// PRECONDITION: `rotation` is a proper rotation matrix.
    pub fn from_parts(rotation: &[[f64; 3]; 3], translation: &[f64; 3]) -> Self {
        let mut matrix = [[0.0; 4]; 4];
        for i in 0..3 {
            matrix[i][..3].copy_from_slice(&rotation[i]);
            matrix[i][3] = translation[i];
        }
        matrix[3][3] = 1.0;
        Self { matrix }
    }

    /// Pure rotation transform.
    pub fn from_rotation(rotation: &[[f64; 3]; 3]) -> Self {
        Self::from_parts(rotation, &[0.0; 3])
    }

    /// Pure translation transform.
    pub fn from_translation(translation: &[f64; 3]) -> Self {
        Self::from_parts(
            &[[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            translation,
        )
    }

    /// Build a transform from a raw 4x4 matrix, validating it is rigid.
    pub fn from_matrix(matrix: [[f64; 4]; 4]) -> Result<Self, TransformError> {
        if matrix.iter().flatten().any(|v| !v.is_finite()) {
            return Err(TransformError::NotRigid("non-finite entries".into()));
        }
        let candidate = Self { matrix };
        if !candidate.is_rigid(Self::RIGID_TOLERANCE * 100.0) {
            return Err(TransformError::NotRigid(format!("{matrix:?}")));
        }
        Ok(candidate)
    }

    /// The 4x4 row-major matrix.
    pub fn matrix(&self) -> &[[f64; 4]; 4] {
        &self.matrix
    }

    /// The rotation block.
    pub fn rotation(&self) -> [[f64; 3]; 3] {
        let m = &self.matrix;
        [
            [m[0][0], m[0][1], m[0][2]],
            [m[1][0], m[1][1], m[1][2]],
            [m[2][0], m[2][1], m[2][2]],
        ]
    }

    /// The translation column.
    pub fn translation(&self) -> [f64; 3] {
        [self.matrix[0][3], self.matrix[1][3], self.matrix[2][3]]
    }

    /// Returns `self * other`, i.e. `other` is applied first.
    pub fn compose(&self, other: &RigidTransform) -> RigidTransform {
        let mut matrix = [[0.0; 4]; 4];
        for (i, row) in matrix.iter_mut().enumerate() {
            for (j, val) in row.iter_mut().enumerate() {
                *val = (0..4)
                    .map(|k| self.matrix[i][k] * other.matrix[k][j])
                    .sum();
            }
        }
        // keep the homogeneous row exact
        matrix[3] = [0.0, 0.0, 0.0, 1.0];
        Self { matrix }
    }

    /// The inverse transform `[R^T | -R^T t]`.
    pub fn inverse(&self) -> RigidTransform {
        let r_inv = linalg::transpose33(&self.rotation());
        let t_inv = linalg::scale3(&linalg::mat33_mul_vec3(&r_inv, &self.translation()), -1.0);
        Self::from_parts(&r_inv, &t_inv)
    }

    /// Apply the transform to a single point.
    pub fn transform_point(&self, point: &[f64; 3]) -> [f64; 3] {
        linalg::add3(
            &linalg::mat33_mul_vec3(&self.rotation(), point),
            &self.translation(),
        )
    }

    /// Check the rotation block is orthonormal with determinant +1 and the
    /// bottom row is `[0, 0, 0, 1]`, within `tol`.
    pub fn is_rigid(&self, tol: f64) -> bool {
        let r = self.rotation();
        let mut rrt = [[0.0; 3]; 3];
        linalg::matmul33(&r, &linalg::transpose33(&r), &mut rrt);
        let orthonormal = rrt.iter().enumerate().all(|(i, row)| {
            row.iter()
                .enumerate()
                .all(|(j, v)| (v - if i == j { 1.0 } else { 0.0 }).abs() <= tol)
        });
        let bottom = self.matrix[3];
        orthonormal
            && (linalg::det_mat33(&r) - 1.0).abs() <= tol
            && bottom[..3].iter().all(|v| v.abs() <= tol)
            && (bottom[3] - 1.0).abs() <= tol
    }
}

/// Format a transform the way calibration files store it: one bracketed,
/// comma separated row per line with 8 decimals.
pub fn format_matrix(transform: &RigidTransform) -> String {
    let rows = transform
        .matrix()
        .iter()
        .map(|row| {
            let cols = row
                .iter()
                .map(|v| format!("{v:.8}"))
                .collect::<Vec<_>>()
                .join(", ");
            format!(" [{cols}]")
        })
        .collect::<Vec<_>>();
    format!("[{}]", rows.join(",\n").trim_start())
}

/// Parse a transform from text. All numbers found after an optional
/// `name:` header line are read in row-major order.
pub fn parse_matrix(text: &str) -> Result<RigidTransform, TransformError> {
    let body = text
        .lines()
        .filter(|line| !line.trim_end().ends_with(':'))
        .collect::<Vec<_>>()
        .join(" ");

    let values = body
        .split(|c: char| c == ',' || c == '[' || c == ']' || c.is_whitespace())
        .filter(|tok| !tok.is_empty())
        .map(|tok| {
            tok.parse::<f64>()
                .map_err(|_| TransformError::Parse(format!("invalid number `{tok}`")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    if values.len() != 16 {
        return Err(TransformError::Parse(format!(
            "expected 16 values, got {}",
            values.len()
        )));
    }

    let mut matrix = [[0.0; 4]; 4];
    for (i, v) in values.into_iter().enumerate() {
        matrix[i / 4][i % 4] = v;
    }
    RigidTransform::from_matrix(matrix)
}

/// Write a transform as `transform:` followed by the formatted matrix.
pub fn write_transform_txt(
    path: impl AsRef<std::path::Path>,
    transform: &RigidTransform,
) -> Result<(), TransformError> {
    std::fs::write(path, format!("transform:\n{}\n", format_matrix(transform)))?;
    Ok(())
}

/// Read a transform previously written with [`write_transform_txt`].
pub fn read_transform_txt(
    path: impl AsRef<std::path::Path>,
) -> Result<RigidTransform, TransformError> {
    let text = std::fs::read_to_string(path)?;
    parse_matrix(&text)
}

/// Write a transform as JSON (`{"matrix": [[...], ...]}`).
pub fn write_transform_json(
    path: impl AsRef<std::path::Path>,
    transform: &RigidTransform,
) -> Result<(), TransformError> {
    let file = std::fs::File::create(path)?;
    serde_json::to_writer_pretty(std::io::BufWriter::new(file), transform)?;
    Ok(())
}

use lidar_3d::linalg;

use crate::CalibError;

const DEGENERATE_TOLERANCE: f64 = 1e-6;

/// Right-handed orthonormal basis built from two plane normals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrthonormalFrame {
    /// The first normal, normalized.
    pub u1: [f64; 3],
    /// The second normal without its `u1` component, normalized.
    pub u2: [f64; 3],
    /// `u1 x u2`.
    pub u3: [f64; 3],
}

impl OrthonormalFrame {
    /// The frame axes in order.
    pub fn axes(&self) -> [[f64; 3]; 3] {
        [self.u1, self.u2, self.u3]
    }
}

/// Build an orthonormal frame from two normals by Gram-Schmidt.
///
/// # Arguments
///
/// * `n1` - The first normal, kept as the first axis.
/// * `n2` - The second normal.
///
/// # Errors
///
/// [`CalibError::DegenerateFrame`] when `n1` is zero or `n2` is parallel to it.
pub fn build_frame(n1: &[f64; 3], n2: &[f64; 3]) -> Result<OrthonormalFrame, CalibError> {
    let u1 = linalg::normalize3(n1, DEGENERATE_TOLERANCE)
        .ok_or(CalibError::DegenerateFrame(linalg::norm3(n1)))?;

    let residual = linalg::sub3(n2, &linalg::scale3(&u1, linalg::dot_product3(n2, &u1)));
    let residual_norm = linalg::norm3(&residual);
    if residual_norm < DEGENERATE_TOLERANCE {
        return Err(CalibError::DegenerateFrame(residual_norm));
    }
    let u2 = linalg::scale3(&residual, 1.0 / residual_norm);

    let mut u3 = [0.0; 3];
    linalg::cross_vec3(&u1, &u2, &mut u3);
    let u3 = linalg::normalize3(&u3, DEGENERATE_TOLERANCE)
        .ok_or(CalibError::DegenerateFrame(residual_norm))?;

    Ok(OrthonormalFrame { u1, u2, u3 })
}

use serde::{Deserialize, Serialize};

use lidar_3d::{linalg, plane::PlaneFitError, transforms::axis_angle_to_rotation_matrix};

use crate::CalibError;

const PARALLEL_TOLERANCE: f64 = 1e-6;

/// How the rotation between the two fixtures is solved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationStrategy {
    /// Align one normal at a time, re-extracting the planes in between.
    #[default]
    Sequential,
    /// Solve one rotation over all normal pairs, then run the sequential steps
    /// as residual corrections.
    Joint,
}

const IDENTITY: [[f64; 3]; 3] = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

/// Rotation taking `source` onto the direction of `target`.
///
/// Antiparallel normals give a half turn about an axis orthogonal to
/// `source`; parallel normals give the identity.
///
/// # Arguments
///
/// * `source` - The normal to rotate.
/// * `target` - The direction to reach.
pub fn align_normals(source: &[f64; 3], target: &[f64; 3]) -> Result<[[f64; 3]; 3], CalibError> {
    let s = linalg::normalize3(source, 1e-12).ok_or(PlaneFitError::DegeneratePlane)?;
    let t = linalg::normalize3(target, 1e-12).ok_or(PlaneFitError::DegeneratePlane)?;

    let cos = linalg::dot_product3(&s, &t).clamp(-1.0, 1.0);

    if cos < -1.0 + PARALLEL_TOLERANCE {
        // pick a helper that is not close to `s`
        let helper = if s[2].abs() > 0.9 {
            [0.0, 1.0, 0.0]
        } else {
            [0.0, 0.0, 1.0]
        };
        let mut axis = [0.0; 3];
        linalg::cross_vec3(&s, &helper, &mut axis);
        return Ok(axis_angle_to_rotation_matrix(&axis, std::f64::consts::PI)?);
    }

    let mut axis = [0.0; 3];
    linalg::cross_vec3(&s, &t, &mut axis);
    if linalg::norm3(&axis) < 1e-9 {
        return Ok(IDENTITY);
    }

    Ok(axis_angle_to_rotation_matrix(&axis, cos.acos())?)
}

/// Least squares rotation over pairs of normals (Kabsch).
///
/// With exactly two pairs their cross products are added as a third pair.
/// The reflection case is corrected so the result is a proper rotation.
///
/// # Arguments
///
/// * `source` - The normals to rotate.
/// * `target` - The corresponding target normals.
pub fn joint_rotation(
    source: &[[f64; 3]],
    target: &[[f64; 3]],
) -> Result<[[f64; 3]; 3], CalibError> {
    if source.len() != target.len() || source.len() < 2 {
        return Err(CalibError::SingularSolve(format!(
            "need at least two normal pairs, got {} and {}",
            source.len(),
            target.len()
        )));
    }

    let mut src = source
        .iter()
        .map(|n| linalg::normalize3(n, 1e-12))
        .collect::<Option<Vec<_>>>()
        .ok_or(PlaneFitError::DegeneratePlane)?;
    let mut dst = target
        .iter()
        .map(|n| linalg::normalize3(n, 1e-12))
        .collect::<Option<Vec<_>>>()
        .ok_or(PlaneFitError::DegeneratePlane)?;

    if src.len() == 2 {
        let mut s3 = [0.0; 3];
        let mut t3 = [0.0; 3];
        linalg::cross_vec3(&src[0], &src[1], &mut s3);
        linalg::cross_vec3(&dst[0], &dst[1], &mut t3);
        src.push(s3);
        dst.push(t3);
    }

    // H = sum t_i s_i^T
    let mut h = [[0.0f64; 3]; 3];
    for (s, t) in src.iter().zip(dst.iter()) {
        for (r, row) in h.iter_mut().enumerate() {
            for (c, val) in row.iter_mut().enumerate() {
                *val += t[r] * s[c];
            }
        }
    }

    let svd = faer::Mat::<f64>::from_fn(3, 3, |i, j| h[i][j]).svd();
    let singular = svd.s_diagonal();
    if singular.read(1) < 1e-9 {
        return Err(CalibError::SingularSolve(
            "normal pairs span less than two directions".to_string(),
        ));
    }

    let (u, v) = (svd.u(), svd.v());
    let mut u_arr = [[0.0; 3]; 3];
    let mut v_t = [[0.0; 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            u_arr[i][j] = u.read(i, j);
            v_t[i][j] = v.read(j, i);
        }
    }

    // R = U diag(1, 1, d) V^T
    let mut r = [[0.0; 3]; 3];
    linalg::matmul33(&u_arr, &v_t, &mut r);
    if linalg::det_mat33(&r) < 0.0 {
        for row in u_arr.iter_mut() {
            row[2] = -row[2];
        }
        linalg::matmul33(&u_arr, &v_t, &mut r);
    }

    Ok(r)
}

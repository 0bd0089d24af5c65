use glam::DVec3;

use crate::linalg;
use crate::transforms::RigidTransform;

/// Error types for point cloud construction.
#[derive(Debug, thiserror::Error)]
pub enum PointCloudError {
    /// The intensity channel does not match the number of points.
    #[error("Mismatched intensities: {points} points but {intensities} intensities")]
    MismatchedIntensities {
        /// Number of points.
        points: usize,
        /// Number of intensities.
        intensities: usize,
    },

    /// A mask or index does not fit the point cloud.
    #[error("Selection out of bounds: {0}")]
    InvalidSelection(String),

    /// Failed to transform the points.
    #[error(transparent)]
    Linalg(#[from] linalg::LinalgError),
}

/// A point cloud with points and an optional per-point intensity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    // The points in the point cloud.
    points: Vec<[f64; 3]>,
    // The intensities of the points, parallel to `points`.
    intensities: Option<Vec<f32>>,
}

impl PointCloud {
    /// Create a new point cloud from points and intensities (optional).
    pub fn new(
        points: Vec<[f64; 3]>,
        intensities: Option<Vec<f32>>,
    ) -> Result<Self, PointCloudError> {
        if let Some(intensities) = &intensities {
            if intensities.len() != points.len() {
                return Err(PointCloudError::MismatchedIntensities {
                    points: points.len(),
                    intensities: intensities.len(),
                });
            }
        }
        Ok(Self {
            points,
            intensities,
        })
    }

    /// Create a point cloud holding only positions.
    pub fn from_points(points: Vec<[f64; 3]>) -> Self {
        Self {
            points,
            intensities: None,
        }
    }

    /// Get the number of points in the point cloud.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the point cloud is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Get as reference the points in the point cloud.
    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    /// Get as reference the intensities of the points in the point cloud.
    pub fn intensities(&self) -> Option<&[f32]> {
        self.intensities.as_deref()
    }

    /// Select the points at `indices`, keeping their order and intensities.
    pub fn select_by_index(&self, indices: &[usize]) -> Result<Self, PointCloudError> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.points.len()) {
            return Err(PointCloudError::InvalidSelection(format!(
                "index {bad} >= {}",
                self.points.len()
            )));
        }
        let points = indices.iter().map(|&i| self.points[i]).collect();
        let intensities = self
            .intensities
            .as_ref()
            .map(|values| indices.iter().map(|&i| values[i]).collect());
        Ok(Self {
            points,
            intensities,
        })
    }

    /// Keep the points whose mask entry is `true`.
    pub fn select_by_mask(&self, mask: &[bool]) -> Result<Self, PointCloudError> {
        if mask.len() != self.points.len() {
            return Err(PointCloudError::InvalidSelection(format!(
                "mask of length {} for {} points",
                mask.len(),
                self.points.len()
            )));
        }
        let keep = |i: &usize| mask[*i];
        let indices = (0..self.points.len()).filter(keep).collect::<Vec<_>>();
        self.select_by_index(&indices)
    }

    /// Drop the points with non-finite coordinates or intensity.
    ///
    /// Returns the number of removed points.
    pub fn retain_finite(&mut self) -> usize {
        let mask = (0..self.points.len())
            .map(|i| {
                self.points[i].iter().all(|v| v.is_finite())
                    && self
                        .intensities
                        .as_ref()
                        .map_or(true, |values| values[i].is_finite())
            })
            .collect::<Vec<_>>();

        let removed = mask.iter().filter(|keep| !**keep).count();
        if removed > 0 {
            let mut it = mask.iter();
            self.points.retain(|_| *it.next().unwrap_or(&false));
            if let Some(values) = self.intensities.as_mut() {
                let mut it = mask.iter();
                values.retain(|_| *it.next().unwrap_or(&false));
            }
            log::warn!("Removed {removed} non-finite points");
        }
        removed
    }

    /// Mean of the points, `None` for an empty cloud.
    pub fn centroid(&self) -> Option<[f64; 3]> {
        if self.points.is_empty() {
            return None;
        }
        let sum = self
            .points
            .iter()
            .fold(DVec3::ZERO, |acc, p| acc + DVec3::from_array(*p));
        Some((sum / self.points.len() as f64).to_array())
    }

    /// Apply a rigid transform, returning a new cloud with the same intensities.
    pub fn transformed(&self, transform: &RigidTransform) -> Result<Self, PointCloudError> {
        let mut dst_points = vec![[0.0; 3]; self.points.len()];
        linalg::transform_points3d(
            &self.points,
            &transform.rotation(),
            &transform.translation(),
            &mut dst_points,
        )?;
        Ok(Self {
            points: dst_points,
            intensities: self.intensities.clone(),
        })
    }

    /// Get the minimum bound of the point cloud.
    pub fn get_min_bound(&self) -> DVec3 {
        if self.points.is_empty() {
            return DVec3::ZERO;
        }
        self.points
            .iter()
            .map(|p| DVec3::from_array(*p))
            .fold(DVec3::splat(f64::INFINITY), |a, b| a.min(b))
    }

    /// Get the maximum bound of the point cloud.
    pub fn get_max_bound(&self) -> DVec3 {
        if self.points.is_empty() {
            return DVec3::ZERO;
        }
        self.points
            .iter()
            .map(|p| DVec3::from_array(*p))
            .fold(DVec3::splat(f64::NEG_INFINITY), |a, b| a.max(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_pointcloud() -> Result<(), PointCloudError> {
        let pointcloud = PointCloud::new(
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]],
            Some(vec![10.0, 20.0]),
        )?;

        assert_eq!(pointcloud.len(), 2);
        assert_eq!(pointcloud.points().len(), 2);
        assert_eq!(pointcloud.intensities(), Some(&[10.0, 20.0][..]));

        let c = pointcloud.centroid().unwrap_or_default();
        assert_relative_eq!(c[0], 0.5);
        assert_eq!(pointcloud.get_min_bound(), DVec3::new(0.0, 0.0, 0.0));
        assert_eq!(pointcloud.get_max_bound(), DVec3::new(1.0, 0.0, 0.0));
        Ok(())
    }

    #[test]
    fn test_mismatched_intensities() {
        let res = PointCloud::new(vec![[0.0; 3]; 3], Some(vec![1.0]));
        assert!(matches!(
            res,
            Err(PointCloudError::MismatchedIntensities {
                points: 3,
                intensities: 1
            })
        ));
    }

    #[test]
    fn test_select_keeps_intensities_parallel() -> Result<(), PointCloudError> {
        let pointcloud = PointCloud::new(
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [2.0, 0.0, 0.0]],
            Some(vec![0.0, 1.0, 2.0]),
        )?;
        let sel = pointcloud.select_by_index(&[2, 0])?;
        assert_eq!(sel.points(), &[[2.0, 0.0, 0.0], [0.0, 0.0, 0.0]]);
        assert_eq!(sel.intensities(), Some(&[2.0, 0.0][..]));

        let sel = pointcloud.select_by_mask(&[false, true, true])?;
        assert_eq!(sel.intensities(), Some(&[1.0, 2.0][..]));

        assert!(pointcloud.select_by_index(&[3]).is_err());
        assert!(pointcloud.select_by_mask(&[true]).is_err());
        Ok(())
    }

    #[test]
    fn test_retain_finite() -> Result<(), PointCloudError> {
        let mut pointcloud = PointCloud::new(
            vec![[0.0, 0.0, 0.0], [f64::NAN, 0.0, 0.0], [2.0, 0.0, 0.0]],
            Some(vec![0.0, 1.0, f32::INFINITY]),
        )?;
        assert_eq!(pointcloud.retain_finite(), 2);
        assert_eq!(pointcloud.points(), &[[0.0, 0.0, 0.0]]);
        assert_eq!(pointcloud.intensities(), Some(&[0.0][..]));
        Ok(())
    }

    #[test]
    fn test_transformed() -> Result<(), PointCloudError> {
        let pointcloud = PointCloud::from_points(vec![[1.0, 0.0, 0.0]]);
        let t = RigidTransform::from_parts(
            &[[0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]],
            &[0.0, 0.0, 1.0],
        );
        let moved = pointcloud.transformed(&t)?;
        assert_relative_eq!(moved.points()[0][0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(moved.points()[0][1], 1.0, epsilon = 1e-12);
        assert_relative_eq!(moved.points()[0][2], 1.0, epsilon = 1e-12);
        Ok(())
    }
}

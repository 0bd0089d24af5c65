use std::path::Path;

use serde::{Deserialize, Serialize};

use lidar_3d::{
    io::pcd::write_pcd_ascii,
    pointcloud::PointCloud,
    transforms::{format_matrix, write_transform_txt, RigidTransform},
};

use crate::{
    composer::compose,
    extractor::{ExtractorParams, FixtureFeatures, Plane, PlaneExtractor},
    frame::{build_frame, OrthonormalFrame},
    orient::orient,
    rotation::{align_normals, joint_rotation, RotationStrategy},
    translation::optimal_translation,
    CalibError,
};

/// Fixed rotation applied to the source before any plane is extracted.
///
/// Used when the source sensor is mounted rolled about its x axis relative
/// to the target sensor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlipCorrection {
    /// No rotation.
    #[default]
    None,
    /// 90 degrees clockwise about x.
    XCw90,
    /// 180 degrees about x.
    X180,
    /// 90 degrees counter-clockwise about x.
    XCcw90,
}

impl FlipCorrection {
    /// The rotation matrix of the correction.
    pub fn rotation(&self) -> [[f64; 3]; 3] {
        match self {
            FlipCorrection::None => [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            FlipCorrection::XCw90 => [[1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, -1.0, 0.0]],
            FlipCorrection::X180 => [[1.0, 0.0, 0.0], [0.0, -1.0, 0.0], [0.0, 0.0, -1.0]],
            FlipCorrection::XCcw90 => [[1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]],
        }
    }
}

/// Configuration of a calibration run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Plane extraction parameters, shared by both clouds.
    pub extractor: ExtractorParams,
    /// Initial rotation of the source cloud.
    pub flip: FlipCorrection,
    /// Rotation solve strategy.
    pub rotation: RotationStrategy,
}

/// Stages of the calibration, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalibrationStage {
    /// The initial flip correction was applied.
    Flipped,
    /// Plane 1 normals are aligned.
    Rotated1,
    /// Plane 2 normals are aligned.
    Rotated2,
    /// Plane 3 normals are aligned.
    Rotated3,
    /// Plane 2 offset is corrected along the second frame axis.
    Translated1,
    /// Plane 1 offset is corrected along the first frame axis.
    Translated2,
    /// Plane 3 offset is corrected along the third frame axis.
    Translated3,
    /// The transform is complete.
    Done,
}

impl CalibrationStage {
    /// The stage that follows this one.
    pub fn next(self) -> Self {
        match self {
            CalibrationStage::Flipped => CalibrationStage::Rotated1,
            CalibrationStage::Rotated1 => CalibrationStage::Rotated2,
            CalibrationStage::Rotated2 => CalibrationStage::Rotated3,
            CalibrationStage::Rotated3 => CalibrationStage::Translated1,
            CalibrationStage::Translated1 => CalibrationStage::Translated2,
            CalibrationStage::Translated2 => CalibrationStage::Translated3,
            CalibrationStage::Translated3 | CalibrationStage::Done => CalibrationStage::Done,
        }
    }
}

/// One incremental correction of the calibration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationStep {
    /// The stage reached by applying the correction.
    pub stage: CalibrationStage,
    /// The incremental transform.
    pub transform: RigidTransform,
}

/// Result of a calibration run.
///
/// The transform maps points from the source to the target frame.
#[derive(Debug, Clone)]
pub struct CalibrationResult {
    /// Estimated source to target transform.
    pub transform: RigidTransform,
    /// The incremental corrections, in the order they were applied.
    pub steps: Vec<CalibrationStep>,
    /// Oriented fixture planes of the target cloud.
    pub target_features: FixtureFeatures,
    /// Oriented fixture planes of the aligned source cloud, when they could be
    /// extracted again after the last correction.
    pub source_features: Option<FixtureFeatures>,
}

// Per run state threaded through the stages.
struct RunState<'a> {
    stage: CalibrationStage,
    cloud: PointCloud,
    target: &'a FixtureFeatures,
    frame: OrthonormalFrame,
    steps: Vec<CalibrationStep>,
}

/// Estimates the rigid transform between two clouds of the same corner fixture.
#[derive(Debug, Clone, Default)]
pub struct CornerCalibrator {
    config: CalibrationConfig,
    extractor: PlaneExtractor,
}

impl CornerCalibrator {
    /// Create a calibrator with the given configuration.
    pub fn new(config: CalibrationConfig) -> Self {
        let extractor = PlaneExtractor::new(config.extractor.clone());
        Self { config, extractor }
    }

    /// The configuration of the calibrator.
    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    /// Extract and orient the fixture planes of a cloud.
    pub fn features(&self, cloud: &PointCloud) -> Result<FixtureFeatures, CalibError> {
        let features = orient(self.extractor.extract(cloud)?);
        match features.intersection_line() {
            Ok(line) => log::debug!(
                "plane 1/2 intersection through {:?} along {:?}",
                line.point,
                line.direction
            ),
            Err(err) => log::debug!("no plane 1/2 intersection: {err}"),
        }
        Ok(features)
    }

    // Planes of the aligned cloud; the transform is kept when they are not found.
    fn aligned_features(&self, cloud: &PointCloud) -> Option<FixtureFeatures> {
        match self.features(cloud) {
            Ok(features) => Some(features),
            Err(err) => {
                log::warn!("could not extract the planes of the aligned source: {err}");
                None
            }
        }
    }

    /// Estimate the transform taking `source` onto `target`.
    ///
    /// The target planes are extracted once. The source cloud goes through the
    /// stages in order, each stage re-extracting the source planes from the
    /// cloud left by the previous one. No partial result is returned on error.
    ///
    /// # Arguments
    ///
    /// * `source` - The cloud to align.
    /// * `target` - The reference cloud.
    pub fn run(
        &self,
        source: &PointCloud,
        target: &PointCloud,
    ) -> Result<CalibrationResult, CalibError> {
        let target_features = self.features(target)?;
        let frame = build_frame(
            &target_features.plane1.normal(),
            &target_features.plane2.normal(),
        )?;
        log::debug!("target frame: {frame:?}");

        let mut state = RunState {
            stage: CalibrationStage::Flipped,
            cloud: source.clone(),
            target: &target_features,
            frame,
            steps: Vec::with_capacity(7),
        };

        while state.stage != CalibrationStage::Done {
            let increment = self.step(&state)?;
            log::debug!(
                "{:?}: rotation {:.4} rad, translation {:?}",
                state.stage,
                lidar_3d::transforms::rotation_angle(&increment.rotation()),
                increment.translation()
            );

            state.cloud = state.cloud.transformed(&increment)?;
            state.steps.push(CalibrationStep {
                stage: state.stage,
                transform: increment,
            });
            state.stage = state.stage.next();
        }

        let RunState { cloud, steps, .. } = state;
        let transform = compose(&steps.iter().map(|s| s.transform).collect::<Vec<_>>());
        let source_features = self.aligned_features(&cloud);

        log::info!("calibration done:\n{}", format_matrix(&transform));

        Ok(CalibrationResult {
            transform,
            steps,
            target_features,
            source_features,
        })
    }

    // Incremental transform of the current stage.
    fn step(&self, state: &RunState) -> Result<RigidTransform, CalibError> {
        let target = state.target;
        match state.stage {
            CalibrationStage::Flipped => Ok(RigidTransform::from_rotation(
                &self.config.flip.rotation(),
            )),
            CalibrationStage::Rotated1 => {
                let source = self.features(&state.cloud)?;
                let rotation = match self.config.rotation {
                    RotationStrategy::Sequential => {
                        align_normals(&source.plane1.normal(), &target.plane1.normal())?
                    }
                    RotationStrategy::Joint => {
                        let (src, dst): (Vec<_>, Vec<_>) = paired_planes(&source, target)
                            .map(|(s, t)| (s.normal(), t.normal()))
                            .unzip();
                        joint_rotation(&src, &dst)?
                    }
                };
                Ok(RigidTransform::from_rotation(&rotation))
            }
            CalibrationStage::Rotated2 => {
                let source = self.features(&state.cloud)?;
                let rotation = align_normals(&source.plane2.normal(), &target.plane2.normal())?;
                Ok(RigidTransform::from_rotation(&rotation))
            }
            CalibrationStage::Rotated3 => {
                let source = self.features(&state.cloud)?;
                match (&source.plane3, &target.plane3) {
                    (Some(s), Some(t)) => Ok(RigidTransform::from_rotation(&align_normals(
                        &s.normal(),
                        &t.normal(),
                    )?)),
                    _ => Ok(RigidTransform::identity()),
                }
            }
            CalibrationStage::Translated1 => {
                let source = self.features(&state.cloud)?;
                Ok(translate(&source.plane2, &target.plane2, &state.frame.u2))
            }
            CalibrationStage::Translated2 => {
                let source = self.features(&state.cloud)?;
                Ok(translate(&source.plane1, &target.plane1, &state.frame.u1))
            }
            CalibrationStage::Translated3 => {
                let source = self.features(&state.cloud)?;
                match (&source.plane3, &target.plane3) {
                    (Some(s), Some(t)) => Ok(translate(s, t, &state.frame.u3)),
                    _ => Ok(RigidTransform::identity()),
                }
            }
            CalibrationStage::Done => Ok(RigidTransform::identity()),
        }
    }
}

fn paired_planes<'a>(
    source: &'a FixtureFeatures,
    target: &'a FixtureFeatures,
) -> impl Iterator<Item = (&'a Plane, &'a Plane)> {
    source.planes().zip(target.planes())
}

// Move the source plane onto the target inliers along `axis`.
fn translate(source: &Plane, target: &Plane, axis: &[f64; 3]) -> RigidTransform {
    RigidTransform::from_translation(&optimal_translation(
        target.inliers.points(),
        &source.equation,
        axis,
    ))
}

/// Persist the aligned clouds and the transform into `dir`.
///
/// Writes `source.pcd` (the source moved by `transform`), `target.pcd` and
/// `transform.txt`.
pub fn save_aligned(
    dir: impl AsRef<Path>,
    source: &PointCloud,
    target: &PointCloud,
    transform: &RigidTransform,
) -> Result<(), CalibError> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir).map_err(lidar_3d::io::pcd::PcdError::from)?;

    write_pcd_ascii(dir.join("source.pcd"), &source.transformed(transform)?)?;
    write_pcd_ascii(dir.join("target.pcd"), target)?;
    write_transform_txt(dir.join("transform.txt"), transform)?;

    log::info!("saved aligned clouds to {}", dir.display());
    Ok(())
}

use argh::FromArgs;
use std::path::PathBuf;

use lidar_3d::{io::pcd, transforms};
use lidar_calib::{composer, save_aligned, CalibrationConfig, CornerCalibrator};

#[derive(FromArgs)]
/// Calibrate two LiDARs from a corner fixture seen by both
struct Args {
    /// path to the source point cloud (.pcd)
    #[argh(option)]
    source: PathBuf,

    /// path to the target point cloud (.pcd)
    #[argh(option)]
    target: PathBuf,

    /// path to a JSON calibration config
    #[argh(option)]
    config: Option<PathBuf>,

    /// directory to write the aligned clouds and the transform into
    #[argh(option)]
    output_dir: Option<PathBuf>,

    /// transform file refining the coarse estimate
    #[argh(option)]
    fine_transform: Option<PathBuf>,

    /// seed of the RANSAC sampler
    #[argh(option)]
    seed: Option<u64>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let mut config = match &args.config {
        Some(path) => serde_json::from_reader(std::fs::File::open(path)?)?,
        None => CalibrationConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.extractor.ransac.random_seed = Some(seed);
    }

    let source = pcd::read_pcd(&args.source)?;
    println!("Source cloud: #{} points", source.len());

    let target = pcd::read_pcd(&args.target)?;
    println!("Target cloud: #{} points", target.len());

    let result = CornerCalibrator::new(config).run(&source, &target)?;
    for step in &result.steps {
        log::info!("{:?}:\n{}", step.stage, transforms::format_matrix(&step.transform));
    }

    let transform = match &args.fine_transform {
        Some(path) => {
            let fine = transforms::read_transform_txt(path)?;
            composer::compose_chain(&result.transform, &fine)
        }
        None => result.transform,
    };

    println!("transform:\n{}", transforms::format_matrix(&transform));

    if let Some(dir) = &args.output_dir {
        save_aligned(dir, &source, &target, &transform)?;
        transforms::write_transform_json(dir.join("transform.json"), &transform)?;
        println!("Saved aligned clouds to {}", dir.display());
    }

    Ok(())
}

use std::io::{BufWriter, Write};
use std::path::Path;

use crate::pointcloud::PointCloud;

use super::PcdError;

/// Write a point cloud as an ascii PCD v0.7 file.
///
/// The file always carries `x y z intensity`; the intensity column is `0`
/// when the cloud has none.
///
/// # Arguments
/// * `path` - Path to the output `.pcd` file.
/// * `cloud` - The point cloud to write.
pub fn write_pcd_ascii(path: impl AsRef<Path>, cloud: &PointCloud) -> Result<(), PcdError> {
    let file = std::fs::File::create(path.as_ref())?;
    let mut writer = BufWriter::new(file);

    let n = cloud.len();
    writeln!(writer, "# .PCD v0.7 - Point Cloud Data file format")?;
    writeln!(writer, "VERSION 0.7")?;
    writeln!(writer, "FIELDS x y z intensity")?;
    writeln!(writer, "SIZE 4 4 4 4")?;
    writeln!(writer, "TYPE F F F F")?;
    writeln!(writer, "COUNT 1 1 1 1")?;
    writeln!(writer, "WIDTH {n}")?;
    writeln!(writer, "HEIGHT 1")?;
    writeln!(writer, "VIEWPOINT 0 0 0 1 0 0 0")?;
    writeln!(writer, "POINTS {n}")?;
    writeln!(writer, "DATA ascii")?;

    let intensities = cloud.intensities();
    for (i, p) in cloud.points().iter().enumerate() {
        let intensity = intensities.map_or(0.0, |values| values[i]);
        writeln!(writer, "{} {} {} {}", p[0], p[1], p[2], intensity)?;
    }
    writer.flush()?;

    log::debug!("write_pcd_ascii: {n} points to {}", path.as_ref().display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::pcd::read_pcd;

    #[test]
    fn write_then_read_keeps_intensities() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out.pcd");
        let cloud = PointCloud::new(
            vec![[0.25, -1.0, 3.5], [1.0, 2.0, 3.0]],
            Some(vec![12.0, 0.5]),
        )?;
        write_pcd_ascii(&path, &cloud)?;

        let text = std::fs::read_to_string(&path)?;
        assert!(text.contains("VIEWPOINT 0 0 0 1 0 0 0\nPOINTS 2\nDATA ascii\n"));

        let read = read_pcd(&path)?;
        assert_eq!(read, cloud);
        Ok(())
    }

    #[test]
    fn missing_intensity_is_written_as_zero() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out.pcd");
        write_pcd_ascii(&path, &PointCloud::from_points(vec![[1.0, 2.0, 3.0]]))?;

        let read = read_pcd(&path)?;
        assert_eq!(read.intensities(), Some(&[0.0][..]));
        Ok(())
    }
}

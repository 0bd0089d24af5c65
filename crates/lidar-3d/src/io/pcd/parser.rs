use std::collections::HashMap;
use std::io::{BufRead, Read};
use std::path::Path;

use crate::pointcloud::PointCloud;

use super::PcdError;

const MAX_POINT_STEP: usize = 1024;
const MAX_POINTS: usize = 50_000_000;

/// Encoding of the point records after the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PcdData {
    Ascii,
    Binary,
}

/// Describes a single field in a PCD point record
#[derive(Debug)]
struct PcdField {
    offset: usize, // byte offset within a binary record
    column: usize, // first column within an ascii record
    size: usize,   // size of one element (bytes)
    kind: char,    // PCD type: 'F' = float, 'U' = unsigned int, 'I' = signed int
}

#[derive(Debug)]
pub(crate) struct PcdLayout {
    fields: HashMap<String, PcdField>,
    point_step: usize, // total bytes per binary record
    num_columns: usize,
    num_points: usize,
    data: PcdData,
}

impl PcdLayout {
    fn field(&self, name: &str) -> Result<&PcdField, PcdError> {
        self.fields
            .get(name)
            .ok_or_else(|| PcdError::MissingField(name.to_string()))
    }
}

/// Read a little-endian scalar of the given PCD type as f64.
#[inline]
fn read_scalar(buf: &[u8], field: &PcdField) -> Result<f64, PcdError> {
    let slice = buf
        .get(field.offset..field.offset + field.size)
        .ok_or(PcdError::MalformedHeader)?;
    let value = match (field.kind, slice) {
        ('F', &[a, b, c, d]) => f32::from_le_bytes([a, b, c, d]) as f64,
        ('F', &[a, b, c, d, e, f, g, h]) => f64::from_le_bytes([a, b, c, d, e, f, g, h]),
        ('U', &[a]) => a as f64,
        ('U', &[a, b]) => u16::from_le_bytes([a, b]) as f64,
        ('U', &[a, b, c, d]) => u32::from_le_bytes([a, b, c, d]) as f64,
        ('I', &[a]) => a as i8 as f64,
        ('I', &[a, b]) => i16::from_le_bytes([a, b]) as f64,
        ('I', &[a, b, c, d]) => i32::from_le_bytes([a, b, c, d]) as f64,
        _ => return Err(PcdError::UnsupportedProperty),
    };
    Ok(value)
}

pub(crate) fn parse_pcd_layout<R: BufRead>(reader: &mut R) -> Result<PcdLayout, PcdError> {
    let mut field_names: Vec<String> = Vec::new();
    let mut sizes = Vec::new();
    let mut types = Vec::new();
    let mut counts = Vec::new();
    let mut points = None;
    let mut width_height = (None, None);

    let data = loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line)?;
        if n == 0 {
            return Err(PcdError::MalformedHeader);
        }
        let line = line.trim();
        if line.starts_with('#') {
            continue;
        }

        let mut it = line.split_whitespace();
        match it.next() {
            Some("DATA") => match it.next() {
                Some("ascii") => break PcdData::Ascii,
                Some("binary") => break PcdData::Binary,
                _ => return Err(PcdError::UnsupportedProperty),
            },
            Some("SIZE") => {
                sizes = it
                    .map(|v| v.parse::<usize>().map_err(|_| PcdError::MalformedHeader))
                    .collect::<Result<Vec<_>, _>>()?;
            }
            Some("TYPE") => {
                types = it
                    .map(|v| v.chars().next().ok_or(PcdError::MalformedHeader))
                    .collect::<Result<Vec<_>, _>>()?;
            }
            Some("COUNT") => {
                counts = it
                    .map(|v| v.parse::<usize>().map_err(|_| PcdError::MalformedHeader))
                    .collect::<Result<Vec<_>, _>>()?;
            }
            Some(key @ ("POINTS" | "WIDTH" | "HEIGHT")) => {
                let value = it
                    .next()
                    .and_then(|v| v.parse::<usize>().ok())
                    .ok_or(PcdError::MalformedHeader)?;
                match key {
                    "POINTS" => points = Some(value),
                    "WIDTH" => width_height.0 = Some(value),
                    _ => width_height.1 = Some(value),
                }
            }
            Some("FIELDS") => field_names = it.map(String::from).collect(),
            _ => {}
        }
    };

    // POINTS may be omitted by older writers
    let num_points = match (points, width_height) {
        (Some(p), _) => p,
        (None, (Some(w), Some(h))) => w.checked_mul(h).ok_or(PcdError::MalformedHeader)?,
        _ => return Err(PcdError::MalformedHeader),
    };

    if field_names.is_empty()
        || sizes.len() != field_names.len()
        || types.len() != field_names.len()
        || (!counts.is_empty() && counts.len() != field_names.len())
    {
        return Err(PcdError::MalformedHeader);
    }

    if num_points > MAX_POINTS {
        return Err(PcdError::MalformedHeader);
    }

    // Compute byte offsets and ascii columns for each field
    let mut offset = 0usize;
    let mut column = 0usize;
    let mut fields = HashMap::new();

    for (i, name) in field_names.iter().enumerate() {
        // If COUNT is omitted, PCD defines the default count as 1
        let count = counts.get(i).copied().unwrap_or(1);
        let size = sizes[i];
        let kind = types[i];

        match name.as_str() {
            "x" | "y" | "z" => {
                if !(count == 1 && kind == 'F' && (size == 4 || size == 8)) {
                    return Err(PcdError::UnsupportedProperty);
                }
            }
            "intensity" => {
                if !(count == 1
                    && ((kind == 'F' && size == 4) || (kind == 'U' && (size == 1 || size == 2))))
                {
                    return Err(PcdError::UnsupportedProperty);
                }
            }
            _ => {}
        }

        let field = PcdField {
            offset,
            column,
            size,
            kind,
        };

        let field_bytes = size.checked_mul(count).ok_or(PcdError::MalformedHeader)?;
        offset = offset
            .checked_add(field_bytes)
            .ok_or(PcdError::MalformedHeader)?;
        column += count;

        if offset > MAX_POINT_STEP {
            return Err(PcdError::MalformedHeader);
        }

        if fields.insert(name.clone(), field).is_some() {
            return Err(PcdError::MalformedHeader);
        }
    }

    Ok(PcdLayout {
        fields,
        point_step: offset,
        num_columns: column,
        num_points,
        data,
    })
}

fn read_records<R: BufRead>(
    reader: &mut R,
    layout: &PcdLayout,
) -> Result<(Vec<[f64; 3]>, Option<Vec<f32>>), PcdError> {
    let fx = layout.field("x")?;
    let fy = layout.field("y")?;
    let fz = layout.field("z")?;
    let fi = layout.fields.get("intensity");

    let mut points = Vec::with_capacity(layout.num_points);
    let mut intensities = fi.map(|_| Vec::with_capacity(layout.num_points));

    match layout.data {
        PcdData::Binary => {
            if layout.point_step == 0 {
                return Err(PcdError::MalformedHeader);
            }
            let mut buffer = vec![0u8; layout.point_step];
            for _ in 0..layout.num_points {
                reader.read_exact(&mut buffer)?;
                points.push([
                    read_scalar(&buffer, fx)?,
                    read_scalar(&buffer, fy)?,
                    read_scalar(&buffer, fz)?,
                ]);
                if let (Some(f), Some(values)) = (fi, intensities.as_mut()) {
                    values.push(read_scalar(&buffer, f)? as f32);
                }
            }
        }
        PcdData::Ascii => {
            let mut line = String::new();
            while points.len() < layout.num_points {
                line.clear();
                if reader.read_line(&mut line)? == 0 {
                    return Err(PcdError::Truncated {
                        expected: layout.num_points,
                        got: points.len(),
                    });
                }
                let columns = line.split_whitespace().collect::<Vec<_>>();
                if columns.is_empty() {
                    continue;
                }
                if columns.len() < layout.num_columns {
                    return Err(PcdError::InvalidRecord(line.trim().to_string()));
                }
                let parse = |f: &PcdField| {
                    columns[f.column]
                        .parse::<f64>()
                        .map_err(|_| PcdError::InvalidRecord(line.trim().to_string()))
                };
                points.push([parse(fx)?, parse(fy)?, parse(fz)?]);
                if let (Some(f), Some(values)) = (fi, intensities.as_mut()) {
                    values.push(parse(f)? as f32);
                }
            }
        }
    }

    Ok((points, intensities))
}

/// Read a PCD file, either `DATA ascii` or `DATA binary`.
///
/// # Arguments
/// * `path` - Path to a `.pcd` file.
///
/// # Returns
/// A [`PointCloud`] containing:
/// - 3D points (always)
/// - intensities (if the file has an `intensity` field)
///
/// Records with a non-finite coordinate or intensity are dropped.
pub fn read_pcd(path: impl AsRef<Path>) -> Result<PointCloud, PcdError> {
    let Some(file_ext) = path.as_ref().extension() else {
        return Err(PcdError::InvalidFileExtension("".into()));
    };

    if file_ext != "pcd" {
        return Err(PcdError::InvalidFileExtension(
            file_ext.to_string_lossy().to_string(),
        ));
    }

    let file = std::fs::File::open(path.as_ref())?;
    let mut reader = std::io::BufReader::new(file);

    let layout = parse_pcd_layout(&mut reader)?;
    let (points, intensities) = read_records(&mut reader, &layout)?;

    let mut cloud = PointCloud::new(points, intensities)?;
    cloud.retain_finite();

    log::debug!(
        "read_pcd: {} points ({:?}) from {}",
        cloud.len(),
        layout.data,
        path.as_ref().display()
    );

    Ok(cloud)
}

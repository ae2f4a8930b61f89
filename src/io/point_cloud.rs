//! Indexed-triangle point-cloud text format (spec §6): the input/output
//! format used to hand samples to, and read meshless output back from, the
//! external Poisson/FSSR reconstructors.
//!
//! Each line is `x y z` or, when normals are present, `x y z nx ny nz`. A
//! normal's length encodes the sample's confidence or scale, per spec §6
//! ("optional normals with length encoding confidence or scale") — callers
//! that don't have a meaningful confidence value write unit-length normals.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::{
    error::{Error, Result},
    helpers::aliases::{Normal3, Vec3},
};

#[derive(Debug, Clone, Copy)]
pub struct PointSample {
    pub position: Vec3,
    /// `None` for a point cloud with no surface-orientation information.
    /// Present when writing for Poisson, whose `--confidence` flag reads
    /// the normal length as that per-point confidence.
    pub normal: Option<Normal3>,
}

/// Writes `points` in the plain-text indexed-triangle point-cloud format.
pub fn write_point_cloud(path: &Path, points: &[PointSample]) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    for p in points {
        match p.normal {
            Some(n) => writeln!(writer, "{} {} {} {} {} {}", p.position.x, p.position.y, p.position.z, n.x, n.y, n.z)?,
            None => writeln!(writer, "{} {} {}", p.position.x, p.position.y, p.position.z)?,
        }
    }

    writer.flush()?;
    Ok(())
}

/// Reads a point cloud in the same format, used both for round-tripping
/// Poisson/FSSR inputs in tests and for reading their output when the
/// reconstructor happens to emit the same text format rather than a mesh.
pub fn read_point_cloud(path: &Path) -> Result<Vec<PointSample>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let fields: Vec<f64> = line
            .split_whitespace()
            .map(|s| s.parse::<f64>().map_err(|e| Error::MalformedInput(format!("invalid point-cloud field {s:?}: {e}"))))
            .collect::<Result<_>>()?;

        let sample = match fields.as_slice() {
            [x, y, z] => PointSample { position: Vec3::new(*x, *y, *z), normal: None },
            [x, y, z, nx, ny, nz] => {
                PointSample { position: Vec3::new(*x, *y, *z), normal: Some(Normal3::new(*nx, *ny, *nz)) }
            }
            _ => return Err(Error::MalformedInput(format!("point-cloud line has {} fields", fields.len()))),
        };
        out.push(sample);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_points_with_and_without_normals() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("points.xyz");

        let points = vec![
            PointSample { position: Vec3::new(1.0, 2.0, 3.0), normal: Some(Normal3::new(0.0, 0.0, 1.0)) },
            PointSample { position: Vec3::new(-1.0, 0.5, 0.25), normal: None },
        ];

        write_point_cloud(&path, &points).unwrap();
        let read_back = read_point_cloud(&path).unwrap();

        assert_eq!(read_back.len(), 2);
        assert_eq!(read_back[0].position, points[0].position);
        assert!(read_back[0].normal.is_some());
        assert!(read_back[1].normal.is_none());
    }

    #[test]
    fn rejects_malformed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.xyz");
        std::fs::write(&path, "1.0 2.0\n").unwrap();
        assert!(read_point_cloud(&path).is_err());
    }
}

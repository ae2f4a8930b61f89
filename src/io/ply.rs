//! Minimal ASCII PLY reader/writer — the mesh format the Poisson and FSSR
//! reconstructor executables read and write (spec §6).
//!
//! Only the subset actually needed is supported: `vertex` elements with
//! `x y z` (plus optional `nx ny nz` and `red green blue`, skipped if
//! present but unused) and `face` elements with a `vertex_indices` (or
//! `vertex_index`) list property. Binary PLY is out of scope: the core
//! always writes and reads ASCII, and treats a binary-format header as a
//! malformed-input error rather than guessing a layout.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::{
    error::{Error, Result},
    helpers::aliases::Vec3,
    mesh::Mesh,
};

pub fn read_ply_mesh(path: &Path) -> Result<Mesh> {
    let file = File::open(path)?;
    let mut lines = BufReader::new(file).lines();

    let magic = lines.next().ok_or_else(|| malformed("empty PLY file"))??;
    if magic.trim() != "ply" {
        return Err(malformed("missing 'ply' magic header"));
    }

    let mut vertex_count = 0usize;
    let mut face_count = 0usize;
    let mut vertex_props: Vec<String> = Vec::new();
    let mut element = String::new();

    loop {
        let line = lines.next().ok_or_else(|| malformed("PLY header ended without end_header"))??;
        let line = line.trim();

        if line == "end_header" {
            break;
        }
        if line.starts_with("format") {
            if !line.contains("ascii") {
                return Err(malformed("only ASCII PLY is supported"));
            }
            continue;
        }
        if let Some(rest) = line.strip_prefix("element vertex ") {
            element = "vertex".to_string();
            vertex_count = rest.trim().parse().map_err(|_| malformed("bad vertex count"))?;
            continue;
        }
        if let Some(rest) = line.strip_prefix("element face ") {
            element = "face".to_string();
            face_count = rest.trim().parse().map_err(|_| malformed("bad face count"))?;
            continue;
        }
        if element == "vertex" {
            if let Some(rest) = line.strip_prefix("property ") {
                let name = rest.split_whitespace().last().unwrap_or("").to_string();
                vertex_props.push(name);
            }
        }
    }

    let x_idx = index_of(&vertex_props, "x")?;
    let y_idx = index_of(&vertex_props, "y")?;
    let z_idx = index_of(&vertex_props, "z")?;

    let mut positions = Vec::with_capacity(vertex_count);
    for _ in 0..vertex_count {
        let line = lines.next().ok_or_else(|| malformed("truncated vertex list"))??;
        let fields: Vec<f64> = line
            .split_whitespace()
            .map(|s| s.parse::<f64>().map_err(|_| malformed("non-numeric vertex field")))
            .collect::<Result<_>>()?;
        positions.push(Vec3::new(fields[x_idx], fields[y_idx], fields[z_idx]));
    }

    let mut faces = Vec::with_capacity(face_count);
    for _ in 0..face_count {
        let line = lines.next().ok_or_else(|| malformed("truncated face list"))??;
        let fields: Vec<usize> = line
            .split_whitespace()
            .map(|s| s.parse::<usize>().map_err(|_| malformed("non-integer face index")))
            .collect::<Result<_>>()?;
        let n = fields[0];
        if n < 3 {
            continue;
        }
        // Fan-triangulate any higher-order polygon the reconstructor emits.
        for i in 1..n - 1 {
            faces.push([fields[1] as u32, fields[1 + i] as u32, fields[2 + i] as u32]);
        }
    }

    let mesh = Mesh::new(positions, faces);
    mesh.validate()?;
    Ok(mesh)
}

pub fn write_ply_mesh(path: &Path, mesh: &Mesh) -> Result<()> {
    let file = File::create(path)?;
    let mut w = BufWriter::new(file);

    writeln!(w, "ply")?;
    writeln!(w, "format ascii 1.0")?;
    writeln!(w, "element vertex {}", mesh.vertex_count())?;
    writeln!(w, "property float x")?;
    writeln!(w, "property float y")?;
    writeln!(w, "property float z")?;
    writeln!(w, "element face {}", mesh.face_count())?;
    writeln!(w, "property list uchar int vertex_indices")?;
    writeln!(w, "end_header")?;

    for p in &mesh.positions {
        writeln!(w, "{} {} {}", p.x, p.y, p.z)?;
    }
    for f in &mesh.faces {
        writeln!(w, "3 {} {} {}", f[0], f[1], f[2])?;
    }

    w.flush()?;
    Ok(())
}

fn index_of(props: &[String], name: &str) -> Result<usize> {
    props.iter().position(|p| p == name).ok_or_else(|| malformed(&format!("PLY vertex is missing property '{name}'")))
}

fn malformed(msg: &str) -> Error {
    Error::MalformedInput(format!("PLY: {msg}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle_mesh() -> Mesh {
        Mesh::new(
            vec![Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0)],
            vec![[0, 1, 2]],
        )
    }

    #[test]
    fn round_trips_a_simple_mesh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.ply");
        let mesh = triangle_mesh();

        write_ply_mesh(&path, &mesh).unwrap();
        let read_back = read_ply_mesh(&path).unwrap();

        assert_eq!(read_back.vertex_count(), mesh.vertex_count());
        assert_eq!(read_back.face_count(), mesh.face_count());
    }

    #[test]
    fn rejects_binary_format_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bin.ply");
        std::fs::write(&path, "ply\nformat binary_little_endian 1.0\nend_header\n").unwrap();
        assert!(read_ply_mesh(&path).is_err());
    }
}

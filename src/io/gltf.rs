//! Binary glTF (.glb) read/write for tileset mesh files (spec §6: "binary
//! glTF variants for polygonal tiles"). The `gltf` crate is an import-only
//! library, so writing builds the JSON chunk directly with `serde_json`
//! and packs the GLB container by hand; reading goes through `gltf` itself
//! so the round-trip properties in spec §8 are checked against the same
//! parser any downstream consumer would use.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};

use crate::{
    error::{Error, Result},
    helpers::aliases::{Normal3, Vec3},
    mesh::Mesh,
};

const MAGIC: &[u8; 4] = b"glTF";
const VERSION: u32 = 2;
const CHUNK_JSON: &[u8; 4] = b"JSON";
const CHUNK_BIN: &[u8; 4] = b"BIN\0";

/// Writes `mesh` as a single-primitive binary glTF file embedding all
/// attribute and index data in the GLB's BIN chunk.
pub fn write_glb_mesh(path: &Path, mesh: &Mesh) -> Result<()> {
    let mut bin = Vec::new();
    let mut accessors = Vec::new();
    let mut attributes = serde_json::Map::new();

    let indices_view = push_indices(&mut bin, mesh);
    accessors.push(indices_view.0);
    let indices_accessor = accessors.len() - 1;

    let (pos_accessor, pos_idx) = push_vec3(&mut bin, &mut accessors, &mesh.positions, true);
    attributes.insert("POSITION".into(), serde_json::json!(pos_idx));
    let _ = pos_accessor;

    if let Some(normals) = &mesh.normals {
        let (_, idx) = push_normals(&mut bin, &mut accessors, normals);
        attributes.insert("NORMAL".into(), serde_json::json!(idx));
    }

    if let Some(uvs) = &mesh.uvs {
        let (_, idx) = push_uvs(&mut bin, &mut accessors, uvs);
        attributes.insert("TEXCOORD_0".into(), serde_json::json!(idx));
    }

    if let Some(colors) = &mesh.colors {
        let (_, idx) = push_colors(&mut bin, &mut accessors, colors);
        attributes.insert("COLOR_0".into(), serde_json::json!(idx));
    }

    let buffer_views: Vec<serde_json::Value> = accessors
        .iter()
        .map(|a: &Accessor| {
            serde_json::json!({
                "buffer": 0,
                "byteOffset": a.byte_offset,
                "byteLength": a.byte_length,
                "target": a.target,
            })
        })
        .collect();

    let json_accessors: Vec<serde_json::Value> = accessors
        .iter()
        .enumerate()
        .map(|(i, a)| {
            let mut v = serde_json::json!({
                "bufferView": i,
                "byteOffset": 0,
                "componentType": a.component_type,
                "count": a.count,
                "type": a.accessor_type,
            });
            if let (Some(min), Some(max)) = (&a.min, &a.max) {
                v["min"] = serde_json::json!(min);
                v["max"] = serde_json::json!(max);
            }
            v
        })
        .collect();

    let root = serde_json::json!({
        "asset": { "version": "2.0", "generator": "landform_core" },
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "mesh": 0 }],
        "meshes": [{
            "primitives": [{
                "attributes": attributes,
                "indices": indices_accessor,
                "mode": 4,
            }],
        }],
        "accessors": json_accessors,
        "bufferViews": buffer_views,
        "buffers": [{ "byteLength": bin.len() }],
    });

    write_glb(path, &root, &bin)
}

struct Accessor {
    byte_offset: usize,
    byte_length: usize,
    component_type: u32,
    accessor_type: &'static str,
    count: usize,
    target: u32,
    min: Option<Vec<f64>>,
    max: Option<Vec<f64>>,
}

const COMPONENT_FLOAT: u32 = 5126;
const COMPONENT_UINT: u32 = 5125;
const TARGET_ARRAY_BUFFER: u32 = 34962;
const TARGET_ELEMENT_ARRAY_BUFFER: u32 = 34963;

fn align4(bin: &mut Vec<u8>) {
    while bin.len() % 4 != 0 {
        bin.push(0);
    }
}

fn push_indices(bin: &mut Vec<u8>, mesh: &Mesh) -> (Accessor, usize) {
    align4(bin);
    let offset = bin.len();
    for face in &mesh.faces {
        for &idx in face {
            bin.write_u32::<LittleEndian>(idx).unwrap();
        }
    }
    let len = bin.len() - offset;
    (
        Accessor {
            byte_offset: offset,
            byte_length: len,
            component_type: COMPONENT_UINT,
            accessor_type: "SCALAR",
            count: mesh.faces.len() * 3,
            target: TARGET_ELEMENT_ARRAY_BUFFER,
            min: None,
            max: None,
        },
        0,
    )
}

fn push_vec3(bin: &mut Vec<u8>, accessors: &mut Vec<Accessor>, values: &[Vec3], with_bounds: bool) -> (usize, usize) {
    align4(bin);
    let offset = bin.len();
    let mut min = [f64::INFINITY; 3];
    let mut max = [f64::NEG_INFINITY; 3];
    for p in values {
        bin.write_f32::<LittleEndian>(p.x as f32).unwrap();
        bin.write_f32::<LittleEndian>(p.y as f32).unwrap();
        bin.write_f32::<LittleEndian>(p.z as f32).unwrap();
        for i in 0..3 {
            min[i] = min[i].min(p[i]);
            max[i] = max[i].max(p[i]);
        }
    }
    let len = bin.len() - offset;
    accessors.push(Accessor {
        byte_offset: offset,
        byte_length: len,
        component_type: COMPONENT_FLOAT,
        accessor_type: "VEC3",
        count: values.len(),
        target: TARGET_ARRAY_BUFFER,
        min: if with_bounds { Some(min.to_vec()) } else { None },
        max: if with_bounds { Some(max.to_vec()) } else { None },
    });
    (accessors.len() - 1, accessors.len() - 1)
}

fn push_normals(bin: &mut Vec<u8>, accessors: &mut Vec<Accessor>, values: &[Normal3]) -> (usize, usize) {
    align4(bin);
    let offset = bin.len();
    for n in values {
        bin.write_f32::<LittleEndian>(n.x as f32).unwrap();
        bin.write_f32::<LittleEndian>(n.y as f32).unwrap();
        bin.write_f32::<LittleEndian>(n.z as f32).unwrap();
    }
    let len = bin.len() - offset;
    accessors.push(Accessor {
        byte_offset: offset,
        byte_length: len,
        component_type: COMPONENT_FLOAT,
        accessor_type: "VEC3",
        count: values.len(),
        target: TARGET_ARRAY_BUFFER,
        min: None,
        max: None,
    });
    (accessors.len() - 1, accessors.len() - 1)
}

fn push_uvs(bin: &mut Vec<u8>, accessors: &mut Vec<Accessor>, values: &[[f32; 2]]) -> (usize, usize) {
    align4(bin);
    let offset = bin.len();
    for uv in values {
        bin.write_f32::<LittleEndian>(uv[0]).unwrap();
        bin.write_f32::<LittleEndian>(uv[1]).unwrap();
    }
    let len = bin.len() - offset;
    accessors.push(Accessor {
        byte_offset: offset,
        byte_length: len,
        component_type: COMPONENT_FLOAT,
        accessor_type: "VEC2",
        count: values.len(),
        target: TARGET_ARRAY_BUFFER,
        min: None,
        max: None,
    });
    (accessors.len() - 1, accessors.len() - 1)
}

fn push_colors(bin: &mut Vec<u8>, accessors: &mut Vec<Accessor>, values: &[[f32; 4]]) -> (usize, usize) {
    align4(bin);
    let offset = bin.len();
    for c in values {
        for &channel in c {
            bin.write_f32::<LittleEndian>(channel).unwrap();
        }
    }
    let len = bin.len() - offset;
    accessors.push(Accessor {
        byte_offset: offset,
        byte_length: len,
        component_type: COMPONENT_FLOAT,
        accessor_type: "VEC4",
        count: values.len(),
        target: TARGET_ARRAY_BUFFER,
        min: None,
        max: None,
    });
    (accessors.len() - 1, accessors.len() - 1)
}

fn write_glb(path: &Path, json: &serde_json::Value, bin: &[u8]) -> Result<()> {
    let mut json_bytes = serde_json::to_vec(json)?;
    while json_bytes.len() % 4 != 0 {
        json_bytes.push(b' ');
    }

    let mut bin_bytes = bin.to_vec();
    while bin_bytes.len() % 4 != 0 {
        bin_bytes.push(0);
    }

    let total_len = 12 + (8 + json_bytes.len()) + (8 + bin_bytes.len());

    let mut out = Vec::with_capacity(total_len);
    out.write_all(MAGIC)?;
    out.write_u32::<LittleEndian>(VERSION)?;
    out.write_u32::<LittleEndian>(total_len as u32)?;

    out.write_u32::<LittleEndian>(json_bytes.len() as u32)?;
    out.write_all(CHUNK_JSON)?;
    out.write_all(&json_bytes)?;

    out.write_u32::<LittleEndian>(bin_bytes.len() as u32)?;
    out.write_all(CHUNK_BIN)?;
    out.write_all(&bin_bytes)?;

    let mut file = File::create(path)?;
    file.write_all(&out)?;
    Ok(())
}

/// Reads back a glb written by [`write_glb_mesh`] using the `gltf` crate's
/// own parser, so the round-trip test exercises the same validation a
/// real consumer would apply.
pub fn read_glb_mesh(path: &Path) -> Result<Mesh> {
    let mut bytes = Vec::new();
    File::open(path)?.read_to_end(&mut bytes)?;

    let gltf = ::gltf::Gltf::from_slice(&bytes).map_err(Error::Gltf)?;
    let blob = gltf.blob.clone().ok_or_else(|| Error::MalformedInput("glb has no binary chunk".into()))?;

    let mesh_doc = gltf
        .meshes()
        .next()
        .ok_or_else(|| Error::MalformedInput("glb has no mesh".into()))?;
    let primitive = mesh_doc
        .primitives()
        .next()
        .ok_or_else(|| Error::MalformedInput("glb mesh has no primitive".into()))?;

    let reader = primitive.reader(|_| Some(&blob));
    let positions: Vec<Vec3> = reader
        .read_positions()
        .ok_or_else(|| Error::MalformedInput("glb primitive has no positions".into()))?
        .map(|p| Vec3::new(p[0] as f64, p[1] as f64, p[2] as f64))
        .collect();

    let faces: Vec<[u32; 3]> = reader
        .read_indices()
        .ok_or_else(|| Error::MalformedInput("glb primitive has no indices".into()))?
        .into_u32()
        .collect::<Vec<_>>()
        .chunks_exact(3)
        .map(|c| [c[0], c[1], c[2]])
        .collect();

    let mut mesh = Mesh::new(positions, faces);

    if let Some(normals) = reader.read_normals() {
        mesh.normals = Some(normals.map(|n| Normal3::new(n[0] as f64, n[1] as f64, n[2] as f64)).collect());
    }
    if let Some(uvs) = reader.read_tex_coords(0) {
        mesh.uvs = Some(uvs.into_f32().collect());
    }

    mesh.validate()?;
    Ok(mesh)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle_mesh() -> Mesh {
        let mut mesh = Mesh::new(
            vec![Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0)],
            vec![[0, 1, 2]],
        );
        mesh.recompute_normals();
        mesh
    }

    #[test]
    fn round_trips_positions_and_indices() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tri.glb");
        let mesh = triangle_mesh();

        write_glb_mesh(&path, &mesh).unwrap();
        let read_back = read_glb_mesh(&path).unwrap();

        assert_eq!(read_back.vertex_count(), mesh.vertex_count());
        assert_eq!(read_back.faces, mesh.faces);
        for (a, b) in read_back.positions.iter().zip(mesh.positions.iter()) {
            assert!((a - b).norm() < 1e-5);
        }
    }

    #[test]
    fn writing_twice_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let mesh = triangle_mesh();

        let path_a = dir.path().join("a.glb");
        let path_b = dir.path().join("b.glb");
        write_glb_mesh(&path_a, &mesh).unwrap();
        write_glb_mesh(&path_b, &mesh).unwrap();

        assert_eq!(std::fs::read(path_a).unwrap(), std::fs::read(path_b).unwrap());
    }
}

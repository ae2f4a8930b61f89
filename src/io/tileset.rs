//! Tileset file and manifest writers (spec §6): per-tile mesh/texture/index
//! files on disk plus the root manifest that ties bounds, geometric error
//! and child references together into the hierarchy a viewer streams.

use std::fs;
use std::path::{Path, PathBuf};

use image::{ImageBuffer, Rgb, RgbImage};
use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    geometry::primitives::box3::Box3,
    io::{gltf, point_cloud::PointSample},
    mesh::Mesh,
    texturing::IndexImage,
};

/// One node of the tileset hierarchy written to the manifest (spec §3's
/// tile tree, serialized): bounds, error, content reference and children,
/// relative to `root_dir`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TileManifestEntry {
    pub bounds_min: [f64; 3],
    pub bounds_max: [f64; 3],
    pub geometric_error: f64,
    pub texture_error: Option<f64>,
    /// Path to the tile's mesh file, relative to the tileset root. `None`
    /// for a synthetic or otherwise content-less node.
    pub content_uri: Option<String>,
    pub texture_uri: Option<String>,
    pub index_uri: Option<String>,
    /// Row-major 4x4 transform from this tile's local frame to its
    /// parent's (spec §6: "a transform relative to its parent"). Identity
    /// for every tile in this crate, since tiles are already expressed in
    /// one shared terrain frame; kept explicit so a consumer never has to
    /// special-case a missing field.
    pub transform: [f64; 16],
    pub children: Vec<TileManifestEntry>,
}

const IDENTITY_TRANSFORM: [f64; 16] = {
    let mut m = [0.0; 16];
    m[0] = 1.0;
    m[5] = 1.0;
    m[10] = 1.0;
    m[15] = 1.0;
    m
};

impl TileManifestEntry {
    pub fn leaf(bounds: &Box3, geometric_error: f64) -> Self {
        Self {
            bounds_min: [bounds.get_min().x, bounds.get_min().y, bounds.get_min().z],
            bounds_max: [bounds.get_max().x, bounds.get_max().y, bounds.get_max().z],
            geometric_error,
            texture_error: None,
            content_uri: None,
            texture_uri: None,
            index_uri: None,
            transform: IDENTITY_TRANSFORM,
            children: Vec::new(),
        }
    }
}

/// The tileset root document (spec §6): the manifest consumers walk to
/// decide which tiles to load at a given viewing distance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TilesetManifest {
    pub version: String,
    pub root: TileManifestEntry,
}

/// Writes tile content (meshes, textures, index images) and the manifest
/// tying them together, all paths relative to a single output directory.
pub struct TilesetWriter {
    root_dir: PathBuf,
}

impl TilesetWriter {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self { root_dir: root_dir.into() }
    }

    fn resolve(&self, relative_path: &str) -> Result<PathBuf> {
        let path = self.root_dir.join(relative_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(path)
    }

    /// Writes `mesh` as a binary glTF tile (spec §6: "binary glTF variants
    /// for polygonal tiles").
    pub fn write_tile_mesh(&self, relative_path: &str, mesh: &Mesh) -> Result<()> {
        gltf::write_glb_mesh(&self.resolve(relative_path)?, mesh)
    }

    /// Writes a point cloud as a tile's content for very coarse levels
    /// (spec §6: "a point-cloud variant ... for very coarse levels where a
    /// surface has not been reconstructed").
    pub fn write_tile_point_cloud(&self, relative_path: &str, points: &[PointSample]) -> Result<()> {
        crate::io::point_cloud::write_point_cloud(&self.resolve(relative_path)?, points)
    }

    /// Writes the RGB color texture (spec §6: "an RGB texture image").
    pub fn write_rgb_texture(&self, relative_path: &str, image: &RgbImage) -> Result<()> {
        image.save(self.resolve(relative_path)?)?;
        Ok(())
    }

    /// Writes the per-texel provenance index image as a 3-band 16-bit PNG
    /// (spec §3/§6: observation index, source row, source column).
    pub fn write_index_image(&self, relative_path: &str, index: &IndexImage) -> Result<()> {
        let n = (index.width * index.height) as usize;
        let mut interleaved = Vec::with_capacity(n * 3);
        for i in 0..n {
            interleaved.push(index.observation[i]);
            interleaved.push(index.row[i]);
            interleaved.push(index.col[i]);
        }

        let buffer: ImageBuffer<Rgb<u16>, Vec<u16>> = ImageBuffer::from_raw(index.width, index.height, interleaved)
            .ok_or_else(|| crate::error::Error::MalformedInput("index image dimensions do not match buffer length".into()))?;
        buffer.save(self.resolve(relative_path)?)?;
        Ok(())
    }

    /// Writes the tileset root manifest as JSON (spec §6: "a tileset root
    /// document ... per-tile bounds, geometric error, child references,
    /// content URI and a transform relative to the parent").
    pub fn write_manifest(&self, relative_path: &str, manifest: &TilesetManifest) -> Result<()> {
        let path = self.resolve(relative_path)?;
        let json = serde_json::to_vec_pretty(manifest)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn read_manifest(&self, relative_path: &str) -> Result<TilesetManifest> {
        let bytes = fs::read(self.root_dir.join(relative_path))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::aliases::Vec3;

    fn unit_mesh() -> Mesh {
        Mesh::new(
            vec![Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0)],
            vec![[0, 1, 2]],
        )
    }

    #[test]
    fn writes_mesh_texture_index_and_manifest_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let writer = TilesetWriter::new(dir.path());

        let mesh = unit_mesh();
        writer.write_tile_mesh("tiles/0/mesh.glb", &mesh).unwrap();
        assert!(dir.path().join("tiles/0/mesh.glb").exists());

        let image = RgbImage::new(4, 4);
        writer.write_rgb_texture("tiles/0/texture.png", &image).unwrap();
        assert!(dir.path().join("tiles/0/texture.png").exists());

        let index = IndexImage {
            width: 2,
            height: 2,
            observation: vec![1, 0, 2, 0],
            row: vec![1, 0, 3, 0],
            col: vec![2, 0, 1, 0],
        };
        writer.write_index_image("tiles/0/index.png", &index).unwrap();
        assert!(dir.path().join("tiles/0/index.png").exists());

        let bounds = mesh.bounds();
        let mut root = TileManifestEntry::leaf(&bounds, 0.0);
        root.content_uri = Some("tiles/0/mesh.glb".into());
        let manifest = TilesetManifest { version: "1.0".into(), root };
        writer.write_manifest("tileset.json", &manifest).unwrap();

        let read_back = writer.read_manifest("tileset.json").unwrap();
        assert_eq!(read_back.root.content_uri.as_deref(), Some("tiles/0/mesh.glb"));
    }
}

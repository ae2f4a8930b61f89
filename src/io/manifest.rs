//! Terrain and scene manifests (spec §6): documented interface-boundary
//! data definitions only. Authoring the manifests that reference these
//! tilesets, mission frames, and observation catalogs is out of scope; this
//! module defines the shapes a caller serializes/deserializes at that
//! boundary, mirroring the tileset manifest in [`super::tileset`].

use serde::{Deserialize, Serialize};

/// One source image registered against a terrain (spec §3: "image, camera
/// model, integer index assigned at ingestion").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservationEntry {
    pub index: u32,
    pub image_uri: String,
    /// Camera model parameters, opaque to this crate: whatever a mission's
    /// camera-calibration pipeline produced.
    pub camera: serde_json::Value,
}

/// A single terrain's manifest: the tileset it produced plus the
/// observation catalog that was backprojected onto it (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerrainManifest {
    pub name: String,
    pub tileset_uri: String,
    pub observations: Vec<ObservationEntry>,
}

/// One terrain's placement within a larger scene (spec §6: "a transform
/// relative to the parent").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TilesetEntry {
    pub terrain_manifest_uri: String,
    /// Row-major 4x4 transform from the terrain's local frame to the
    /// scene frame.
    pub transform: [f64; 16],
}

/// A scene composed of one or more terrains, each independently tiled and
/// textured, placed by [`TilesetEntry::transform`] (spec §3: multiple
/// terrains making up one scene).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneManifest {
    pub name: String,
    pub tilesets: Vec<TilesetEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scene_manifest_round_trips_through_json() {
        let scene = SceneManifest {
            name: "landing-site-7".into(),
            tilesets: vec![TilesetEntry {
                terrain_manifest_uri: "terrains/a/manifest.json".into(),
                transform: {
                    let mut m = [0.0; 16];
                    for i in 0..4 {
                        m[i * 4 + i] = 1.0;
                    }
                    m
                },
            }],
        };

        let json = serde_json::to_string(&scene).unwrap();
        let read_back: SceneManifest = serde_json::from_str(&json).unwrap();
        assert_eq!(read_back.name, scene.name);
        assert_eq!(read_back.tilesets.len(), 1);
    }
}

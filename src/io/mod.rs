//! External interfaces (spec §6): reconstructor subprocess I/O, the mesh
//! and point-cloud wire formats that cross that boundary, and the tileset
//! files and manifests the pipeline emits.

pub mod gltf;
pub mod manifest;
pub mod ply;
pub mod point_cloud;
pub mod reconstruct;
pub mod tileset;

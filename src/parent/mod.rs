//! Parent Tile Builder (component D): given a set of already-built, already
//! textured finer tiles, constructs the coarser mesh and texture one level
//! up, bottom-up, with computable geometric and texture error for
//! screen-space-error-driven streaming.

use image::{Rgb, RgbImage};
use rayon::prelude::*;

use crate::{
    algo::{
        rng::DeterministicRng,
        sample_points::{sample_area_weighted, SurfaceSample},
    },
    decimation::{decimate, DecimationOptions},
    error::{Error, Result},
    geometry::primitives::box3::Box3,
    helpers::aliases::Vec3,
    io::{point_cloud::PointSample, reconstruct::SurfaceReconstructor},
    mesh::Mesh,
    spatial_partitioning::aabb_tree::{AABBTree, IndexedTriangle, MedianCut},
    texturing::{bake_chart_uvs, sample_bilinear, Chart},
};

/// A finer-level tile already built and textured, as seen by its parent.
pub struct ChildTile {
    pub mesh: Mesh,
    pub texture: RgbImage,
    /// This child's own texture error, used as an inverse-confidence proxy
    /// when several children's color claims for the same parent texel tie
    /// (spec §4.D step 5: "prefer the highest-confidence sample").
    pub texture_error: f64,
}

pub struct ParentTileResult {
    pub mesh: Mesh,
    pub texture: RgbImage,
    pub geometric_error: f64,
    pub texture_error: f64,
}

#[derive(Debug, Clone)]
pub struct ParentBuildConfig {
    pub target_face_count: usize,
    /// Points sampled per target face during reconstruction (spec §4.D
    /// step 2: "target density proportional to the desired face count").
    pub samples_per_face: f64,
    /// How far beyond the parent's clip bounds to search for finer
    /// meshes, meters (spec §4.D step 1).
    pub search_expansion: f64,
    /// A connected component of the reconstructed mesh is dropped if its
    /// bounding-box diagonal is smaller than this fraction of the whole
    /// mesh's diagonal.
    pub min_component_diameter_fraction: f64,
    /// Snap a bounding-box corner to the nearest mesh vertex, and pin it
    /// through decimation, only if that vertex is within this distance.
    pub corner_snap_tolerance: f64,
    pub texture_resolution: u32,
    /// Texel-group size (spec §4.D step 6) used to derive texture error.
    pub texel_group_size_px: u32,
    /// Candidates within this fraction of the globally nearest distance
    /// are considered tied, and resolved by confidence instead.
    pub tie_break_fraction: f64,
    pub error_sample_count: usize,
    pub decimation_options: DecimationOptions,
    pub rng_seed: u64,
}

impl Default for ParentBuildConfig {
    fn default() -> Self {
        Self {
            target_face_count: 4096,
            samples_per_face: 6.0,
            search_expansion: 1.0,
            min_component_diameter_fraction: 0.02,
            corner_snap_tolerance: 0.5,
            texture_resolution: 512,
            texel_group_size_px: 2,
            tie_break_fraction: 0.1,
            error_sample_count: 500,
            decimation_options: DecimationOptions::default(),
            rng_seed: 0,
        }
    }
}

/// Builds one parent tile from its finer-level children (spec §4.D,
/// per-parent algorithm steps 1-6).
pub fn build_parent_tile(
    parent_bounds: &Box3,
    children: &[ChildTile],
    reconstructor: &dyn SurfaceReconstructor,
    config: &ParentBuildConfig,
    work_dir: &std::path::Path,
) -> Result<ParentTileResult> {
    // Step 1: gather finer meshes overlapping the expanded search bounds.
    let search_bounds = parent_bounds.expanded(config.search_expansion);
    let gathered: Vec<&ChildTile> = children.iter().filter(|c| c.mesh.bounds().intersects_box3(&search_bounds)).collect();

    if gathered.is_empty() {
        return Err(Error::InvariantViolation("parent tile has no finer-level content in its search bounds".into()));
    }

    // Step 2: sample points on the gathered triangles, area-weighted.
    let mut rng = DeterministicRng::new(config.rng_seed);
    let points = sample_children(&gathered, config.target_face_count, config.samples_per_face, &mut rng);
    if points.is_empty() {
        return Err(Error::InvariantViolation("no surface samples were generated for parent reconstruction".into()));
    }

    // Step 3: reconstruct, clip to the parent's (unexpanded) bounds, drop
    // small components.
    let mut mesh = reconstructor.reconstruct(&points, work_dir)?;
    clip_to_bounds(&mut mesh, parent_bounds);
    if mesh.face_count() == 0 {
        return Err(Error::InvariantViolation("reconstructed parent mesh has no faces within its bounds".into()));
    }
    remove_small_components(&mut mesh, config.min_component_diameter_fraction);
    mesh.validate()?;

    // Step 4: decimate to budget, pinning bounding-box corners so
    // tile-to-tile seams survive.
    if mesh.face_count() > config.target_face_count {
        let pinned = snap_corners(&mut mesh, parent_bounds, config.corner_snap_tolerance);
        let mut options = config.decimation_options.clone();
        options.pinned_vertices.extend(pinned);
        mesh = decimate(&mesh, config.target_face_count, &options)?;
    }
    mesh.recompute_normals();

    // Step 5: transfer color from the finer tiles onto a fresh texture.
    let face_indices: Vec<usize> = (0..mesh.face_count()).collect();
    bake_chart_uvs(&mut mesh, &face_indices, config.texture_resolution);
    let child_indexes = build_child_indexes(&gathered);
    let texture = transfer_texture(&mesh, &face_indices, &gathered, &child_indexes, config);

    // Step 6: geometric and texture error.
    let geometric_error = estimate_geometric_error(&mesh, &gathered, config.error_sample_count, &mut rng);
    let texture_error = estimate_texture_error(&mesh, config.texture_resolution, config.texel_group_size_px);

    Ok(ParentTileResult { mesh, texture, geometric_error, texture_error })
}

fn sample_children(children: &[&ChildTile], target_face_count: usize, samples_per_face: f64, rng: &mut DeterministicRng) -> Vec<PointSample> {
    let target_count = ((target_face_count as f64) * samples_per_face).round().max(1.0) as usize;

    let areas: Vec<f64> = children.iter().map(|c| mesh_area(&c.mesh)).collect();
    let total: f64 = areas.iter().sum();
    if total <= 0.0 {
        return Vec::new();
    }

    let mut out = Vec::new();
    for (child, area) in children.iter().zip(areas.iter()) {
        let share = ((target_count as f64) * area / total).round() as usize;
        if share == 0 {
            continue;
        }
        let faces: Vec<usize> = (0..child.mesh.face_count()).collect();
        let samples: Vec<SurfaceSample> = sample_area_weighted(&child.mesh, &faces, share, rng);
        // A shorter normal encodes lower confidence (spec §6); this
        // child's own texture error stands in for the per-point
        // observation distance the data model does not retain.
        let confidence_scale = 1.0 / (1.0 + child.texture_error);
        out.extend(samples.into_iter().map(|s| PointSample {
            position: s.position,
            normal: Some(s.normal * confidence_scale),
        }));
    }
    out
}

fn mesh_area(mesh: &Mesh) -> f64 {
    mesh.faces_as_triangles().map(|(_, tri)| crate::geometry::primitives::triangle3::Triangle3::area(&tri.p1(), &tri.p2(), &tri.p3())).sum()
}

fn clip_to_bounds(mesh: &mut Mesh, bounds: &Box3) {
    let kept: Vec<[u32; 3]> = mesh
        .faces
        .iter()
        .filter(|face| {
            let tri = mesh.face_positions(face);
            let centroid = Vec3::from((tri.p1().coords + tri.p2().coords + tri.p3().coords) / 3.0);
            bounds.contains_point(&centroid)
        })
        .cloned()
        .collect();
    mesh.faces = kept;
    mesh.remove_unused_vertices();
}

/// Union-find over faces sharing an edge, dropping components whose
/// bounding-box diagonal is small relative to the whole mesh (spec §4.D
/// step 3: "remove small connected components").
fn remove_small_components(mesh: &mut Mesh, min_diameter_fraction: f64) {
    let n = mesh.face_count();
    if n == 0 {
        return;
    }

    let mut parent: Vec<usize> = (0..n).collect();
    fn find(parent: &mut [usize], mut x: usize) -> usize {
        while parent[x] != x {
            parent[x] = parent[parent[x]];
            x = parent[x];
        }
        x
    }
    fn union(parent: &mut [usize], a: usize, b: usize) {
        let (ra, rb) = (find(parent, a), find(parent, b));
        if ra != rb {
            parent[ra] = rb;
        }
    }

    use std::collections::HashMap;
    let mut edge_owner: HashMap<(u32, u32), usize> = HashMap::new();
    for (face_idx, face) in mesh.faces.iter().enumerate() {
        for i in 0..3 {
            let a = face[i];
            let b = face[(i + 1) % 3];
            let key = if a < b { (a, b) } else { (b, a) };
            if let Some(&other) = edge_owner.get(&key) {
                union(&mut parent, face_idx, other);
            } else {
                edge_owner.insert(key, face_idx);
            }
        }
    }

    let overall_bounds = mesh.bounds();
    let overall_diag = (*overall_bounds.get_max() - *overall_bounds.get_min()).norm();

    let mut component_bounds: HashMap<usize, Box3> = HashMap::new();
    for (face_idx, face) in mesh.faces.iter().enumerate() {
        let root = find(&mut parent, face_idx);
        let tri = mesh.face_positions(face);
        let entry = component_bounds.entry(root).or_insert_with(|| Box3::new(tri.p1(), tri.p1()));
        entry.extend_point(&tri.p1());
        entry.extend_point(&tri.p2());
        entry.extend_point(&tri.p3());
    }

    let keep: std::collections::HashSet<usize> = component_bounds
        .into_iter()
        .filter(|(_, bbox)| (*bbox.get_max() - *bbox.get_min()).norm() >= min_diameter_fraction * overall_diag)
        .map(|(root, _)| root)
        .collect();

    let kept_faces: Vec<[u32; 3]> = mesh
        .faces
        .iter()
        .enumerate()
        .filter(|(face_idx, _)| keep.contains(&find(&mut parent, *face_idx)))
        .map(|(_, face)| *face)
        .collect();

    mesh.faces = kept_faces;
    mesh.remove_unused_vertices();
}

fn snap_corners(mesh: &mut Mesh, bounds: &Box3, tolerance: f64) -> Vec<Vec3> {
    let mut pinned = Vec::new();
    for i in 0..8u8 {
        let corner = bounds.vertex(i);
        let nearest = mesh
            .positions
            .iter()
            .enumerate()
            .map(|(idx, p)| (idx, (p - corner).norm()))
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap());

        if let Some((idx, dist)) = nearest {
            if dist <= tolerance {
                mesh.positions[idx] = corner;
                pinned.push(corner);
            }
        }
    }
    pinned
}

struct ChildIndex {
    spatial_index: AABBTree<IndexedTriangle>,
}

fn build_child_indexes(children: &[&ChildTile]) -> Vec<ChildIndex> {
    children
        .iter()
        .map(|c| {
            let triangles: Vec<(usize, crate::geometry::primitives::triangle3::Triangle3)> =
                c.mesh.faces_as_triangles().map(|(i, tri)| (i, tri)).collect();
            ChildIndex { spatial_index: AABBTree::from_triangles(triangles).top_down::<MedianCut>() }
        })
        .collect()
}

fn transfer_texture(
    mesh: &Mesh,
    face_indices: &[usize],
    children: &[&ChildTile],
    child_indexes: &[ChildIndex],
    config: &ParentBuildConfig,
) -> RgbImage {
    let resolution = config.texture_resolution;
    let chart = Chart::build(face_indices, resolution);

    let rows: Vec<Vec<Option<[u8; 3]>>> = (0..resolution)
        .into_par_iter()
        .map(|row| {
            let mut out = Vec::with_capacity(resolution as usize);
            for col in 0..resolution {
                let Some((face, u, v)) = chart.locate(row, col) else {
                    out.push(None);
                    continue;
                };
                let tri = mesh.face_positions(&mesh.faces[face]);
                let bary = nalgebra::Vector3::new(1.0 - u - v, u, v);
                let point = tri.point_at(&bary);
                out.push(sample_nearest_color(&point, children, child_indexes, config));
            }
            out
        })
        .collect();

    let mut rgb = RgbImage::new(resolution, resolution);
    for (row, cells) in rows.into_iter().enumerate() {
        for (col, color) in cells.into_iter().enumerate() {
            if let Some(c) = color {
                rgb.put_pixel(col as u32, row as u32, Rgb(c));
            }
        }
    }
    rgb
}

fn sample_nearest_color(
    point: &Vec3,
    children: &[&ChildTile],
    child_indexes: &[ChildIndex],
    config: &ParentBuildConfig,
) -> Option<[u8; 3]> {
    let mut candidates: Vec<(usize, usize, Vec3, f64)> = Vec::new();
    for (ci, index) in child_indexes.iter().enumerate() {
        if let Some((face, closest)) = index.spatial_index.closest_point_with_face(point) {
            let distance = (closest - point).norm();
            candidates.push((ci, face, closest, distance));
        }
    }
    if candidates.is_empty() {
        return None;
    }

    let min_distance = candidates.iter().map(|(_, _, _, d)| *d).fold(f64::INFINITY, f64::min);
    let tied: Vec<&(usize, usize, Vec3, f64)> =
        candidates.iter().filter(|(_, _, _, d)| *d <= min_distance * (1.0 + config.tie_break_fraction)).collect();

    let (ci, face, closest, _) = **tied
        .iter()
        .min_by(|a, b| children[a.0].texture_error.partial_cmp(&children[b.0].texture_error).unwrap())
        .unwrap();

    let child = children[ci];
    let uvs = child.mesh.uvs.as_ref()?;
    let face_indices = child.mesh.faces[face];
    let tri = child.mesh.face_positions(&face_indices);
    let bary = tri.barycentric(&closest);

    let uv0 = uvs[face_indices[0] as usize];
    let uv1 = uvs[face_indices[1] as usize];
    let uv2 = uvs[face_indices[2] as usize];
    let u = bary.x as f32 * uv0[0] + bary.y as f32 * uv1[0] + bary.z as f32 * uv2[0];
    let v = bary.x as f32 * uv0[1] + bary.y as f32 * uv1[1] + bary.z as f32 * uv2[1];

    let (w, h) = child.texture.dimensions();
    Some(sample_bilinear(&child.texture, (u as f64) * (w as f64 - 1.0), (v as f64) * (h as f64 - 1.0)))
}

/// Directed-both-ways nearest-point approximation of the Hausdorff
/// distance between the parent mesh and the union of its children (spec
/// §4.D step 6).
fn estimate_geometric_error(mesh: &Mesh, children: &[&ChildTile], sample_count: usize, rng: &mut DeterministicRng) -> f64 {
    let parent_faces: Vec<usize> = (0..mesh.face_count()).collect();
    let parent_index = {
        let triangles: Vec<_> = mesh.faces_as_triangles().map(|(i, tri)| (i, tri)).collect();
        AABBTree::from_triangles(triangles).top_down::<MedianCut>()
    };

    let child_indexes = build_child_indexes(children);

    let parent_samples = sample_area_weighted(mesh, &parent_faces, sample_count, rng);
    let parent_to_children = parent_samples
        .iter()
        .map(|s| {
            child_indexes
                .iter()
                .filter_map(|ci| ci.spatial_index.closest_point_with_face(&s.position).map(|(_, p)| (p - s.position).norm()))
                .fold(0.0_f64, f64::min)
        })
        .fold(0.0_f64, f64::max);

    let mut children_to_parent = 0.0_f64;
    for child in children {
        let faces: Vec<usize> = (0..child.mesh.face_count()).collect();
        let per_child_count = (sample_count / children.len().max(1)).max(1);
        let samples = sample_area_weighted(&child.mesh, &faces, per_child_count, rng);
        for s in samples {
            if let Some((_, closest)) = parent_index.closest_point_with_face(&s.position) {
                children_to_parent = children_to_parent.max((closest - s.position).norm());
            }
        }
    }

    parent_to_children.max(children_to_parent)
}

/// Expected world-space length subtended by a group of `texel_group_px`
/// texels, approximated from the mesh's total surface area spread evenly
/// over the chart's `resolution x resolution` texel grid.
fn estimate_texture_error(mesh: &Mesh, resolution: u32, texel_group_px: u32) -> f64 {
    let area = mesh_area(mesh);
    let texel_count = (resolution as f64) * (resolution as f64);
    if texel_count <= 0.0 {
        return 0.0;
    }
    let meters_per_texel = (area / texel_count).sqrt();
    meters_per_texel * texel_group_px as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::reconstruct::NullReconstructor;

    fn quad_mesh(offset: Vec3) -> Mesh {
        let mut mesh = Mesh::new(
            vec![
                Vec3::new(-1.0, -1.0, 0.0) + offset.coords,
                Vec3::new(1.0, -1.0, 0.0) + offset.coords,
                Vec3::new(1.0, 1.0, 0.0) + offset.coords,
                Vec3::new(-1.0, 1.0, 0.0) + offset.coords,
            ],
            vec![[0, 1, 2], [0, 2, 3]],
        );
        mesh.recompute_normals();
        mesh
    }

    fn solid_texture(color: [u8; 3]) -> RgbImage {
        let mut img = RgbImage::new(8, 8);
        for p in img.pixels_mut() {
            *p = Rgb(color);
        }
        img
    }

    fn textured_child(offset: Vec3, color: [u8; 3]) -> ChildTile {
        let mut mesh = quad_mesh(offset);
        let faces: Vec<usize> = (0..mesh.face_count()).collect();
        bake_chart_uvs(&mut mesh, &faces, 8);
        ChildTile { mesh, texture: solid_texture(color), texture_error: 0.01 }
    }

    #[test]
    fn builds_a_parent_tile_from_two_children() {
        let children = vec![textured_child(Vec3::new(0.0, 0.0, 0.0), [200, 0, 0])];
        let bounds = Box3::new(Vec3::new(-1.5, -1.5, -0.5), Vec3::new(1.5, 1.5, 0.5));
        let config = ParentBuildConfig { target_face_count: 2, ..Default::default() };
        let dir = tempfile::tempdir().unwrap();

        let result = build_parent_tile(&bounds, &children, &NullReconstructor, &config, dir.path()).unwrap();

        assert!(result.mesh.face_count() > 0);
        assert!(result.geometric_error >= 0.0);
        assert!(result.texture_error >= 0.0);
    }

    #[test]
    fn rejects_a_parent_with_no_overlapping_children() {
        let children = vec![textured_child(Vec3::new(100.0, 100.0, 100.0), [0, 0, 0])];
        let bounds = Box3::new(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(1.0, 1.0, 1.0));
        let config = ParentBuildConfig::default();
        let dir = tempfile::tempdir().unwrap();

        assert!(build_parent_tile(&bounds, &children, &NullReconstructor, &config, dir.path()).is_err());
    }
}

//! Parallel backproject texturing (component C): bakes a tile's texture by,
//! for every output texel, choosing the best unoccluded observation that
//! sees the corresponding surface point and sampling it.

pub mod camera;
pub mod cache;

use std::path::PathBuf;
use std::sync::Arc;

use image::{Rgb, RgbImage};
use rayon::prelude::*;

use crate::{
    error::{Error, Result},
    geometry::primitives::{ray3::Ray3, triangle3::Triangle3},
    helpers::aliases::{Normal3, Vec3},
    mesh::Mesh,
    spatial_partitioning::aabb_tree::{AABBTree, IndexedTriangle, MedianCut},
};

pub use camera::{viewing_angle, CameraModel, PinholeCamera};
pub use cache::ObservationCache;

/// A single source image plus the camera model that captured it (spec §3:
/// "image, camera model, integer index assigned at ingestion").
pub struct Observation {
    /// Nonzero; 0 is reserved by [`IndexImage`] to mean "unassigned".
    pub index: u32,
    pub camera: Arc<dyn CameraModel>,
    pub image_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct TextureConfig {
    pub resolution: u32,
    /// A candidate is rejected if its resolution at the texel falls below
    /// this fraction of the best candidate's resolution.
    pub min_resolution_fraction: f64,
    /// Maximum allowed angle, radians, between the surface normal and the
    /// ray back to the camera.
    pub grazing_angle_threshold: f64,
    /// Slack added to the occlusion distance check to absorb self-shadowing
    /// from floating point error and mesh-vs-photographed-surface drift.
    pub occlusion_epsilon: f64,
    /// Texels within this many columns of an already-chosen texel on the
    /// same row reuse its observation if within `hysteresis_tolerance` of
    /// the best score, damping per-texel flicker between near-tied sources.
    pub hysteresis_radius_px: u32,
    pub hysteresis_tolerance: f64,
}

impl Default for TextureConfig {
    fn default() -> Self {
        Self {
            resolution: 512,
            min_resolution_fraction: 0.5,
            grazing_angle_threshold: std::f64::consts::FRAC_PI_2 * 0.9,
            occlusion_epsilon: 1e-3,
            hysteresis_radius_px: 4,
            hysteresis_tolerance: 0.1,
        }
    }
}

/// Which observation (if any) produced each output texel, in the layout
/// written as a 3-band 16-bit index image (spec §3/§6): band 0 is the
/// nonzero observation index (0 = unassigned), bands 1-2 are the source
/// pixel row/column, for traceability and re-texturing without reprojecting.
#[derive(Debug, Clone)]
pub struct IndexImage {
    pub width: u32,
    pub height: u32,
    pub observation: Vec<u16>,
    pub row: Vec<u16>,
    pub col: Vec<u16>,
}

impl IndexImage {
    fn new(width: u32, height: u32) -> Self {
        let n = (width * height) as usize;
        Self {
            width,
            height,
            observation: vec![0; n],
            row: vec![0; n],
            col: vec![0; n],
        }
    }
}

pub(crate) struct Chart {
    /// `triangle_of[cell] = face index in `mesh.faces`, one triangle per grid
    /// cell, packed row-major (spec §7's documented fallback: "one chart per
    /// triangle on a packed rectangle" when no UV atlas is supplied).
    grid_dim: u32,
    cell_size: u32,
    triangle_of: Vec<usize>,
}

impl Chart {
    pub(crate) fn build(face_indices: &[usize], resolution: u32) -> Self {
        let grid_dim = (face_indices.len() as f64).sqrt().ceil().max(1.0) as u32;
        let cell_size = (resolution / grid_dim).max(1);
        Chart {
            grid_dim,
            cell_size,
            triangle_of: face_indices.to_vec(),
        }
    }

    /// Maps a texel to `(face index, local u, v)` with `u + v <= 1`, or
    /// `None` if the texel falls outside every chart (padding, or the
    /// triangle-half of its cell on the far side of the diagonal).
    pub(crate) fn locate(&self, row: u32, col: u32) -> Option<(usize, f64, f64)> {
        let cell_row = row / self.cell_size;
        let cell_col = col / self.cell_size;
        let cell = (cell_row * self.grid_dim + cell_col) as usize;
        let face = *self.triangle_of.get(cell)?;

        let u = (col % self.cell_size) as f64 / self.cell_size as f64;
        let v = (row % self.cell_size) as f64 / self.cell_size as f64;
        if u + v > 1.0 {
            return None;
        }
        Some((face, u, v))
    }

    /// Chart-space UV, in `[0, 1]`, for vertex `corner` (0, 1 or 2) of the
    /// triangle occupying `cell_index` (its position in the `face_indices`
    /// slice `build` was called with).
    pub(crate) fn vertex_uv(&self, cell_index: usize, corner: usize, resolution: u32) -> [f32; 2] {
        let cell_row = (cell_index as u32) / self.grid_dim;
        let cell_col = (cell_index as u32) % self.grid_dim;
        // (u, v) of each triangle corner within its cell, matching the
        // barycentric order `(1 - u - v, u, v)` used by `locate`/`texture_row`.
        let (u, v) = [(0.0_f32, 0.0_f32), (1.0, 0.0), (0.0, 1.0)][corner];
        let origin_x = cell_col as f32 * self.cell_size as f32;
        let origin_y = cell_row as f32 * self.cell_size as f32;
        [
            (origin_x + u * self.cell_size as f32) / resolution as f32,
            (origin_y + v * self.cell_size as f32) / resolution as f32,
        ]
    }
}

/// Assigns `mesh.uvs` so each face in `face_indices` maps onto the same
/// packed-rectangle chart `texture_leaf` used to bake its texture,
/// allowing the mesh to be re-sampled against its own `rgb_image` later
/// (the parent tile builder's texture-transfer step does exactly this).
/// Faces outside `face_indices`, and vertices shared with them, keep
/// whatever UV they had (or none).
pub fn bake_chart_uvs(mesh: &mut Mesh, face_indices: &[usize], resolution: u32) {
    let chart = Chart::build(face_indices, resolution);
    let mut uvs = mesh.uvs.take().unwrap_or_else(|| vec![[0.0, 0.0]; mesh.positions.len()]);
    if uvs.len() < mesh.positions.len() {
        uvs.resize(mesh.positions.len(), [0.0, 0.0]);
    }

    for (cell_index, &face) in face_indices.iter().enumerate() {
        for (corner, &vertex) in mesh.faces[face].iter().enumerate() {
            uvs[vertex as usize] = chart.vertex_uv(cell_index, corner, resolution);
        }
    }

    mesh.uvs = Some(uvs);
}

/// Bakes the color and provenance textures for one tile's faces.
///
/// `spatial_index` must be built over the same tile's triangles (used for
/// the occlusion raycast); a coarser or mismatched index would accept
/// backprojections that are actually self-occluded.
pub fn texture_leaf(
    mesh: &Mesh,
    face_indices: &[usize],
    observations: &[Observation],
    cache: &ObservationCache,
    spatial_index: &AABBTree<IndexedTriangle>,
    config: &TextureConfig,
) -> Result<(RgbImage, IndexImage)> {
    if face_indices.is_empty() {
        return Err(Error::InvariantViolation("cannot texture a tile with no faces".into()));
    }

    let chart = Chart::build(face_indices, config.resolution);
    let resolution = config.resolution;

    // Decode every candidate image once, up front, outside the row-parallel
    // loop; repeated misses inside the loop would serialize on the cache's
    // lock under contention from every row's thread.
    let images: Vec<Option<Arc<RgbImage>>> = observations
        .iter()
        .map(|obs| cache.get_or_load(obs.index, &obs.image_path).ok())
        .collect();

    let mut rgb = RgbImage::new(resolution, resolution);
    let mut index = IndexImage::new(resolution, resolution);

    let row_results: Vec<Vec<(Option<[u8; 3]>, u16, u16, u16)>> = (0..resolution)
        .into_par_iter()
        .map(|row| texture_row(mesh, &chart, row, resolution, observations, &images, spatial_index, config))
        .collect();

    for (row, cells) in row_results.into_iter().enumerate() {
        for (col, (color, obs_idx, src_row, src_col)) in cells.into_iter().enumerate() {
            if let Some(c) = color {
                rgb.put_pixel(col as u32, row as u32, Rgb(c));
            }
            let offset = row * resolution as usize + col;
            index.observation[offset] = obs_idx;
            index.row[offset] = src_row;
            index.col[offset] = src_col;
        }
    }

    Ok((rgb, index))
}

struct Candidate {
    observation_index: usize,
    score: f64,
    src_row: f64,
    src_col: f64,
}

fn texture_row(
    mesh: &Mesh,
    chart: &Chart,
    row: u32,
    resolution: u32,
    observations: &[Observation],
    images: &[Option<Arc<RgbImage>>],
    spatial_index: &AABBTree<IndexedTriangle>,
    config: &TextureConfig,
) -> Vec<(Option<[u8; 3]>, u16, u16, u16)> {
    let mut out = Vec::with_capacity(resolution as usize);
    // `(col written, chosen observation index, score)` of recent texels in
    // this row, consulted for hysteresis. Rows are processed independently
    // so only same-row, already-written texels are available to consult.
    let mut history: Vec<(u32, usize, f64)> = Vec::new();

    for col in 0..resolution {
        let Some((face, u, v)) = chart.locate(row, col) else {
            out.push((None, 0, 0, 0));
            continue;
        };

        let tri = mesh.face_positions(&mesh.faces[face]);
        let bary = nalgebra::Vector3::new(1.0 - u - v, u, v);
        let point = tri.point_at(&bary);
        let Some(normal) = Triangle3::normal(&tri.p1(), &tri.p2(), &tri.p3()) else {
            out.push((None, 0, 0, 0));
            continue;
        };

        let best = choose_observation(&point, &normal, observations, spatial_index, config);

        let chosen = best.and_then(|best| {
            apply_hysteresis(&history, col, &best, config).or(Some(best))
        });

        match chosen {
            Some(c) => {
                history.push((col, c.observation_index, c.score));
                let obs = &observations[c.observation_index];
                let color = images[c.observation_index]
                    .as_ref()
                    .map(|img| sample_bilinear(img, c.src_col, c.src_row));
                out.push((
                    color,
                    (obs.index) as u16,
                    c.src_row.round().max(0.0) as u16,
                    c.src_col.round().max(0.0) as u16,
                ));
            }
            None => out.push((None, 0, 0, 0)),
        }
    }

    out
}

fn choose_observation(
    point: &Vec3,
    normal: &Normal3,
    observations: &[Observation],
    spatial_index: &AABBTree<IndexedTriangle>,
    config: &TextureConfig,
) -> Option<Candidate> {
    let mut best_resolution = 0.0_f64;
    let mut visible: Vec<(usize, f64, (f64, f64))> = Vec::new();

    for (i, obs) in observations.iter().enumerate() {
        if !obs.camera.contains(point) {
            continue;
        }

        let angle = viewing_angle(normal, point, &obs.camera.center());
        if angle > config.grazing_angle_threshold {
            continue;
        }

        if !is_visible(point, &obs.camera.center(), spatial_index, config.occlusion_epsilon) {
            continue;
        }

        let resolution = obs.camera.pixels_per_meter(point);
        let Some((row, col)) = obs.camera.project(point) else { continue };

        best_resolution = best_resolution.max(resolution);
        visible.push((i, resolution, (row, col)));
    }

    visible
        .into_iter()
        .filter(|(_, r, _)| best_resolution <= 0.0 || *r >= config.min_resolution_fraction * best_resolution)
        .max_by(|(_, r1, _), (_, r2, _)| r1.partial_cmp(r2).unwrap())
        .map(|(i, r, (row, col))| Candidate { observation_index: i, score: r, src_row: row, src_col: col })
}

fn is_visible(point: &Vec3, camera_center: &Vec3, spatial_index: &AABBTree<IndexedTriangle>, epsilon: f64) -> bool {
    let to_camera = *camera_center - *point;
    let distance = to_camera.norm();
    if distance < 1e-9 {
        return true;
    }

    let ray = Ray3::new(*point, to_camera / distance);
    match spatial_index.cast_ray(&ray) {
        Some((_, t)) => t + epsilon >= distance,
        None => true,
    }
}

fn apply_hysteresis(history: &[(u32, usize, f64)], col: u32, best: &Candidate, config: &TextureConfig) -> Option<Candidate> {
    if config.hysteresis_radius_px == 0 {
        return None;
    }

    let recent = history
        .iter()
        .rev()
        .take_while(|(prev_col, _, _)| col.saturating_sub(*prev_col) <= config.hysteresis_radius_px)
        .find(|(_, obs, _)| *obs != best.observation_index)?;

    if recent.2 >= best.score * (1.0 - config.hysteresis_tolerance) {
        Some(Candidate {
            observation_index: recent.1,
            score: recent.2,
            src_row: best.src_row,
            src_col: best.src_col,
        })
    } else {
        None
    }
}

pub(crate) fn sample_bilinear(image: &RgbImage, x: f64, y: f64) -> [u8; 3] {
    let (w, h) = image.dimensions();
    let x = x.clamp(0.0, w as f64 - 1.0);
    let y = y.clamp(0.0, h as f64 - 1.0);

    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let mut out = [0.0_f64; 3];
    for c in 0..3 {
        let p00 = image.get_pixel(x0, y0)[c] as f64;
        let p10 = image.get_pixel(x1, y0)[c] as f64;
        let p01 = image.get_pixel(x0, y1)[c] as f64;
        let p11 = image.get_pixel(x1, y1)[c] as f64;
        let top = p00 * (1.0 - fx) + p10 * fx;
        let bottom = p01 * (1.0 - fx) + p11 * fx;
        out[c] = top * (1.0 - fy) + bottom * fy;
    }

    [out[0].round() as u8, out[1].round() as u8, out[2].round() as u8]
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Rotation3;

    fn quad_mesh() -> Mesh {
        Mesh::new(
            vec![
                Vec3::new(-1.0, -1.0, 0.0),
                Vec3::new(1.0, -1.0, 0.0),
                Vec3::new(1.0, 1.0, 0.0),
                Vec3::new(-1.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2], [0, 2, 3]],
        )
    }

    fn overhead_observation(index: u32, image_path: PathBuf) -> Observation {
        Observation {
            index,
            camera: Arc::new(PinholeCamera {
                focal_length_px: 400.0,
                principal_point: (64.0, 64.0),
                width: 128,
                height: 128,
                position: Vec3::new(0.0, 0.0, 5.0),
                orientation: Rotation3::identity(),
            }),
            image_path,
        }
    }

    fn solid_png(dir: &std::path::Path, name: &str, color: [u8; 3]) -> PathBuf {
        let mut img = RgbImage::new(128, 128);
        for p in img.pixels_mut() {
            *p = Rgb(color);
        }
        let path = dir.join(name);
        img.save(&path).unwrap();
        path
    }

    fn spatial_index_for(mesh: &Mesh, face_indices: &[usize]) -> AABBTree<IndexedTriangle> {
        let triangles = face_indices.iter().map(|&f| (f, mesh.face_positions(&mesh.faces[f]))).collect();
        AABBTree::from_triangles(triangles).top_down::<MedianCut>()
    }

    #[test]
    fn every_texel_in_chart_gets_a_nonzero_provenance() {
        let mesh = quad_mesh();
        let faces: Vec<usize> = (0..mesh.face_count()).collect();
        let dir = tempfile::tempdir().unwrap();
        let path = solid_png(dir.path(), "a.png", [200, 100, 50]);
        let observations = vec![overhead_observation(1, path)];
        let spatial_index = spatial_index_for(&mesh, &faces);
        let cache = ObservationCache::new(4);
        let config = TextureConfig { resolution: 16, ..Default::default() };

        let (_, index) = texture_leaf(&mesh, &faces, &observations, &cache, &spatial_index, &config).unwrap();
        let assigned = index.observation.iter().filter(|&&v| v != 0).count();
        assert!(assigned > 0);
        assert!(index.observation.iter().all(|&v| v == 0 || v == 1));
    }

    #[test]
    fn closer_observation_wins_over_farther_one() {
        let mesh = quad_mesh();
        let faces: Vec<usize> = (0..mesh.face_count()).collect();
        let dir = tempfile::tempdir().unwrap();
        let near_path = solid_png(dir.path(), "near.png", [0, 0, 0]);
        let far_path = solid_png(dir.path(), "far.png", [0, 0, 0]);

        let mut far = overhead_observation(2, far_path);
        far.camera = Arc::new(PinholeCamera {
            focal_length_px: 400.0,
            principal_point: (64.0, 64.0),
            width: 128,
            height: 128,
            position: Vec3::new(0.0, 0.0, 50.0),
            orientation: Rotation3::identity(),
        });
        let near = overhead_observation(1, near_path);

        let observations = vec![far, near];
        let spatial_index = spatial_index_for(&mesh, &faces);
        let cache = ObservationCache::new(4);
        let config = TextureConfig { resolution: 8, hysteresis_radius_px: 0, ..Default::default() };

        let (_, index) = texture_leaf(&mesh, &faces, &observations, &cache, &spatial_index, &config).unwrap();
        let near_wins = index.observation.iter().filter(|&&v| v == 1).count();
        let far_wins = index.observation.iter().filter(|&&v| v == 2).count();
        assert!(near_wins >= far_wins);
    }

    #[test]
    fn baked_uvs_cover_every_vertex_of_the_charted_faces() {
        let mesh_template = quad_mesh();
        let mut mesh = mesh_template.clone();
        let faces: Vec<usize> = (0..mesh.face_count()).collect();
        bake_chart_uvs(&mut mesh, &faces, 64);

        let uvs = mesh.uvs.expect("bake_chart_uvs must populate uvs");
        assert_eq!(uvs.len(), mesh.vertex_count());
        for uv in &uvs {
            assert!(uv[0] >= 0.0 && uv[0] <= 1.0);
            assert!(uv[1] >= 0.0 && uv[1] <= 1.0);
        }
    }
}

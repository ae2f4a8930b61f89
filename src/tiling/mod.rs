//! Hierarchical tiling engine (component B): partitions a mesh into an
//! axis-aligned bounding-box tree with leaves sized to satisfy mesh- and
//! texture-density budgets.

use crate::{
    geometry::primitives::box3::Box3,
    helpers::aliases::Vec3,
    mesh::Mesh,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TilingScheme {
    /// Recursive binary split restricted to the horizontal (X, Y) axes.
    Quadtree,
    /// Recursive binary split over all three axes.
    Octree,
    /// No subdivision: a single root tile that is also the only leaf.
    Flat,
}

#[derive(Debug, Clone)]
pub struct TileTreeConfig {
    pub scheme: TilingScheme,
    pub max_faces_per_tile: usize,
    /// Stop subdividing once a node's extent drops to or below this, meters.
    pub min_tile_extent: f64,
    /// Stop subdividing once the best available camera resolution at a
    /// node's centroid is no greater than this.
    pub max_texels_per_meter: f64,
    /// Central detail area; when set, the root is clipped to `2 *
    /// surface_extent` around the mesh center before recursion begins.
    pub surface_extent: Option<f64>,
}

impl Default for TileTreeConfig {
    fn default() -> Self {
        Self {
            scheme: TilingScheme::Quadtree,
            max_faces_per_tile: 4096,
            min_tile_extent: 0.0,
            max_texels_per_meter: 0.0,
            surface_extent: None,
        }
    }
}

/// A node in the tile tree: bounds, child indices (empty iff leaf) and the
/// per-tile error metrics accumulated once its content is built.
#[derive(Debug, Clone)]
pub struct Tile {
    pub bounds: Box3,
    pub children: Vec<usize>,
    /// Triangle indices (into the source mesh) assigned to this tile. Only
    /// populated for leaves; cross-boundary triangles are duplicated to
    /// every leaf whose bounds their centroid falls within.
    pub face_indices: Vec<usize>,
    pub mesh_ref: Option<String>,
    pub texture_ref: Option<String>,
    pub index_ref: Option<String>,
    pub geometric_error: f64,
    pub texture_error: f64,
}

impl Tile {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// `max(geometric, texture)`, not yet folded in children's error.
    pub fn own_error(&self) -> f64 {
        self.geometric_error.max(self.texture_error)
    }
}

/// Frozen once built (spec §3 lifecycle: "Tiles are ... mutated only by
/// their own build task, then frozen when their files are written").
#[derive(Debug, Clone)]
pub struct TileTree {
    pub tiles: Vec<Tile>,
    pub root: usize,
}

impl TileTree {
    pub fn leaves(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.tiles.len()).filter(move |&i| self.tiles[i].is_leaf())
    }

    /// `tile.error = own_error + max over children of child.error` (spec
    /// §3). Children must already have their own errors set.
    pub fn aggregate_error(&self, idx: usize) -> f64 {
        let tile = &self.tiles[idx];
        let child_max = tile
            .children
            .iter()
            .map(|&c| self.aggregate_error(c))
            .fold(0.0_f64, f64::max);
        tile.own_error() + child_max
    }
}

/// Builds the tile tree. `resolution_at(point)` must return the maximum
/// pixels-per-meter available from any observation that sees `point`
/// unoccluded; the tiling engine is deliberately decoupled from the
/// observation/camera model so it can be unit-tested without one.
pub fn build_tile_tree(mesh: &Mesh, resolution_at: impl Fn(&Vec3) -> f64, config: &TileTreeConfig) -> TileTree {
    let mut root_bounds = mesh.bounds();

    if let Some(extent) = config.surface_extent {
        let center = root_bounds.get_center();
        let half = Vec3::new(extent, extent, extent);
        let clip = Box3::new(center - half.coords, center + half.coords);
        root_bounds = intersect(&root_bounds, &clip);
    }

    let all_faces: Vec<usize> = (0..mesh.face_count()).collect();

    let mut tree = TileTree { tiles: Vec::new(), root: 0 };
    tree.root = build_node(mesh, root_bounds, all_faces, config, &resolution_at, &mut tree.tiles);
    tree
}

fn intersect(a: &Box3, b: &Box3) -> Box3 {
    Box3::new(
        Vec3::new(a.get_min().x.max(b.get_min().x), a.get_min().y.max(b.get_min().y), a.get_min().z.max(b.get_min().z)),
        Vec3::new(a.get_max().x.min(b.get_max().x), a.get_max().y.min(b.get_max().y), a.get_max().z.min(b.get_max().z)),
    )
}

fn build_node(
    mesh: &Mesh,
    bounds: Box3,
    face_indices: Vec<usize>,
    config: &TileTreeConfig,
    resolution_at: &impl Fn(&Vec3) -> f64,
    tiles: &mut Vec<Tile>,
) -> usize {
    let should_stop = config.scheme == TilingScheme::Flat
        || face_indices.len() <= config.max_faces_per_tile
        || bounds.size_max() <= config.min_tile_extent
        || resolution_at(&bounds.get_center()) <= config.max_texels_per_meter;

    if should_stop || face_indices.is_empty() {
        return push_leaf(bounds, face_indices, tiles);
    }

    let axis = match config.scheme {
        TilingScheme::Quadtree => bounds.longest_horizontal_axis(),
        TilingScheme::Octree => bounds.longest_axis(),
        TilingScheme::Flat => unreachable!("flat scheme never reaches a split"),
    };
    let axis_idx = axis as usize;

    let mid = (bounds.get_min()[axis_idx] + bounds.get_max()[axis_idx]) * 0.5;

    let mut left_bounds = bounds;
    let mut right_bounds = bounds;
    left_bounds = set_max_axis(left_bounds, axis_idx, mid);
    right_bounds = set_min_axis(right_bounds, axis_idx, mid);

    let mut left_faces = Vec::new();
    let mut right_faces = Vec::new();
    for &f in &face_indices {
        let tri = mesh.face_positions(&mesh.faces[f]);
        let centroid = Vec3::from((tri.p1().coords + tri.p2().coords + tri.p3().coords) / 3.0);
        if centroid[axis_idx] <= mid {
            left_faces.push(f);
        }
        // Cross-boundary triangles (those whose centroid falls on one side
        // but whose bbox still overlaps the other) are duplicated to both.
        if centroid[axis_idx] >= mid || face_overlaps(mesh, f, &right_bounds) {
            right_faces.push(f);
        }
    }

    // A split that fails to shrink either side (degenerate geometry) is
    // treated as a leaf rather than looping forever.
    if left_faces.len() == face_indices.len() || right_faces.len() == face_indices.len() {
        return push_leaf(bounds, face_indices, tiles);
    }

    let left = build_node(mesh, left_bounds, left_faces, config, resolution_at, tiles);
    let right = build_node(mesh, right_bounds, right_faces, config, resolution_at, tiles);

    tiles.push(Tile {
        bounds,
        children: vec![left, right],
        face_indices: Vec::new(),
        mesh_ref: None,
        texture_ref: None,
        index_ref: None,
        geometric_error: 0.0,
        texture_error: 0.0,
    });
    tiles.len() - 1
}

fn face_overlaps(mesh: &Mesh, f: usize, bounds: &Box3) -> bool {
    mesh.face_positions(&mesh.faces[f]).intersects_box3(bounds)
}

fn push_leaf(bounds: Box3, face_indices: Vec<usize>, tiles: &mut Vec<Tile>) -> usize {
    tiles.push(Tile {
        bounds,
        children: Vec::new(),
        face_indices,
        mesh_ref: None,
        texture_ref: None,
        index_ref: None,
        geometric_error: 0.0,
        texture_error: 0.0,
    });
    tiles.len() - 1
}

fn set_max_axis(mut b: Box3, axis: usize, value: f64) -> Box3 {
    let mut max = *b.get_max();
    max[axis] = value;
    b = Box3::new(*b.get_min(), max);
    b
}

fn set_min_axis(mut b: Box3, axis: usize, value: f64) -> Box3 {
    let mut min = *b.get_min();
    min[axis] = value;
    b = Box3::new(min, *b.get_max());
    b
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_triangle_mesh() -> Mesh {
        Mesh::new(
            vec![Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0)],
            vec![[0, 1, 2]],
        )
    }

    fn grid_mesh(n: usize) -> Mesh {
        let mut positions = Vec::new();
        for y in 0..=n {
            for x in 0..=n {
                positions.push(Vec3::new(x as f64, y as f64, 0.0));
            }
        }
        let mut faces = Vec::new();
        let stride = n + 1;
        for y in 0..n {
            for x in 0..n {
                let i0 = (y * stride + x) as u32;
                let i1 = i0 + 1;
                let i2 = i0 + stride as u32;
                let i3 = i2 + 1;
                faces.push([i0, i2, i1]);
                faces.push([i1, i2, i3]);
            }
        }
        Mesh::new(positions, faces)
    }

    #[test]
    fn single_triangle_yields_one_leaf() {
        let mesh = single_triangle_mesh();
        let config = TileTreeConfig { max_faces_per_tile: 1, ..Default::default() };
        let tree = build_tile_tree(&mesh, |_| f64::INFINITY, &config);
        assert_eq!(tree.leaves().count(), 1);
    }

    #[test]
    fn flat_scheme_never_splits() {
        let mesh = grid_mesh(20);
        let config = TileTreeConfig { scheme: TilingScheme::Flat, max_faces_per_tile: 1, ..Default::default() };
        let tree = build_tile_tree(&mesh, |_| 0.0, &config);
        assert_eq!(tree.tiles.len(), 1);
    }

    #[test]
    fn quadtree_splits_down_to_face_budget() {
        let mesh = grid_mesh(8);
        let config = TileTreeConfig { max_faces_per_tile: 16, ..Default::default() };
        let tree = build_tile_tree(&mesh, |_| f64::INFINITY, &config);

        for leaf in tree.leaves() {
            assert!(tree.tiles[leaf].face_indices.len() <= 16 || tree.tiles[leaf].bounds.size_max() <= config.min_tile_extent);
        }
    }

    #[test]
    fn child_bounds_are_contained_in_parent_bounds() {
        let mesh = grid_mesh(8);
        let config = TileTreeConfig { max_faces_per_tile: 4, ..Default::default() };
        let tree = build_tile_tree(&mesh, |_| f64::INFINITY, &config);

        for tile in &tree.tiles {
            for &child in &tile.children {
                let c = &tree.tiles[child];
                assert!(c.bounds.get_min().x >= tile.bounds.get_min().x - 1e-9);
                assert!(c.bounds.get_max().x <= tile.bounds.get_max().x + 1e-9);
            }
        }
    }
}

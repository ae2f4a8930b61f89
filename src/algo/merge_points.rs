use crate::{data_structures::vertex_index_map::PointIndexMap, helpers::aliases::Vec3};

pub struct IndexedVertices {
    /// Unique points
    pub points: Vec<Vec3>,
    /// Vertex indices, one per input point, referring into `points`
    pub indices: Vec<usize>,
}

/// Merges exactly coincident points, used to deduplicate a raw point cloud
/// (e.g. the vertices of a triangle soup loaded for decimation) before a mesh
/// is built from it.
pub fn merge_points(points: impl Iterator<Item = Vec3>) -> IndexedVertices {
    let num_points = points.size_hint().1.unwrap_or(0);
    let num_unique_vertices = num_points / 3; // just a guess at dedup ratio
    let mut vertex_index_map = PointIndexMap::with_capacity(num_unique_vertices);

    let mut indices = Vec::with_capacity(num_points);
    let mut merged_vertices = Vec::with_capacity(num_unique_vertices);

    for vertex in points {
        if let Some(index) = vertex_index_map.get_index(vertex) {
            indices.push(*index);
        } else {
            let vert_idx = merged_vertices.len();
            merged_vertices.push(vertex);
            vertex_index_map.insert(vertex, vert_idx);
            indices.push(vert_idx);
        }
    }

    IndexedVertices {
        indices,
        points: merged_vertices,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coincident_points_collapse_to_one_index() {
        let pts = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 0.0),
        ];
        let merged = merge_points(pts.into_iter());
        assert_eq!(merged.points.len(), 2);
        assert_eq!(merged.indices[0], merged.indices[2]);
        assert_ne!(merged.indices[0], merged.indices[1]);
    }
}

use crate::{
    error::{Error, Result},
    geometry::primitives::triangle3::Triangle3,
    helpers::aliases::{Normal3, Vec3},
};

/// Per-vertex texture coordinate.
pub type Uv = [f32; 2];
/// Per-vertex RGBA color, components in `[0, 1]`.
pub type Color = [f32; 4];

/// An indexed triangle mesh: per-vertex position plus optional normal, UV and
/// color, and a face list of ordered vertex-index triples whose winding
/// defines the outward normal.
///
/// Invariant: every face index is in range. Duplicate vertex positions may
/// exist (decimation deduplicates them as a preprocessing step); faces never
/// reference a vertex removed by cleanup — `remove_unused_vertices` upholds
/// this after any vertex-dropping mutation.
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub positions: Vec<Vec3>,
    pub normals: Option<Vec<Normal3>>,
    pub uvs: Option<Vec<Uv>>,
    pub colors: Option<Vec<Color>>,
    pub faces: Vec<[u32; 3]>,
}

impl Mesh {
    pub fn new(positions: Vec<Vec3>, faces: Vec<[u32; 3]>) -> Self {
        Self {
            positions,
            normals: None,
            uvs: None,
            colors: None,
            faces,
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Checks the representation invariant: every face index is in range.
    pub fn validate(&self) -> Result<()> {
        if self.positions.is_empty() {
            return Err(Error::MalformedInput("mesh has zero vertices".into()));
        }

        for p in &self.positions {
            if !p.x.is_finite() || !p.y.is_finite() || !p.z.is_finite() {
                return Err(Error::MalformedInput("mesh contains a non-finite position".into()));
            }
        }

        let n = self.positions.len() as u32;
        for face in &self.faces {
            for &idx in face {
                if idx >= n {
                    return Err(Error::InvariantViolation(format!(
                        "face references out-of-range vertex {idx} (have {n})"
                    )));
                }
            }
        }

        Ok(())
    }

    #[inline]
    pub fn face_positions(&self, face: &[u32; 3]) -> Triangle3 {
        Triangle3::new(
            self.positions[face[0] as usize],
            self.positions[face[1] as usize],
            self.positions[face[2] as usize],
        )
    }

    pub fn face_normal(&self, face: &[u32; 3]) -> Option<Normal3> {
        let tri = self.face_positions(face);
        Triangle3::normal(&tri.p1(), &tri.p2(), &tri.p3())
    }

    pub fn faces_as_triangles(&self) -> impl Iterator<Item = (usize, Triangle3)> + '_ {
        self.faces.iter().enumerate().map(|(i, f)| (i, self.face_positions(f)))
    }

    /// Axis-aligned bounds of every vertex position.
    pub fn bounds(&self) -> crate::geometry::primitives::box3::Box3 {
        use crate::geometry::primitives::box3::Box3;

        let mut bbox = Box3::new(self.positions[0], self.positions[0]);
        for p in &self.positions[1..] {
            bbox.extend_point(p);
        }
        bbox
    }

    /// Drops vertices that no longer appear in any face, remapping face
    /// indices and all per-vertex attributes to match. Restores the "no
    /// dangling references" invariant after a mutation that removed faces.
    pub fn remove_unused_vertices(&mut self) {
        let mut used = vec![false; self.positions.len()];
        for face in &self.faces {
            for &idx in face {
                used[idx as usize] = true;
            }
        }

        let mut remap = vec![u32::MAX; self.positions.len()];
        let mut new_positions = Vec::new();
        let mut new_normals = self.normals.as_ref().map(|_| Vec::new());
        let mut new_uvs = self.uvs.as_ref().map(|_| Vec::new());
        let mut new_colors = self.colors.as_ref().map(|_| Vec::new());

        for (old_idx, &is_used) in used.iter().enumerate() {
            if !is_used {
                continue;
            }
            remap[old_idx] = new_positions.len() as u32;
            new_positions.push(self.positions[old_idx]);
            if let (Some(dst), Some(src)) = (new_normals.as_mut(), self.normals.as_ref()) {
                dst.push(src[old_idx]);
            }
            if let (Some(dst), Some(src)) = (new_uvs.as_mut(), self.uvs.as_ref()) {
                dst.push(src[old_idx]);
            }
            if let (Some(dst), Some(src)) = (new_colors.as_mut(), self.colors.as_ref()) {
                dst.push(src[old_idx]);
            }
        }

        for face in &mut self.faces {
            for idx in face.iter_mut() {
                *idx = remap[*idx as usize];
            }
        }

        self.positions = new_positions;
        self.normals = new_normals;
        self.uvs = new_uvs;
        self.colors = new_colors;
    }

    /// Recomputes per-vertex normals as the area-weighted average of adjacent
    /// face normals, as `decimate` does to regenerate normals it discarded.
    pub fn recompute_normals(&mut self) {
        let mut accum = vec![Normal3::zeros(); self.positions.len()];

        for face in &self.faces {
            let tri = self.face_positions(face);
            if let Some(n) = Triangle3::normal(&tri.p1(), &tri.p2(), &tri.p3()) {
                let area = Triangle3::area(&tri.p1(), &tri.p2(), &tri.p3());
                for &idx in face {
                    accum[idx as usize] += n * area;
                }
            }
        }

        for n in &mut accum {
            if n.norm_squared() > 0.0 {
                *n = n.normalize();
            }
        }

        self.normals = Some(accum);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_triangle() -> Mesh {
        Mesh::new(
            vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2]],
        )
    }

    #[test]
    fn validate_accepts_well_formed_mesh() {
        assert!(unit_triangle().validate().is_ok());
    }

    #[test]
    fn validate_rejects_out_of_range_face() {
        let mut mesh = unit_triangle();
        mesh.faces.push([0, 1, 9]);
        assert!(mesh.validate().is_err());
    }

    #[test]
    fn remove_unused_vertices_drops_orphans_and_remaps() {
        let mut mesh = Mesh::new(
            vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
                Vec3::new(5.0, 5.0, 5.0), // orphan
            ],
            vec![[0, 1, 2]],
        );
        mesh.remove_unused_vertices();
        assert_eq!(mesh.vertex_count(), 3);
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn recompute_normals_gives_unit_length_normals() {
        let mut mesh = unit_triangle();
        mesh.recompute_normals();
        let normals = mesh.normals.unwrap();
        assert_eq!(normals.len(), 3);
        for n in normals {
            assert!((n.norm() - 1.0).abs() < 1e-9);
        }
    }
}

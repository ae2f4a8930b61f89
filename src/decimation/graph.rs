use std::collections::HashMap;

use nalgebra::{Matrix3, Vector4};

use crate::{
    geometry::primitives::triangle3::Triangle3,
    helpers::aliases::{Mat4, Vec3},
    mesh::Mesh,
};

use super::options::DecimationOptions;

bitflags::bitflags! {
    #[derive(Default)]
    pub struct VertexFlags: u8 {
        const ACTIVE      = 0b0001;
        const TOUCHABLE   = 0b0010;
        const ON_PERIMETER = 0b0100;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexId(pub u32);

/// A vertex record in the collapsable graph's arena. See the Collapsable
/// Graph data model: holds the 4x4 quadric accumulator, adjacent-face count,
/// active/touchable/on-perimeter flags and its current adjacency.
#[derive(Debug, Clone)]
pub struct VertexNode {
    pub position: Vec3,
    pub q: Mat4,
    pub face_count: u32,
    pub flags: VertexFlags,
    /// Cumulative drift from this vertex's original position, carried
    /// forward through collapses to bound `accuracy_threshold`.
    pub drift: f64,
    /// Bumped whenever an edge incident to this vertex is rewritten, so
    /// stale heap entries referencing a superseded edge are detected.
    pub version: u32,
    pub neighbors: Vec<VertexId>,
}

impl VertexNode {
    #[inline]
    pub fn is_active(&self) -> bool {
        self.flags.contains(VertexFlags::ACTIVE)
    }

    #[inline]
    pub fn is_touchable(&self) -> bool {
        self.flags.contains(VertexFlags::TOUCHABLE)
    }

    #[inline]
    pub fn is_on_perimeter(&self) -> bool {
        self.flags.contains(VertexFlags::ON_PERIMETER)
    }
}

/// A directed edge (src, dst): `left` is the third vertex of the face this
/// edge borders on one side; `perimeter` is true iff the reverse edge (dst,
/// src) does not exist (mesh boundary or hole).
#[derive(Debug, Clone, Copy)]
pub struct EdgeData {
    pub left: VertexId,
    pub perimeter: bool,
}

/// Mutable arena-of-handles graph used only for the lifetime of one
/// `decimate` call (spec §3, Design Notes §9: arena over cyclic graph).
pub struct CollapsableGraph {
    pub vertices: Vec<VertexNode>,
    edges: HashMap<(u32, u32), EdgeData>,
}

impl CollapsableGraph {
    /// Builds the graph from a deduplicated mesh, computing per-vertex
    /// quadrics (step 2 of the decimation algorithm).
    pub fn from_mesh(mesh: &Mesh, options: &DecimationOptions) -> Self {
        let mut vertices: Vec<VertexNode> = mesh
            .positions
            .iter()
            .map(|&position| VertexNode {
                position,
                q: Mat4::zeros(),
                face_count: 0,
                flags: VertexFlags::ACTIVE | VertexFlags::TOUCHABLE,
                drift: 0.0,
                version: 0,
                neighbors: Vec::new(),
            })
            .collect();

        for &pos in &options.pinned_vertices {
            for v in &mut vertices {
                if (v.position - pos).norm() < 1e-9 {
                    v.flags.remove(VertexFlags::TOUCHABLE);
                }
            }
        }

        let mut edges: HashMap<(u32, u32), EdgeData> = HashMap::with_capacity(mesh.faces.len() * 3);

        for face in &mesh.faces {
            let rotations = [(face[0], face[1], face[2]), (face[1], face[2], face[0]), (face[2], face[0], face[1])];
            for (s, d, left) in rotations {
                edges.insert((s, d), EdgeData { left: VertexId(left), perimeter: false });
            }
            for v in face {
                vertices[*v as usize].face_count += 1;
            }
        }

        // An edge is a perimeter edge iff its reverse does not exist.
        let keys: Vec<(u32, u32)> = edges.keys().copied().collect();
        for (s, d) in keys {
            let is_perimeter = !edges.contains_key(&(d, s));
            if is_perimeter {
                edges.get_mut(&(s, d)).unwrap().perimeter = true;
                vertices[s as usize].flags.insert(VertexFlags::ON_PERIMETER);
                vertices[d as usize].flags.insert(VertexFlags::ON_PERIMETER);
            }
        }

        for &(s, d) in edges.keys() {
            if !vertices[s as usize].neighbors.contains(&VertexId(d)) {
                vertices[s as usize].neighbors.push(VertexId(d));
            }
            if !vertices[d as usize].neighbors.contains(&VertexId(s)) {
                vertices[d as usize].neighbors.push(VertexId(s));
            }
        }

        let mut graph = Self { vertices, edges };
        graph.accumulate_quadrics(mesh, options);
        graph
    }

    fn accumulate_quadrics(&mut self, mesh: &Mesh, options: &DecimationOptions) {
        for face in &mesh.faces {
            let tri = mesh.face_positions(face);
            let (a, b, c) = (tri.p1(), tri.p2(), tri.p3());
            let normal = match Triangle3::normal(&a, &b, &c) {
                Some(n) => n,
                None => continue, // degenerate triangle contributes no quadric
            };
            let d = -normal.dot(&a.coords);
            let p = Vector4::new(normal.x, normal.y, normal.z, d);
            let mut kp = p * p.transpose();

            if options.weight_by_area {
                kp *= Triangle3::area(&a, &b, &c);
            }

            for &idx in face {
                self.vertices[idx as usize].q += kp;
            }
        }

        for v in &mut self.vertices {
            if v.flags.contains(VertexFlags::ON_PERIMETER) {
                v.q *= options.perimeter_penalty;
            }
        }
    }

    #[inline]
    pub fn get(&self, id: VertexId) -> &VertexNode {
        &self.vertices[id.0 as usize]
    }

    #[inline]
    pub fn get_mut(&mut self, id: VertexId) -> &mut VertexNode {
        &mut self.vertices[id.0 as usize]
    }

    #[inline]
    pub fn edge(&self, s: VertexId, d: VertexId) -> Option<&EdgeData> {
        self.edges.get(&(s.0, d.0))
    }

    pub fn common_neighbors(&self, a: VertexId, b: VertexId) -> usize {
        let a_neighbors = &self.get(a).neighbors;
        let b_neighbors = &self.get(b).neighbors;
        a_neighbors.iter().filter(|n| b_neighbors.contains(n)).count()
    }

    /// Every undirected edge present in the graph, yielded once as `(min, max)`.
    pub fn undirected_edges(&self) -> impl Iterator<Item = (VertexId, VertexId)> + '_ {
        self.edges.keys().filter(|&&(s, d)| s < d).map(|&(s, d)| (VertexId(s), VertexId(d)))
    }

    /// Appends a new vertex to the arena, returning its handle.
    pub fn push_vertex(&mut self, node: VertexNode) -> VertexId {
        self.vertices.push(node);
        VertexId((self.vertices.len() - 1) as u32)
    }

    /// Number of directed edges currently present between `a` and `b` (0, 1 or
    /// 2 for a manifold mesh) — used to decrement the running face count
    /// exactly once per distinct face adjacent to a collapsed edge.
    pub fn faces_adjacent_to_edge(&self, a: VertexId, b: VertexId) -> usize {
        self.edges.contains_key(&(a.0, b.0)) as usize + self.edges.contains_key(&(b.0, a.0)) as usize
    }

    pub fn remove_edge(&mut self, a: VertexId, b: VertexId) {
        self.edges.remove(&(a.0, b.0));
        self.get_mut(a).neighbors.retain(|&n| n != b);
    }

    /// Rewrites every edge touching `old` (as src, dst or left) to instead
    /// touch `new_id`, dropping edges directly between `old` and `other_old`
    /// (the collapsed pair), deduplicating any resulting parallel edges.
    pub fn rewrite_vertex(&mut self, old: VertexId, other_old: VertexId, new_id: VertexId) {
        let incident: Vec<(u32, u32, EdgeData)> = self
            .edges
            .iter()
            .filter(|(&(s, d), _)| s == old.0 || d == old.0)
            .map(|(&(s, d), &data)| (s, d, data))
            .collect();

        for (s, d, data) in incident {
            self.edges.remove(&(s, d));

            if s == old.0 && (d == old.0 || d == other_old.0) {
                continue; // edge between the collapsed pair itself
            }
            if d == old.0 && (s == old.0 || s == other_old.0) {
                continue;
            }

            let new_s = if s == old.0 { new_id.0 } else { s };
            let new_d = if d == old.0 { new_id.0 } else { d };
            let new_left = if data.left == old { new_id } else { data.left };

            self.edges.entry((new_s, new_d)).or_insert(EdgeData { left: new_left, perimeter: data.perimeter });
        }

        // An edge whose own endpoints survive but whose `left` referred to
        // `old` (the shared edge between two faces each touching only one
        // of the collapsed pair) is never touched by the scan above, since
        // it's neither incident to `old` nor removed. Patch those in place
        // (spec §4.A step 5: "propagate the perimeter-edge flag along
        // surviving adjacencies whose left-face or destination referred to
        // src or dst").
        let stale_left: Vec<(u32, u32)> = self
            .edges
            .iter()
            .filter(|(&(s, d), data)| s != old.0 && d != old.0 && data.left == old)
            .map(|(&(s, d), _)| (s, d))
            .collect();
        for key in stale_left {
            self.edges.get_mut(&key).unwrap().left = new_id;
        }

        // Rebuild neighbor lists for every vertex touched, from the edge map,
        // since rewiring can add, remove or redirect several at once.
        for v in self.vertices.iter_mut() {
            v.neighbors.retain(|n| *n != old);
        }
    }

    /// Recomputes `neighbors` for `id` from the current edge set. Called
    /// after rewiring settles so adjacency reflects reality again.
    pub fn refresh_neighbors(&mut self, id: VertexId) {
        let mut neighbors: Vec<VertexId> = Vec::new();
        for &(s, d) in self.edges.keys() {
            if s == id.0 && !neighbors.contains(&VertexId(d)) {
                neighbors.push(VertexId(d));
            } else if d == id.0 && !neighbors.contains(&VertexId(s)) {
                neighbors.push(VertexId(s));
            }
        }

        for &n in &neighbors {
            let back = &mut self.get_mut(n).neighbors;
            if !back.contains(&id) {
                back.push(id);
            }
        }

        self.get_mut(id).neighbors = neighbors;
    }

    /// Rebuilds a mesh from the surviving active vertices and edges: one
    /// triangle per edge whose (src, dst, left) ids form a strictly
    /// increasing triple, which by construction yields exactly one
    /// representative per face (step 6 of the decimation algorithm).
    pub fn into_mesh(self) -> Mesh {
        let mut old_to_new = vec![u32::MAX; self.vertices.len()];
        let mut positions = Vec::new();

        for (i, v) in self.vertices.iter().enumerate() {
            if v.is_active() {
                old_to_new[i] = positions.len() as u32;
                positions.push(v.position);
            }
        }

        let mut faces = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for (&(s, d), data) in self.edges.iter() {
            let left = data.left.0;
            if s < d && d < left {
                let key = (s, d, left);
                if seen.insert(key) {
                    faces.push([old_to_new[s as usize], old_to_new[d as usize], old_to_new[left as usize]]);
                }
            }
        }

        Mesh::new(positions, faces)
    }

    pub fn active_vertex_count(&self) -> usize {
        self.vertices.iter().filter(|v| v.is_active()).count()
    }

    /// Solves for the quadric-optimal contraction point; falls back to the
    /// argmin of {src, dst, midpoint} when the system is ill-conditioned
    /// (step 3 of the decimation algorithm).
    pub fn optimal_point(q: &Mat4, src: Vec3, dst: Vec3) -> Vec3 {
        let a = q.fixed_view::<3, 3>(0, 0).into_owned();
        let b = -q.fixed_view::<3, 1>(0, 3).into_owned();

        if let Some(solution) = solve_well_conditioned(&a, &b) {
            return Vec3::new(solution.x, solution.y, solution.z);
        }

        let mid = Vec3::from((src.coords + dst.coords) * 0.5);
        [src, dst, mid]
            .into_iter()
            .min_by(|p1, p2| quadric_cost(q, p1).partial_cmp(&quadric_cost(q, p2)).unwrap())
            .unwrap()
    }
}

fn solve_well_conditioned(a: &Matrix3<f64>, b: &nalgebra::Vector3<f64>) -> Option<nalgebra::Vector3<f64>> {
    if a.determinant().abs() <= 1e-8 {
        return None;
    }

    a.lu().solve(b)
}

/// Evaluates `p^T Q p` on the homogeneous point `p`.
pub fn quadric_cost(q: &Mat4, p: &Vec3) -> f64 {
    let v = Vector4::new(p.x, p.y, p.z, 1.0);
    (v.transpose() * q * v)[(0, 0)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimation::options::DecimationOptions;

    fn unit_square_mesh() -> Mesh {
        Mesh::new(
            vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(1.0, 1.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2], [0, 2, 3]],
        )
    }

    #[test]
    fn shared_edge_is_not_perimeter() {
        let mesh = unit_square_mesh();
        let graph = CollapsableGraph::from_mesh(&mesh, &DecimationOptions::default());
        let shared = graph.edge(VertexId(0), VertexId(2)).unwrap();
        assert!(!shared.perimeter);
        assert!(graph.edge(VertexId(2), VertexId(0)).unwrap().perimeter == false);
    }

    #[test]
    fn outer_edges_are_perimeter() {
        let mesh = unit_square_mesh();
        let graph = CollapsableGraph::from_mesh(&mesh, &DecimationOptions::default());
        assert!(graph.edge(VertexId(0), VertexId(1)).unwrap().perimeter);
    }

    #[test]
    fn rebuilt_mesh_has_same_face_count_without_collapse() {
        let mesh = unit_square_mesh();
        let graph = CollapsableGraph::from_mesh(&mesh, &DecimationOptions::default());
        let rebuilt = graph.into_mesh();
        assert_eq!(rebuilt.face_count(), 2);
    }
}

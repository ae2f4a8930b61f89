use std::cmp::Ordering;
use std::collections::BinaryHeap;

use log::{debug, trace};

use crate::{
    algo::merge_points::merge_points,
    error::Result,
    geometry::primitives::triangle3::Triangle3,
    helpers::aliases::{Normal3, Vec3},
    mesh::Mesh,
};

use super::{
    graph::{quadric_cost, CollapsableGraph, VertexFlags, VertexId},
    options::DecimationOptions,
};

/// Reduces `mesh` to approximately `target_face_count` faces using
/// Garland-Heckbert quadric error metrics (spec §4.A). Returns a new mesh
/// whose face count is at most `target_face_count`, unless a cost-threshold
/// or topology guard stops decimation early. Vertex normals are regenerated;
/// UVs and colors are discarded.
pub fn decimate(mesh: &Mesh, target_face_count: usize, options: &DecimationOptions) -> Result<Mesh> {
    mesh.validate()?;

    let deduped = dedup_vertices(mesh);
    let mut graph = CollapsableGraph::from_mesh(&deduped, options);
    let mut face_count = deduped.face_count();

    let mut heap: BinaryHeap<Contraction> = BinaryHeap::new();
    for (src, dst) in graph.undirected_edges().collect::<Vec<_>>() {
        if let Some(c) = compute_contraction(&graph, src, dst, options) {
            heap.push(c);
        }
    }

    while face_count > target_face_count {
        let Some(top) = heap.pop() else {
            debug!("decimation queue exhausted at {face_count} faces (target {target_face_count})");
            break;
        };

        if !is_fresh(&graph, &top) {
            continue;
        }

        let (src, dst) = (top.src, top.dst);
        let src_node = graph.get(src);
        let dst_node = graph.get(dst);

        let drift = (src_node.drift + (src_node.position - top.v_new).norm())
            .max(dst_node.drift + (dst_node.position - top.v_new).norm());

        if let Some(threshold) = options.accuracy_threshold {
            if threshold > 0.0 && drift > threshold {
                debug!("decimation stopped: drift {drift:.6} exceeds accuracy_threshold {threshold:.6}");
                break;
            }
        }

        let removed_faces = graph.faces_adjacent_to_edge(src, dst);
        face_count = face_count.saturating_sub(removed_faces);

        let new_flags = {
            let mut flags = VertexFlags::ACTIVE;
            if src_node.is_touchable() && dst_node.is_touchable() {
                flags.insert(VertexFlags::TOUCHABLE);
            }
            if src_node.is_on_perimeter() || dst_node.is_on_perimeter() {
                flags.insert(VertexFlags::ON_PERIMETER);
            }
            flags
        };

        let new_vertex = super::graph::VertexNode {
            position: top.v_new,
            q: src_node.q + dst_node.q,
            face_count: src_node.face_count + dst_node.face_count,
            flags: new_flags,
            drift,
            version: 0,
            neighbors: Vec::new(),
        };

        let new_id = graph.push_vertex(new_vertex);

        graph.remove_edge(src, dst);
        graph.remove_edge(dst, src);
        graph.rewrite_vertex(src, dst, new_id);
        graph.rewrite_vertex(dst, src, new_id);
        graph.get_mut(src).flags.remove(VertexFlags::ACTIVE);
        graph.get_mut(dst).flags.remove(VertexFlags::ACTIVE);

        graph.refresh_neighbors(new_id);
        let neighbors = graph.get(new_id).neighbors.clone();
        for &n in &neighbors {
            graph.get_mut(n).version += 1;
        }
        graph.get_mut(new_id).version += 1;

        for n in neighbors {
            if let Some(c) = compute_contraction(&graph, new_id, n, options) {
                heap.push(c);
            }
        }
    }

    let mut rebuilt = graph.into_mesh();
    rebuilt.recompute_normals();
    rebuilt.validate()?;
    Ok(rebuilt)
}

fn dedup_vertices(mesh: &Mesh) -> Mesh {
    let merged = merge_points(mesh.positions.iter().copied());
    let faces = mesh
        .faces
        .iter()
        .map(|f| [merged.indices[f[0] as usize] as u32, merged.indices[f[1] as usize] as u32, merged.indices[f[2] as usize] as u32])
        .collect();

    let mut out = Mesh::new(merged.points, faces);
    out.remove_unused_vertices();
    out
}

fn is_fresh(graph: &CollapsableGraph, c: &Contraction) -> bool {
    let src = graph.get(c.src);
    let dst = graph.get(c.dst);
    src.is_active() && dst.is_active() && src.version == c.src_version && dst.version == c.dst_version
}

/// Computes the candidate contraction for undirected edge (a, b), applying
/// the gates in step 4 of the decimation algorithm. Returns `None` if the
/// edge should never be offered for collapse under the current options.
fn compute_contraction(graph: &CollapsableGraph, a: VertexId, b: VertexId, options: &DecimationOptions) -> Option<Contraction> {
    let edge_perimeter = graph.edge(a, b).map(|e| e.perimeter).unwrap_or(false)
        || graph.edge(b, a).map(|e| e.perimeter).unwrap_or(false);

    let va = graph.get(a);
    let vb = graph.get(b);

    if va.is_on_perimeter() && vb.is_on_perimeter() && !edge_perimeter {
        return None; // never collapse two perimeter vertices along an interior edge
    }

    if !va.is_touchable() && !vb.is_touchable() {
        return None; // at least one endpoint must be movable
    }

    if options.preserve_topology {
        let common = graph.common_neighbors(a, b);
        let expected = if edge_perimeter { 1 } else { 2 };
        if common != expected {
            trace!("preserve_topology rejected ({a:?},{b:?}): {common} common neighbors, expected {expected}");
            return None;
        }
    }

    let q_sum = va.q + vb.q;
    let mut v_new = CollapsableGraph::optimal_point(&q_sum, va.position, vb.position);

    if va.is_on_perimeter() != vb.is_on_perimeter() {
        v_new = if va.is_on_perimeter() { va.position } else { vb.position };
    } else if va.is_touchable() != vb.is_touchable() {
        v_new = if va.is_touchable() { vb.position } else { va.position };
    }

    if options.avoid_flips && !flip_safe(graph, a, b, v_new, options.flip_threshold) {
        return None;
    }

    if options.avoid_small_triangles && !angle_safe(graph, a, b, v_new, options.angle_threshold) {
        return None;
    }

    let cost = quadric_cost(&q_sum, &v_new);

    Some(Contraction {
        cost,
        src: a,
        dst: b,
        src_version: va.version,
        dst_version: vb.version,
        v_new,
    })
}

/// Triangles incident to `v` as `(v, dst, left)`, skipping any that also
/// touch `other` (those are the faces the collapse itself removes).
fn incident_triangles(graph: &CollapsableGraph, v: VertexId, other: VertexId) -> Vec<(VertexId, VertexId, VertexId)> {
    graph
        .get(v)
        .neighbors
        .iter()
        .filter_map(|&n| {
            if n == other {
                return None;
            }
            let data = graph.edge(v, n)?;
            if data.left == other {
                return None;
            }
            Some((v, n, data.left))
        })
        .collect()
}

fn position_of(graph: &CollapsableGraph, id: VertexId, a: VertexId, b: VertexId, v_new: Vec3) -> Vec3 {
    if id == a || id == b {
        v_new
    } else {
        graph.get(id).position
    }
}

fn flip_safe(graph: &CollapsableGraph, a: VertexId, b: VertexId, v_new: Vec3, flip_threshold: f64) -> bool {
    let mut sum_before = Normal3::zeros();
    let mut sum_after = Normal3::zeros();

    for (v, n, left) in incident_triangles(graph, a, b).into_iter().chain(incident_triangles(graph, b, a)) {
        let p0 = graph.get(v).position;
        let p1 = graph.get(n).position;
        let p2 = graph.get(left).position;
        sum_before += (p1 - p0).cross(&(p2 - p0));

        let q0 = position_of(graph, v, a, b, v_new);
        let q1 = position_of(graph, n, a, b, v_new);
        let q2 = position_of(graph, left, a, b, v_new);
        sum_after += (q1 - q0).cross(&(q2 - q0));
    }

    let before_mag2 = sum_before.norm_squared();
    if before_mag2 < 1e-18 {
        return true; // no stable reference normal to flip
    }

    let diff2 = (sum_after - sum_before).norm_squared();
    (diff2 / before_mag2) <= flip_threshold
}

fn angle_safe(graph: &CollapsableGraph, a: VertexId, b: VertexId, v_new: Vec3, angle_threshold: f64) -> bool {
    for (v, n, left) in incident_triangles(graph, a, b).into_iter().chain(incident_triangles(graph, b, a)) {
        let p0 = graph.get(v).position;
        let p1 = graph.get(n).position;
        let p2 = graph.get(left).position;
        let before = Triangle3::smallest_angle(&p0, &p1, &p2);

        let q0 = position_of(graph, v, a, b, v_new);
        let q1 = position_of(graph, n, a, b, v_new);
        let q2 = position_of(graph, left, a, b, v_new);
        let after = Triangle3::smallest_angle(&q0, &q1, &q2);

        if after < angle_threshold * before {
            return false;
        }
    }

    true
}

struct Contraction {
    cost: f64,
    src: VertexId,
    dst: VertexId,
    src_version: u32,
    dst_version: u32,
    v_new: Vec3,
}

impl PartialEq for Contraction {
    fn eq(&self, other: &Self) -> bool {
        self.cost == other.cost
    }
}

impl Eq for Contraction {}

impl PartialOrd for Contraction {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Contraction {
    // Reversed so `BinaryHeap` (a max-heap) pops the lowest-cost edge first.
    fn cmp(&self, other: &Self) -> Ordering {
        other.cost.partial_cmp(&self.cost).unwrap_or(Ordering::Equal)
    }
}

use crate::{
    geometry::{
        primitives::{box3::Box3, plane3::Plane3, ray3::Ray3, triangle3::Triangle3},
        traits::{ClosestPoint3, HasBBox3},
    },
    helpers::aliases::Vec3,
};

#[derive(Debug, PartialEq, Clone, Copy)]
enum NodeType {
    Leaf,
    Branch,
}

#[derive(Debug, Clone, Copy)]
struct BinaryNode {
    node_type: NodeType,
    left: usize,  // for branch nodes: child node indices. for leaf nodes: range of objects
    right: usize,
    bbox: Box3,
}

impl BinaryNode {
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.node_type == NodeType::Leaf
    }
}

/// Bounding volume hierarchy of axis aligned bounding boxes, used as the
/// spatial index backing occlusion ray casts during backproject texturing and
/// nearest-point queries during parent tile texture transfer.
///
/// ## Example
/// ```ignore
/// let aabb = AABBTree::new(triangles)
///     .with_min_objects_per_leaf(10)
///     .with_max_depth(10)
///     .top_down::<MedianCut>();
/// ```
#[derive(Debug)]
pub struct AABBTree<TObject: HasBBox3> {
    nodes: Vec<BinaryNode>, // root is last element
    objects: Vec<(TObject, Box3)>,
    min_objects_per_leaf: usize,
    max_depth: usize,
}

impl<TObject: HasBBox3> AABBTree<TObject> {
    /// Creates a new AABB tree from objects. This does not finish construction;
    /// chain a build strategy such as [`AABBTree::top_down`].
    pub fn new(objects: Vec<TObject>) -> Self {
        Self {
            nodes: Vec::new(),
            min_objects_per_leaf: 10,
            max_depth: 40,
            objects: objects
                .into_iter()
                .map(|obj| {
                    let bbox = obj.bbox();
                    (obj, bbox)
                })
                .collect(),
        }
    }

    pub fn empty() -> Self {
        Self {
            nodes: Vec::new(),
            min_objects_per_leaf: 10,
            max_depth: 40,
            objects: Vec::new(),
        }
    }

    /// Sets minimal objects count per leaf node. Default is 10.
    pub fn with_min_objects_per_leaf(mut self, min_objects_per_leaf: usize) -> Self {
        self.min_objects_per_leaf = min_objects_per_leaf;
        self
    }

    /// Sets max depth of tree. Default is 40.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn depth(&self) -> usize {
        if self.nodes.is_empty() {
            return 0;
        }

        self.node_depth(self.nodes.len() - 1)
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn bbox(&self) -> Option<Box3> {
        self.nodes.last().map(|n| n.bbox)
    }

    /// Constructs the tree using a top-down build strategy. Fast, but does not
    /// always produce the tightest tree.
    ///
    /// `TPartition` chooses how a set of objects is split into two subsets at
    /// each branch (see [`MedianCut`], [`Area`]).
    pub fn top_down<TPartition: PartitionStrategy<TObject>>(mut self) -> Self {
        self.nodes.clear();

        if !self.objects.is_empty() {
            self.top_down_build_node(0, self.objects.len(), 1, &mut TPartition::default());
        }

        self
    }

    /// Visits every leaf node
    pub fn traverse<TFunc>(&self, visit: &mut TFunc)
    where
        TFunc: FnMut((&[(TObject, Box3)], &Box3)),
    {
        if self.nodes.is_empty() {
            return;
        }

        self.visit_node(self.nodes.len() - 1, visit);
    }

    fn visit_node<TFunc>(&self, node_index: usize, visit: &mut TFunc)
    where
        TFunc: FnMut((&[(TObject, Box3)], &Box3)),
    {
        let node = &self.nodes[node_index];

        match node.node_type {
            NodeType::Leaf => {
                let objects = &self.objects[node.left..node.right];
                visit((objects, &node.bbox));
            }
            NodeType::Branch => {
                self.visit_node(node.left, visit);
                self.visit_node(node.right, visit);
            }
        }
    }

    fn top_down_build_node<TPartition: PartitionStrategy<TObject>>(
        &mut self,
        first: usize,
        last: usize,
        depth: usize,
        partition_strategy: &mut TPartition,
    ) -> usize {
        if depth >= self.max_depth || last - first <= self.min_objects_per_leaf {
            return self.leaf_node_from_objects(first, last);
        }

        let subset = &mut self.objects[first..last];
        let split_at_result = Self::split(subset, partition_strategy).map(|split_at| split_at + first);

        match split_at_result {
            Some(split_at) => {
                let left = self.top_down_build_node(first, split_at, depth + 1, partition_strategy);
                let right = self.top_down_build_node(split_at, last, depth + 1, partition_strategy);

                let mut bbox = self.nodes[left].bbox;
                bbox.extend(&self.nodes[right].bbox);

                let node = BinaryNode {
                    bbox,
                    node_type: NodeType::Branch,
                    left,
                    right,
                };

                self.nodes.push(node);
                self.nodes.len() - 1
            }
            None => self.leaf_node_from_objects(first, last),
        }
    }

    fn split<TPartition: PartitionStrategy<TObject>>(
        objects: &mut [(TObject, Box3)],
        partition_strategy: &mut TPartition,
    ) -> Option<usize> {
        let bbox = objects.iter().skip(1).fold(objects[0].1, |mut acc, (_, bbox)| {
            acc.extend(bbox);
            acc
        });

        let mut split_axes = [
            (bbox.size_x(), SplitAxis::X),
            (bbox.size_y(), SplitAxis::Y),
            (bbox.size_z(), SplitAxis::Z),
        ];

        split_axes.sort_by(|(size1, _), (size2, _)| size2.partial_cmp(size1).unwrap());

        Self::sort_along_axis_and_try_split(objects, split_axes[0].1, partition_strategy, &bbox)
            .or_else(|| {
                Self::sort_along_axis_and_try_split(objects, split_axes[1].1, partition_strategy, &bbox)
            })
            .or_else(|| {
                Self::sort_along_axis_and_try_split(objects, split_axes[2].1, partition_strategy, &bbox)
            })
    }

    fn sort_along_axis_and_try_split<TPartition: PartitionStrategy<TObject>>(
        objects: &mut [(TObject, Box3)],
        axis: SplitAxis,
        partition_strategy: &mut TPartition,
        objects_bbox: &Box3,
    ) -> Option<usize> {
        let axis_idx = axis.as_usize();
        objects.sort_by(|(_, bbox1), (_, bbox2)| {
            bbox1.get_center()[axis_idx]
                .partial_cmp(&bbox2.get_center()[axis_idx])
                .unwrap()
        });

        partition_strategy.split(objects, axis, objects_bbox)
    }

    fn leaf_node_from_objects(&mut self, first: usize, last: usize) -> usize {
        let mut bbox = self.objects[first].1;
        for i in first + 1..last {
            bbox.extend(&self.objects[i].1);
        }

        let node = BinaryNode {
            bbox,
            node_type: NodeType::Leaf,
            left: first,
            right: last,
        };

        self.nodes.push(node);
        self.nodes.len() - 1
    }

    fn node_depth(&self, idx: usize) -> usize {
        let node = &self.nodes[idx];

        match node.node_type {
            NodeType::Leaf => 1,
            NodeType::Branch => 1 + self.node_depth(node.left).max(self.node_depth(node.right)),
        }
    }
}

impl AABBTree<Triangle3> {
    /// Builds a tree directly over a triangle soup, carrying each triangle's
    /// originating face index as payload for provenance lookups.
    pub fn from_triangles(triangles: Vec<(usize, Triangle3)>) -> AABBTree<IndexedTriangle> {
        AABBTree::new(
            triangles
                .into_iter()
                .map(|(face, triangle)| IndexedTriangle { face, triangle })
                .collect(),
        )
    }
}

/// A triangle tagged with the index of the mesh face it came from.
#[derive(Debug, Clone, Copy)]
pub struct IndexedTriangle {
    pub face: usize,
    pub triangle: Triangle3,
}

impl HasBBox3 for IndexedTriangle {
    #[inline]
    fn bbox(&self) -> Box3 {
        self.triangle.bbox()
    }
}

impl ClosestPoint3 for IndexedTriangle {
    #[inline]
    fn closest_point(&self, point: &Vec3) -> Vec3 {
        self.triangle.closest_point(point)
    }
}

impl AABBTree<IndexedTriangle> {
    /// First triangle hit along `ray`, used for occlusion tests during
    /// backproject texturing. Returns `(face index, distance along ray)`.
    pub fn cast_ray(&self, ray: &Ray3) -> Option<(usize, f64)> {
        if self.nodes.is_empty() {
            return None;
        }

        let mut best: Option<(usize, f64)> = None;
        self.cast_ray_node(self.nodes.len() - 1, ray, &mut best);
        best
    }

    fn cast_ray_node(&self, node_idx: usize, ray: &Ray3, best: &mut Option<(usize, f64)>) {
        let node = &self.nodes[node_idx];

        if !ray.intersects_box3(&node.bbox) {
            return;
        }

        if let Some((_, t)) = best {
            if !ray.intersects_box3_at(&node.bbox).map(|t0| t0 <= *t).unwrap_or(false) {
                return;
            }
        }

        match node.node_type {
            NodeType::Leaf => {
                for (obj, _) in &self.objects[node.left..node.right] {
                    if let Some((_, t)) = obj.triangle.intersects_ray3_at(ray) {
                        if best.map(|(_, best_t)| t < best_t).unwrap_or(true) {
                            *best = Some((obj.face, t));
                        }
                    }
                }
            }
            NodeType::Branch => {
                self.cast_ray_node(node.left, ray, best);
                self.cast_ray_node(node.right, ray, best);
            }
        }
    }
}

impl<TObject: HasBBox3 + ClosestPoint3> AABBTree<TObject> {
    /// Closest point on any object to `point`, bounded by `max_distance`.
    pub fn closest_point(&self, point: &Vec3, max_distance: f64) -> Option<Vec3> {
        let max_distance_square = max_distance * max_distance;

        let mut stack = Vec::with_capacity(self.max_depth);
        if let Some(last) = self.nodes.last() {
            stack.push(last);
        }

        let mut closest_point = Vec3::origin();
        let mut distance_squared = f64::INFINITY;

        while let Some(top) = stack.pop() {
            if top.is_leaf() {
                for (obj, _) in &self.objects[top.left..top.right] {
                    let new_closest = obj.closest_point(point);
                    let new_distance = (new_closest - point).norm_squared();

                    if new_distance < distance_squared {
                        distance_squared = new_distance;
                        closest_point = new_closest;
                    }
                }
            } else {
                let left = &self.nodes[top.left];
                let right = &self.nodes[top.right];

                if left.bbox.contains_point(point) || left.bbox.squared_distance(point) < max_distance_square {
                    stack.push(left);
                }

                if right.bbox.contains_point(point) || right.bbox.squared_distance(point) < max_distance_square {
                    stack.push(right);
                }
            }
        }

        if distance_squared.is_infinite() {
            return None;
        }

        Some(closest_point)
    }
}

impl AABBTree<IndexedTriangle> {
    /// Closest point on any triangle to `point`, along with the face index
    /// it came from and its barycentric coordinates there. Used by the
    /// parent tile builder to carry UVs/colors across from a finer mesh
    /// rather than just a bare position (spec §4.D step 5).
    pub fn closest_point_with_face(&self, point: &Vec3) -> Option<(usize, Vec3)> {
        let mut stack = Vec::with_capacity(self.max_depth);
        if let Some(last) = self.nodes.last() {
            stack.push(last);
        }

        let mut best: Option<(usize, Vec3, f64)> = None;

        while let Some(top) = stack.pop() {
            if top.is_leaf() {
                for (obj, _) in &self.objects[top.left..top.right] {
                    let candidate = obj.triangle.closest_point(point);
                    let distance = (candidate - point).norm_squared();
                    if best.map(|(_, _, d)| distance < d).unwrap_or(true) {
                        best = Some((obj.face, candidate, distance));
                    }
                }
            } else {
                let left = &self.nodes[top.left];
                let right = &self.nodes[top.right];
                let bound = best.map(|(_, _, d)| d).unwrap_or(f64::INFINITY);

                if left.bbox.contains_point(point) || left.bbox.squared_distance(point) < bound {
                    stack.push(left);
                }
                if right.bbox.contains_point(point) || right.bbox.squared_distance(point) < bound {
                    stack.push(right);
                }
            }
        }

        best.map(|(face, point, _)| (face, point))
    }
}

#[derive(Debug, Clone, Copy)]
pub enum SplitAxis {
    X,
    Y,
    Z,
}

impl SplitAxis {
    pub fn as_usize(&self) -> usize {
        match self {
            SplitAxis::X => 0,
            SplitAxis::Y => 1,
            SplitAxis::Z => 2,
        }
    }
}

/// Splits a set of objects into two parts during AABB tree construction. See [`AABBTree`].
pub trait PartitionStrategy<TObject: HasBBox3>: Default {
    /// Splits `objects` into two parts, returning the split index. May
    /// reorder elements within the slice but must not add or remove any.
    fn split(&mut self, objects: &[(TObject, Box3)], axis: SplitAxis, objects_bbox: &Box3) -> Option<usize>;
}

/// Median-cut partitioning: splits the set in two equal-size halves by
/// projection along the chosen axis, producing a balanced tree.
#[derive(Default)]
pub struct MedianCut;

impl<TObject: HasBBox3> PartitionStrategy<TObject> for MedianCut {
    fn split(&mut self, objects: &[(TObject, Box3)], axis: SplitAxis, objects_bbox: &Box3) -> Option<usize> {
        if objects.is_empty() {
            return None;
        }

        let split_at = objects.len() / 2;

        if !check_split(axis.as_usize(), objects_bbox, objects, split_at) {
            return None;
        }

        Some(split_at)
    }
}

/// Surface-area-heuristic partitioning: buckets objects by centroid position
/// and picks the split minimizing expected ray-intersection cost.
#[derive(Debug, Default)]
pub struct Area;

impl<TObject: HasBBox3> PartitionStrategy<TObject> for Area {
    fn split(&mut self, objects: &[(TObject, Box3)], axis: SplitAxis, objects_bbox: &Box3) -> Option<usize> {
        if objects.is_empty() {
            return None;
        }

        let centroid_bounds = objects.iter().fold(Box3::empty(), |mut acc, (_, bbox)| {
            acc.extend_point(&bbox.get_center());
            acc
        });

        let axis = axis.as_usize();
        const NUM_BUCKETS: usize = 12;
        let mut buckets = [Bucket { primitives_count: 0, bbox: Box3::empty() }; NUM_BUCKETS];

        for (_, bbox) in objects {
            let center = bbox.get_center();
            let bucket_idx = bucket_index(&centroid_bounds, &center, axis, NUM_BUCKETS);
            let bucket = &mut buckets[bucket_idx];
            bucket.primitives_count += 1;
            bucket.bbox.extend(bbox);
        }

        let mut costs = [0.0_f64; NUM_BUCKETS - 1];

        for i in 0..NUM_BUCKETS - 1 {
            let mut b0 = Box3::empty();
            let mut b1 = Box3::empty();
            let mut b0_count = 0usize;
            let mut b1_count = 0usize;

            for bucket in &buckets[..=i] {
                b0.extend(&bucket.bbox);
                b0_count += bucket.primitives_count;
            }

            for bucket in &buckets[i + 1..] {
                b1.extend(&bucket.bbox);
                b1_count += bucket.primitives_count;
            }

            costs[i] = 0.125 + (b0_count as f64 * b0.area() + b1_count as f64 * b1.area()) / objects_bbox.area();
        }

        let (min_cost_bucket_idx, _) = costs
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap())
            .unwrap();

        let leaf_cost = objects.len() as f64;

        if costs[min_cost_bucket_idx] < leaf_cost {
            objects.iter().position(|(_, bbox)| {
                let center = bbox.get_center();
                bucket_index(&centroid_bounds, &center, axis, NUM_BUCKETS) > min_cost_bucket_idx
            })
        } else {
            None
        }
    }
}

fn bucket_index(centroid_bounds: &Box3, center: &Vec3, axis: usize, num_buckets: usize) -> usize {
    let extent = centroid_bounds.get_max()[axis] - centroid_bounds.get_min()[axis];
    if extent <= 0.0 {
        return 0;
    }

    let offset = (center[axis] - centroid_bounds.get_min()[axis]) / extent;
    ((offset * num_buckets as f64) as usize).min(num_buckets - 1)
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    primitives_count: usize,
    bbox: Box3,
}

fn check_split<TObject: HasBBox3>(
    axis: usize,
    parent_bbox: &Box3,
    objects: &[(TObject, Box3)],
    split_at: usize,
) -> bool {
    let mut split_normal = Vec3::origin().coords;
    split_normal[axis] = 1.0;
    let split_point = Vec3::from(
        (objects[split_at].1.get_center().coords + objects[split_at - 1].1.get_center().coords) * 0.5,
    );
    let plane = Plane3::new(split_normal, split_point[axis]);

    let all_objects_intersect_plane = objects.iter().all(|(_, bbox)| bbox.intersects_plane3(&plane));

    if all_objects_intersect_plane {
        return false;
    }

    let first_child_box = objects.iter().take(split_at).skip(1).fold(objects[0].1, |mut acc, (_, bbox)| {
        acc.extend(bbox);
        acc
    });
    let first_child_volume = first_child_box.volume();

    let second_child_box = objects
        .iter()
        .skip(split_at + 1)
        .fold(objects[split_at].1, |mut acc, (_, bbox)| {
            acc.extend(bbox);
            acc
        });
    let second_child_volume = second_child_box.volume();

    let parent_volume = parent_bbox.volume();
    let threshold = 0.8;

    !(first_child_volume / parent_volume > threshold && second_child_volume / parent_volume > threshold)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tri(ax: f64, ay: f64) -> Triangle3 {
        Triangle3::new(
            Vec3::new(ax, ay, 0.0),
            Vec3::new(ax + 1.0, ay, 0.0),
            Vec3::new(ax, ay + 1.0, 0.0),
        )
    }

    #[test]
    fn top_down_build_indexes_every_object() {
        let triangles: Vec<(usize, Triangle3)> = (0..50).map(|i| (i, tri(i as f64 * 2.0, 0.0))).collect();
        let tree = AABBTree::from_triangles(triangles).top_down::<MedianCut>();

        let mut count = 0;
        tree.traverse(&mut |(objs, _)| count += objs.len());
        assert_eq!(count, 50);
    }

    #[test]
    fn cast_ray_finds_nearest_triangle() {
        let triangles: Vec<(usize, Triangle3)> = (0..5).map(|i| (i, tri(0.0, 0.0))).collect();
        let mut triangles = triangles;
        // stack five coincident-ish triangles at increasing depth
        for (i, (_, t)) in triangles.iter_mut().enumerate() {
            let z = i as f64;
            *t = Triangle3::new(
                Vec3::new(-1.0, -1.0, z),
                Vec3::new(2.0, -1.0, z),
                Vec3::new(-1.0, 2.0, z),
            );
        }
        let tree = AABBTree::from_triangles(triangles).top_down::<MedianCut>();
        let ray = Ray3::new(Vec3::new(0.0, 0.0, -10.0), crate::helpers::aliases::Normal3::new(0.0, 0.0, 1.0));

        let hit = tree.cast_ray(&ray);
        assert!(hit.is_some());
        let (_, t) = hit.unwrap();
        assert!((t - 10.0).abs() < 1e-6);
    }
}

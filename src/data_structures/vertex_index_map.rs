use std::collections::HashMap;
use std::hash::Hash;

use crate::{
    algo::float_hash::{combine_hash, hash_float},
    helpers::aliases::Vec3,
};

/// Wraps [Vec3] so it can be used as a `HashMap` key; coincident points hash equal.
struct HashablePoint(Vec3);

impl PartialEq for HashablePoint {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for HashablePoint {}

impl Hash for HashablePoint {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        let mut hash = hash_float(self.0.x);
        hash = combine_hash(hash, hash_float(self.0.y));
        hash = combine_hash(hash, hash_float(self.0.z));

        state.write_i32(hash);
    }
}

/// Maps 3d points to indices, used to deduplicate coincident vertices.
pub struct PointIndexMap {
    map: HashMap<HashablePoint, usize>,
}

impl PointIndexMap {
    pub fn new() -> Self {
        Self { map: HashMap::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            map: HashMap::with_capacity(capacity),
        }
    }

    /// Returns index of point
    #[inline]
    pub fn get_index(&self, point: Vec3) -> Option<&usize> {
        let hashable = HashablePoint(point);
        self.map.get(&hashable)
    }

    /// Inserts new point with specified index to map
    #[inline]
    pub fn insert(&mut self, point: Vec3, index: usize) {
        let hashable = HashablePoint(point);
        self.map.insert(hashable, index);
    }
}

impl Default for PointIndexMap {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

use super::box3::Box3;
use crate::{geometry::traits::HasBBox3, helpers::aliases::Vec3};

/// 3D sphere
#[derive(Debug, Clone, Copy)]
pub struct Sphere3 {
    center: Vec3,
    radius: f64,
}

impl Sphere3 {
    #[inline]
    pub fn new(center: Vec3, radius: f64) -> Self {
        Self { center, radius }
    }

    #[inline]
    pub fn intersects_box3(&self, bbox: &Box3) -> bool {
        bbox.squared_distance(&self.center) <= self.radius * self.radius
    }
}

impl HasBBox3 for Sphere3 {
    #[inline]
    fn bbox(&self) -> Box3 {
        Box3::new(
            self.center.add_scalar(-self.radius),
            self.center.add_scalar(self.radius),
        )
    }
}

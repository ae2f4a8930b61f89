use super::primitives::box3::Box3;
use nalgebra::Point3;

/// 3D bounding box
pub trait HasBBox3 {
    fn bbox(&self) -> Box3;
}

/// Closest point on a primitive to an arbitrary point in space
pub trait ClosestPoint3 {
    fn closest_point(&self, point: &Point3<f64>) -> Point3<f64>;
}

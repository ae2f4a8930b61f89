use crate::{
    geometry::traits::ClosestPoint3,
    helpers::aliases::{Normal3, Vec3},
};

use super::box3::Box3;

/// n . x - d = 0
#[derive(Debug, Clone, Copy)]
pub struct Plane3 {
    normal: Normal3,
    distance: f64,
}

impl Plane3 {
    #[inline]
    pub fn new(normal: Normal3, d: f64) -> Self {
        Self { normal, distance: d }
    }

    /// Given three noncollinear points (ordered ccw), compute the plane equation.
    pub fn from_points(a: &Vec3, b: &Vec3, c: &Vec3) -> Self {
        let normal = (b - a).cross(&(c - a)).normalize();
        let d = normal.dot(&a.coords);

        Self { normal, distance: d }
    }

    #[inline]
    pub fn get_normal(&self) -> &Normal3 {
        &self.normal
    }

    #[inline]
    pub fn get_distance(&self) -> f64 {
        self.distance
    }

    /// Signed distance from point to plane
    #[inline]
    pub fn distance(&self, point: &Vec3) -> f64 {
        self.normal.dot(&point.coords) - self.distance
    }

    pub fn intersects_box3(&self, aabb: &Box3) -> bool {
        let c = aabb.get_center();
        let e = aabb.get_max() - c;
        let r = e[0] * self.normal[0].abs() + e[1] * self.normal[1].abs() + e[2] * self.normal[2].abs();
        let s = self.normal.dot(&c.coords) - self.distance;
        s.abs() <= r
    }
}

impl ClosestPoint3 for Plane3 {
    #[inline]
    fn closest_point(&self, point: &Vec3) -> Vec3 {
        let t = self.distance(point);
        point - self.normal.scale(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_points_normal_points_toward_ccw_winding() {
        let plane = Plane3::from_points(
            &Vec3::new(0.0, 0.0, 0.0),
            &Vec3::new(1.0, 0.0, 0.0),
            &Vec3::new(0.0, 1.0, 0.0),
        );
        assert!((plane.get_normal() - Normal3::new(0.0, 0.0, 1.0)).norm() < 1e-9);
    }

    #[test]
    fn distance_is_zero_on_plane() {
        let plane = Plane3::from_points(
            &Vec3::new(0.0, 0.0, 0.0),
            &Vec3::new(1.0, 0.0, 0.0),
            &Vec3::new(0.0, 1.0, 0.0),
        );
        assert!(plane.distance(&Vec3::new(0.3, 0.3, 0.0)).abs() < 1e-9);
        assert!((plane.distance(&Vec3::new(0.0, 0.0, 2.0)) - 2.0).abs() < 1e-9);
    }
}

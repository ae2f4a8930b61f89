use crate::{geometry::traits::ClosestPoint3, helpers::aliases::{Normal3, Vec3}};

use super::{box3::Box3, plane3::Plane3};

/// 3D line segment
#[derive(Debug, Clone, Copy)]
pub struct LineSegment3 {
    start: Vec3,
    direction: Normal3,
    length: f64,
}

impl LineSegment3 {
    pub fn new(start: &Vec3, end: &Vec3) -> Self {
        let delta = end - start;
        let length = delta.norm();
        let direction = if length > 0.0 { delta / length } else { Normal3::zeros() };

        Self { start: *start, direction, length }
    }

    #[inline]
    pub fn get_start(&self) -> &Vec3 {
        &self.start
    }

    #[inline]
    pub fn get_end(&self) -> Vec3 {
        self.start + self.direction.scale(self.length)
    }

    #[inline]
    pub fn point_at(&self, t: f64) -> Vec3 {
        self.start + self.direction.scale(t)
    }

    #[inline]
    pub fn is_on_segment(&self, t: f64) -> bool {
        (0.0..=self.length).contains(&t)
    }

    fn parameter_at(&self, point: &Vec3) -> f64 {
        (point - self.start).dot(&self.direction)
    }

    fn intersects_plane3_at(&self, plane: &Plane3) -> Option<f64> {
        let denom = plane.get_normal().dot(&self.direction);
        if denom.abs() < 1e-12 {
            return None;
        }

        Some((plane.get_distance() - plane.get_normal().dot(&self.start.coords)) / denom)
    }

    #[inline]
    pub fn intersects_plane3(&self, plane: &Plane3) -> bool {
        matches!(self.intersects_plane3_at(plane), Some(t) if self.is_on_segment(t))
    }

    /// Slab-method segment/box intersection.
    pub fn intersects_box3(&self, aabb: &Box3) -> bool {
        let mut t_min = 0.0_f64;
        let mut t_max = self.length;

        for axis in 0..3 {
            let d = self.direction[axis];
            let origin = self.start[axis];
            let (min, max) = (aabb.get_min()[axis], aabb.get_max()[axis]);

            if d.abs() < 1e-12 {
                if origin < min || origin > max {
                    return false;
                }
                continue;
            }

            let inv_d = 1.0 / d;
            let mut t1 = (min - origin) * inv_d;
            let mut t2 = (max - origin) * inv_d;
            if t1 > t2 {
                std::mem::swap(&mut t1, &mut t2);
            }

            t_min = t_min.max(t1);
            t_max = t_max.min(t2);

            if t_min > t_max {
                return false;
            }
        }

        true
    }
}

impl ClosestPoint3 for LineSegment3 {
    #[inline]
    fn closest_point(&self, point: &Vec3) -> Vec3 {
        let t = self.parameter_at(point).clamp(0.0, self.length);
        self.point_at(t)
    }
}

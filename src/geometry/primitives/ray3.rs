use crate::{geometry::traits::ClosestPoint3, helpers::aliases::{Normal3, Vec3}};

use super::{box3::Box3, plane3::Plane3};

/// 3D ray: origin + t * direction, t >= 0
#[derive(Debug, Clone, Copy)]
pub struct Ray3 {
    origin: Vec3,
    direction: Normal3,
}

impl Ray3 {
    #[inline]
    pub fn new(origin: Vec3, direction: Normal3) -> Self {
        Self { origin, direction: direction.normalize() }
    }

    #[inline]
    pub fn get_origin(&self) -> &Vec3 {
        &self.origin
    }

    #[inline]
    pub fn get_direction(&self) -> &Normal3 {
        &self.direction
    }

    #[inline]
    pub fn point_at(&self, t: f64) -> Vec3 {
        self.origin + self.direction.scale(t)
    }

    pub fn intersects_plane3_at(&self, plane: &Plane3) -> Option<f64> {
        let denom = plane.get_normal().dot(&self.direction);
        if denom.abs() < 1e-12 {
            return None;
        }

        let t = (plane.get_distance() - plane.get_normal().dot(&self.origin.coords)) / denom;
        self.is_on_ray(t)
    }

    #[inline]
    pub fn intersects_plane3(&self, plane: &Plane3) -> bool {
        self.intersects_plane3_at(plane).is_some()
    }

    /// Slab-method ray/box intersection, returns the entry parameter `t`.
    pub fn intersects_box3_at(&self, aabb: &Box3) -> Option<f64> {
        let mut t_min = 0.0_f64;
        let mut t_max = f64::INFINITY;

        for axis in 0..3 {
            let d = self.direction[axis];
            let origin = self.origin[axis];
            let (min, max) = (aabb.get_min()[axis], aabb.get_max()[axis]);

            if d.abs() < 1e-12 {
                if origin < min || origin > max {
                    return None;
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
                return None;
            }
        }

        self.is_on_ray(t_min)
    }

    #[inline]
    pub fn intersects_box3(&self, aabb: &Box3) -> bool {
        self.intersects_box3_at(aabb).is_some()
    }

    fn is_on_ray(&self, t: f64) -> Option<f64> {
        if t < 0.0 {
            return None;
        }

        Some(t)
    }
}

impl ClosestPoint3 for Ray3 {
    #[inline]
    fn closest_point(&self, point: &Vec3) -> Vec3 {
        let t = (point - self.origin).dot(&self.direction).max(0.0);
        self.point_at(t)
    }
}

use nalgebra::Vector3;
use nalgebra_glm::{max2, min2};

use crate::{
    geometry::traits::{ClosestPoint3, HasBBox3},
    helpers::aliases::{Normal3, Vec3},
};

use super::{box3::Box3, line_segment3::LineSegment3, plane3::Plane3, ray3::Ray3};

pub type BarycentricCoordinates = Vector3<f64>;

/// Equilateral triangle aspect ratio, used to normalize [Triangle3::quality] to 1.0.
const EQUILATERAL_ASPECT_RATIO: f64 = 1.1547005383792515;

/// 3D triangle
#[derive(Debug, Clone, Copy)]
pub struct Triangle3 {
    a: Vec3,
    b: Vec3,
    c: Vec3,
}

impl Triangle3 {
    #[inline]
    pub fn new(a: Vec3, b: Vec3, c: Vec3) -> Self {
        Self { a, b, c }
    }

    #[inline]
    pub fn p1(&self) -> Vec3 {
        self.a
    }

    #[inline]
    pub fn p2(&self) -> Vec3 {
        self.b
    }

    #[inline]
    pub fn p3(&self) -> Vec3 {
        self.c
    }

    /// Normalized face normal. Returns `None` for a degenerate (zero-area) triangle.
    #[inline]
    pub fn normal(a: &Vec3, b: &Vec3, c: &Vec3) -> Option<Normal3> {
        let cross = (b - a).cross(&(c - a));
        if cross.norm_squared() <= 0.0 {
            return None;
        }

        Some(cross.normalize())
    }

    #[inline]
    pub fn is_degenerate(a: &Vec3, b: &Vec3, c: &Vec3) -> bool {
        (b - a).cross(&(c - a)).norm_squared() == 0.0
    }

    #[inline]
    pub fn area(a: &Vec3, b: &Vec3, c: &Vec3) -> f64 {
        (b - a).cross(&(c - a)).norm() * 0.5
    }

    /// Triangle quality in `[0, 1]`: ratio of double-area to the longest edge
    /// squared, normalized so an equilateral triangle scores 1.0. Used by the
    /// edge collapser's `avoid_small_triangles` guard.
    pub fn quality(a: &Vec3, b: &Vec3, c: &Vec3) -> f64 {
        let ab = b - a;
        let ac = c - a;
        let double_area = ab.cross(&ac).norm();

        if double_area == 0.0 {
            return 0.0;
        }

        let bc = c - b;
        let len_max = ab.norm_squared().max(ac.norm_squared()).max(bc.norm_squared());

        EQUILATERAL_ASPECT_RATIO * double_area / len_max
    }

    /// Smallest interior angle of the triangle, in radians.
    pub fn smallest_angle(a: &Vec3, b: &Vec3, c: &Vec3) -> f64 {
        let angle_at = |p: &Vec3, q: &Vec3, r: &Vec3| -> f64 {
            let u = (q - p).normalize();
            let v = (r - p).normalize();
            u.dot(&v).clamp(-1.0, 1.0).acos()
        };

        angle_at(a, b, c).min(angle_at(b, c, a)).min(angle_at(c, a, b))
    }

    #[inline]
    pub fn point_at(&self, bary: &BarycentricCoordinates) -> Vec3 {
        Vec3::from(self.a.coords * bary.x + self.b.coords * bary.y + self.c.coords * bary.z)
    }

    /// Projects `point` (assumed to be in the triangle's plane) to barycentric coordinates.
    pub fn barycentric(&self, point: &Vec3) -> BarycentricCoordinates {
        let v0 = self.b - self.a;
        let v1 = self.c - self.a;
        let v2 = point - self.a;

        let d00 = v0.dot(&v0);
        let d01 = v0.dot(&v1);
        let d11 = v1.dot(&v1);
        let d20 = v2.dot(&v0);
        let d21 = v2.dot(&v1);
        let denom = d00 * d11 - d01 * d01;

        if denom.abs() < 1e-18 {
            return BarycentricCoordinates::new(1.0, 0.0, 0.0);
        }

        let v = (d11 * d20 - d01 * d21) / denom;
        let w = (d00 * d21 - d01 * d20) / denom;
        BarycentricCoordinates::new(1.0 - v - w, v, w)
    }

    #[inline]
    pub fn plane(&self) -> Plane3 {
        Plane3::from_points(&self.a, &self.b, &self.c)
    }

    /// Test triangle - bbox intersection
    pub fn intersects_box3(&self, aabb: &Box3) -> bool {
        if !aabb.intersects_box3(&self.bbox()) {
            return false;
        }

        if aabb.contains_point(&self.a) || aabb.contains_point(&self.b) || aabb.contains_point(&self.c) {
            return true;
        }

        let some_edge_intersects_box = LineSegment3::new(&self.a, &self.b).intersects_box3(aabb)
            || LineSegment3::new(&self.a, &self.c).intersects_box3(aabb)
            || LineSegment3::new(&self.c, &self.b).intersects_box3(aabb);

        if some_edge_intersects_box {
            return true;
        }

        for i in 0..4 {
            if aabb.diagonal(i).intersects_box3(&self.bbox()) {
                return true;
            }
        }

        false
    }

    /// Möller–Trumbore ray/triangle intersection with back-face culling.
    /// Returns `(barycentric coordinates of the hit, distance along ray)`.
    pub fn intersects_ray3_at(&self, ray: &Ray3) -> Option<(BarycentricCoordinates, f64)> {
        const EPSILON: f64 = 1e-12;

        let edge1 = self.b - self.a;
        let edge2 = self.c - self.a;
        let h = ray.get_direction().cross(&edge2);
        let det = edge1.dot(&h);

        if det.abs() < EPSILON {
            return None; // ray parallel to triangle
        }

        let inv_det = 1.0 / det;
        let s = ray.get_origin() - self.a;
        let u = inv_det * s.dot(&h);
        if !(0.0..=1.0).contains(&u) {
            return None;
        }

        let q = s.cross(&edge1);
        let v = inv_det * ray.get_direction().dot(&q);
        if v < 0.0 || u + v > 1.0 {
            return None;
        }

        let t = inv_det * edge2.dot(&q);
        if t < 0.0 {
            return None;
        }

        Some((BarycentricCoordinates::new(1.0 - u - v, u, v), t))
    }

    #[inline]
    pub fn intersects_ray3(&self, ray: &Ray3) -> bool {
        self.intersects_ray3_at(ray).is_some()
    }
}

impl HasBBox3 for Triangle3 {
    #[inline]
    fn bbox(&self) -> Box3 {
        Box3::new(
            Vec3::from(min2(&self.c.coords, &min2(&self.a.coords, &self.b.coords))),
            Vec3::from(max2(&self.c.coords, &max2(&self.a.coords, &self.b.coords))),
        )
    }
}

impl ClosestPoint3 for Triangle3 {
    /// Returns the closest point on the triangle to `point` (Ericson, RTCD §5.1.5).
    fn closest_point(&self, point: &Vec3) -> Vec3 {
        let ab = self.b - self.a;
        let ac = self.c - self.a;
        let ap = point - self.a;
        let d1 = ab.dot(&ap);
        let d2 = ac.dot(&ap);

        if d1 <= 0.0 && d2 <= 0.0 {
            return self.a;
        }

        let bp = point - self.b;
        let d3 = ab.dot(&bp);
        let d4 = ac.dot(&bp);

        if d3 >= 0.0 && d4 <= d3 {
            return self.b;
        }

        let vc = d1 * d4 - d3 * d2;
        if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
            let v = d1 / (d1 - d3);
            return self.a + ab.scale(v);
        }

        let cp = point - self.c;
        let d5 = ab.dot(&cp);
        let d6 = ac.dot(&cp);

        if d6 >= 0.0 && d5 <= d6 {
            return self.c;
        }

        let vb = d5 * d2 - d1 * d6;
        if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
            let w = d2 / (d2 - d6);
            return self.a + ac.scale(w);
        }

        let va = d3 * d6 - d5 * d4;
        if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
            let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
            return self.b + (self.c - self.b).scale(w);
        }

        let denom = 1.0 / (va + vb + vc);
        let v = vb * denom;
        let w = vc * denom;
        self.a + ab.scale(v) + ac.scale(w)
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test]
    fn area_of_unit_right_triangle() {
        let area = Triangle3::area(
            &Vec3::new(0.0, 0.0, 0.0),
            &Vec3::new(1.0, 0.0, 0.0),
            &Vec3::new(0.0, 1.0, 0.0),
        );
        assert!((area - 0.5).abs() < 1e-9);
    }

    #[test]
    fn quality_of_equilateral_is_one() {
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(1.0, 0.0, 0.0);
        let c = Vec3::new(0.5, 3f64.sqrt() / 2.0, 0.0);
        assert!((Triangle3::quality(&a, &b, &c) - 1.0).abs() < 1e-6);
    }

    #[test_case(Vec3::new(0.0, 0.0, 5.0), Normal3::new(0.0, 0.0, -1.0) => Some(5) ; "ray from above hits the triangle center")]
    #[test_case(Vec3::new(0.0, 0.0, -5.0), Normal3::new(0.0, 0.0, -1.0) => None ; "ray behind the triangle plane misses")]
    fn ray_intersection_distance(origin: Vec3, direction: Normal3) -> Option<i64> {
        let tri = Triangle3::new(
            Vec3::new(-1.0, -1.0, 0.0),
            Vec3::new(1.0, -1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        );
        let ray = Ray3::new(origin, direction);
        tri.intersects_ray3_at(&ray).map(|(_, t)| t.round() as i64)
    }

    #[test]
    fn barycentric_round_trips_point_at() {
        let tri = Triangle3::new(
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        );
        let bary = BarycentricCoordinates::new(0.2, 0.3, 0.5);
        let p = tri.point_at(&bary);
        let back = tri.barycentric(&p);
        assert!((back - bary).norm() < 1e-9);
    }
}

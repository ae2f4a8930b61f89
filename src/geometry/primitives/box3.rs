use nalgebra_glm::{max2, min2};

use crate::{
    geometry::traits::{ClosestPoint3, HasBBox3},
    helpers::aliases::Vec3,
};

use super::{line_segment3::LineSegment3, plane3::Plane3, triangle3::Triangle3};

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Box3 {
    min: Vec3,
    max: Vec3,
}

impl Box3 {
    #[inline]
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn empty() -> Self {
        Self {
            min: Vec3::origin(),
            max: Vec3::origin(),
        }
    }

    #[inline]
    pub fn get_min(&self) -> &Vec3 {
        &self.min
    }

    #[inline]
    pub fn get_max(&self) -> &Vec3 {
        &self.max
    }

    #[inline]
    pub fn get_center(&self) -> Vec3 {
        Vec3::from((self.min.coords + self.max.coords) * 0.5)
    }

    #[inline]
    pub fn size_x(&self) -> f64 {
        self.max.x - self.min.x
    }

    #[inline]
    pub fn size_y(&self) -> f64 {
        self.max.y - self.min.y
    }

    #[inline]
    pub fn size_z(&self) -> f64 {
        self.max.z - self.min.z
    }

    #[inline]
    pub fn size_max(&self) -> f64 {
        self.size_x().max(self.size_y()).max(self.size_z())
    }

    /// Longest horizontal (XY) extent; used by the quadtree split tie-break.
    #[inline]
    pub fn longest_horizontal_axis(&self) -> Axis {
        if self.size_x() >= self.size_y() {
            Axis::X
        } else {
            Axis::Y
        }
    }

    /// Longest of all three extents, X preferred on ties.
    #[inline]
    pub fn longest_axis(&self) -> Axis {
        let (sx, sy, sz) = (self.size_x(), self.size_y(), self.size_z());
        if sx >= sy && sx >= sz {
            Axis::X
        } else if sy >= sz {
            Axis::Y
        } else {
            Axis::Z
        }
    }

    #[inline]
    pub fn extend(&mut self, other: &Box3) -> &mut Self {
        self.max = max2(&self.max.coords, &other.max.coords).into();
        self.min = min2(&self.min.coords, &other.min.coords).into();
        self
    }

    #[inline]
    pub fn extend_point(&mut self, point: &Vec3) -> &mut Self {
        self.max = max2(&self.max.coords, &point.coords).into();
        self.min = min2(&self.min.coords, &point.coords).into();
        self
    }

    /// Grows the box by `amount` meters on every side.
    #[inline]
    pub fn expanded(&self, amount: f64) -> Box3 {
        Box3::new(self.min.add_scalar(-amount), self.max.add_scalar(amount))
    }

    /// Returns the ith box vertex in order: (x,y,z),(X,y,z),(x,Y,z),(X,Y,z),(x,y,Z),(X,Y,Z)...
    #[inline]
    pub fn vertex(&self, i: u8) -> Vec3 {
        Vec3::new(
            if i % 2 == 1 { self.max.x } else { self.min.x },
            if (i / 2) % 2 == 1 { self.max.y } else { self.min.y },
            if i > 3 { self.max.z } else { self.min.z },
        )
    }

    #[inline]
    pub fn diagonal(&self, i: u8) -> LineSegment3 {
        LineSegment3::new(&self.vertex(i), &self.vertex(7 - i))
    }

    pub fn squared_distance(&self, point: &Vec3) -> f64 {
        let mut sq_distance = 0.0;

        for i in 0..3 {
            let v = point[i];

            if v < self.min[i] {
                sq_distance += (self.min[i] - v) * (self.min[i] - v);
            }

            if v > self.max[i] {
                sq_distance += (v - self.max[i]) * (v - self.max[i]);
            }
        }

        sq_distance
    }

    /// Surface area, used by the SAH split-cost heuristic.
    #[inline]
    pub fn area(&self) -> f64 {
        let (sx, sy, sz) = (self.size_x(), self.size_y(), self.size_z());
        2.0 * (sx * sy + sy * sz + sz * sx)
    }

    #[inline]
    pub fn volume(&self) -> f64 {
        self.size_x() * self.size_y() * self.size_z()
    }

    #[inline]
    pub fn contains_point(&self, point: &Vec3) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
            && point.z >= self.min.z
            && point.z <= self.max.z
    }

    /// Test bbox - bbox intersection
    pub fn intersects_box3(&self, other: &Box3) -> bool {
        if self.max.x < other.min.x || self.min.x > other.max.x {
            return false;
        }

        if self.max.y < other.min.y || self.min.y > other.max.y {
            return false;
        }

        if self.max.z < other.min.z || self.min.z > other.max.z {
            return false;
        }

        true
    }

    #[inline]
    pub fn intersects_plane3(&self, plane: &Plane3) -> bool {
        plane.intersects_box3(self)
    }

    #[inline]
    pub fn intersects_triangle3(&self, triangle: &Triangle3) -> bool {
        triangle.intersects_box3(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl HasBBox3 for Box3 {
    #[inline]
    fn bbox(&self) -> Box3 {
        *self
    }
}

impl ClosestPoint3 for Box3 {
    #[inline]
    fn closest_point(&self, point: &Vec3) -> Vec3 {
        Vec3::from(min2(&max2(&self.min.coords, &point.coords), &self.max.coords))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_point() {
        let b = Box3::new(Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 1.0, 1.0));
        assert!(b.contains_point(&Vec3::new(0.5, 0.5, 0.5)));
        assert!(!b.contains_point(&Vec3::new(1.5, 0.5, 0.5)));
    }

    #[test]
    fn extend_grows_to_cover_both_boxes() {
        let mut a = Box3::new(Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 1.0, 1.0));
        let b = Box3::new(Vec3::new(-1.0, 2.0, 0.0), Vec3::new(0.5, 3.0, 0.5));
        a.extend(&b);
        assert_eq!(*a.get_min(), Vec3::new(-1.0, 0.0, 0.0));
        assert_eq!(*a.get_max(), Vec3::new(1.0, 3.0, 1.0));
    }
}

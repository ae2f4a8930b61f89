use nalgebra::{Matrix3, Rotation3};

use crate::helpers::aliases::{Normal3, Vec3};

/// Projection and unprojection for one observation's source image (spec §3:
/// "a read-only image plus its camera model").
pub trait CameraModel: Send + Sync {
    /// World-space camera center.
    fn center(&self) -> Vec3;

    /// True iff `point` falls inside this camera's view frustum, ignoring
    /// occlusion (a cheap pre-filter before the resolution/occlusion gates).
    fn contains(&self, point: &Vec3) -> bool;

    /// Projects a world point to a floating-point (row, col) pixel
    /// coordinate. `None` if the point is behind the camera.
    fn project(&self, point: &Vec3) -> Option<(f64, f64)>;

    /// Effective ground resolution in pixels per meter at `point`, derived
    /// from distance, focal length and sensor pitch.
    fn pixels_per_meter(&self, point: &Vec3) -> f64;

    fn image_width(&self) -> u32;
    fn image_height(&self) -> u32;
}

/// A calibrated pinhole camera: focal length in pixels, principal point,
/// image dimensions, and a rigid world-to-camera pose.
#[derive(Debug, Clone)]
pub struct PinholeCamera {
    pub focal_length_px: f64,
    pub principal_point: (f64, f64),
    pub width: u32,
    pub height: u32,
    pub position: Vec3,
    pub orientation: Rotation3<f64>,
}

impl PinholeCamera {
    /// `point` expressed in the camera's local frame.
    fn to_local(&self, point: &Vec3) -> Vec3 {
        Vec3::from(self.orientation.inverse() * (*point - self.position))
    }

    /// Distance along the camera's forward (local -Z) axis; positive for
    /// points in front of the camera, matching `orientation = identity`
    /// meaning "looking straight down" for a camera placed above its scene.
    fn depth(&self, point: &Vec3) -> f64 {
        -self.to_local(point).z
    }

    pub fn intrinsics(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.focal_length_px, 0.0, self.principal_point.0,
            0.0, self.focal_length_px, self.principal_point.1,
            0.0, 0.0, 1.0,
        )
    }
}

impl CameraModel for PinholeCamera {
    fn center(&self) -> Vec3 {
        self.position
    }

    fn contains(&self, point: &Vec3) -> bool {
        self.project(point)
            .map(|(row, col)| row >= 0.0 && row < self.height as f64 && col >= 0.0 && col < self.width as f64)
            .unwrap_or(false)
    }

    fn project(&self, point: &Vec3) -> Option<(f64, f64)> {
        let local = self.to_local(point);
        let depth = self.depth(point);
        if depth <= 1e-6 {
            return None; // behind or at the camera
        }

        let col = self.focal_length_px * local.x / depth + self.principal_point.0;
        let row = self.focal_length_px * local.y / depth + self.principal_point.1;
        Some((row, col))
    }

    fn pixels_per_meter(&self, point: &Vec3) -> f64 {
        let depth = self.depth(point);
        if depth <= 1e-6 {
            return 0.0;
        }
        self.focal_length_px / depth
    }

    fn image_width(&self) -> u32 {
        self.width
    }

    fn image_height(&self) -> u32 {
        self.height
    }
}

/// Angle, in radians, between a surface normal and the ray from a surface
/// point back toward the camera; used for the grazing-angle gate.
pub fn viewing_angle(normal: &Normal3, point: &Vec3, camera_center: &Vec3) -> f64 {
    let to_camera = (*camera_center - *point).normalize();
    normal.normalize().dot(&to_camera).clamp(-1.0, 1.0).acos()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overhead_camera(height: f64) -> PinholeCamera {
        PinholeCamera {
            focal_length_px: 1000.0,
            principal_point: (128.0, 128.0),
            width: 256,
            height: 256,
            position: Vec3::new(0.0, 0.0, height),
            orientation: Rotation3::identity(),
        }
    }

    #[test]
    fn point_directly_below_projects_to_principal_point() {
        let cam = overhead_camera(1.0);
        let (row, col) = cam.project(&Vec3::new(0.0, 0.0, 0.0)).unwrap();
        assert!((row - 128.0).abs() < 1e-6);
        assert!((col - 128.0).abs() < 1e-6);
    }

    #[test]
    fn closer_camera_yields_higher_resolution() {
        let near = overhead_camera(1.0);
        let far = overhead_camera(2.0);
        let p = Vec3::new(0.0, 0.0, 0.0);
        assert!(near.pixels_per_meter(&p) > far.pixels_per_meter(&p));
    }

    #[test]
    fn point_behind_camera_is_not_contained() {
        let cam = overhead_camera(1.0);
        assert!(!cam.contains(&Vec3::new(0.0, 0.0, 2.0)));
    }
}

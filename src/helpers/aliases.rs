use nalgebra::{Matrix4, Point3, Vector3};

/// World-space position. The pipeline works in a single fixed precision
/// throughout (meters), unlike the teacher library which is generic over
/// `RealNumber`.
pub type Vec3 = Point3<f64>;
pub type Normal3 = Vector3<f64>;

/// Symmetric 4x4 quadric matrix accumulated during edge collapse.
pub type Mat4 = Matrix4<f64>;

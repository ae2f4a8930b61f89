//! Quadric edge-collapse mesh decimation (component A).

pub mod collapse;
pub mod graph;
pub mod options;

pub use collapse::decimate;
pub use options::DecimationOptions;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{helpers::aliases::Vec3, mesh::Mesh};

    fn cube_mesh() -> Mesh {
        let p = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(0.0, 1.0, 1.0),
        ];
        let faces = vec![
            [0, 2, 1], [0, 3, 2], // bottom
            [4, 5, 6], [4, 6, 7], // top
            [0, 1, 5], [0, 5, 4], // front
            [1, 2, 6], [1, 6, 5], // right
            [2, 3, 7], [2, 7, 6], // back
            [3, 0, 4], [3, 4, 7], // left
        ];
        Mesh::new(p.to_vec(), faces)
    }

    fn tetrahedron_mesh() -> Mesh {
        let p = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
        ];
        let faces = vec![[0, 2, 1], [0, 1, 3], [1, 2, 3], [2, 0, 3]];
        Mesh::new(p.to_vec(), faces)
    }

    #[test]
    fn decimating_above_target_is_a_noop_on_face_count() {
        let mesh = cube_mesh();
        let out = decimate(&mesh, 1000, &DecimationOptions::default()).unwrap();
        assert_eq!(out.face_count(), mesh.face_count());
    }

    #[test]
    fn cube_decimates_to_a_watertight_low_poly_mesh() {
        let mesh = cube_mesh();
        let out = decimate(&mesh, 6, &DecimationOptions::default()).unwrap();
        assert!(out.face_count() >= 4 && out.face_count() <= 12);
        assert!(out.face_count() <= mesh.face_count());

        let input_bounds = mesh.bounds();
        let output_bounds = out.bounds();
        assert!(output_bounds.get_min().x >= input_bounds.get_min().x - 1e-6);
        assert!(output_bounds.get_max().x <= input_bounds.get_max().x + 1e-6);
    }

    #[test]
    fn pinned_corners_survive_decimation() {
        // 3x3 grid of vertices (2x2 squares, 8 triangles), corners pinned.
        let mut positions = Vec::new();
        for y in 0..3 {
            for x in 0..3 {
                positions.push(Vec3::new(x as f64, y as f64, 0.0));
            }
        }
        let mut faces = Vec::new();
        for y in 0..2 {
            for x in 0..2 {
                let i0 = (y * 3 + x) as u32;
                let i1 = i0 + 1;
                let i2 = i0 + 4;
                let i3 = i0 + 3;
                faces.push([i0, i2, i1]);
                faces.push([i0, i3, i2]);
            }
        }
        let mesh = Mesh::new(positions, faces);

        let corners = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(0.0, 2.0, 0.0),
            Vec3::new(2.0, 2.0, 0.0),
        ];

        let options = DecimationOptions { pinned_vertices: corners.clone(), ..Default::default() };
        let out = decimate(&mesh, 2, &options).unwrap();

        for corner in &corners {
            assert!(out.positions.iter().any(|p| (p - corner).norm() < 1e-9));
        }
    }

    #[test]
    fn preserve_topology_blocks_tetrahedron_collapse() {
        let mesh = tetrahedron_mesh();
        let options = DecimationOptions { preserve_topology: true, ..Default::default() };
        let out = decimate(&mesh, 1, &options).unwrap();
        assert_eq!(out.face_count(), mesh.face_count());
    }

    #[test]
    fn accuracy_threshold_halts_before_excessive_drift() {
        let mesh = cube_mesh();
        let options = DecimationOptions { accuracy_threshold: Some(1e-9), ..Default::default() };
        let out = decimate(&mesh, 1, &options).unwrap();
        // an essentially-zero threshold should leave the mesh close to untouched
        assert!(out.face_count() >= mesh.face_count() - 2);
    }
}

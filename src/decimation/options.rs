use crate::helpers::aliases::Vec3;

/// Options controlling [`super::decimate`]. See spec §4.A "Options".
#[derive(Debug, Clone)]
pub struct DecimationOptions {
    /// Multiplier applied to `Q` for perimeter vertices. 1 disables the
    /// effect; production runs typically use 100 to hold mesh boundaries.
    pub perimeter_penalty: f64,
    /// Only collapse edges whose endpoints share exactly two (interior) or
    /// one (boundary) common neighbor, blocking tetrahedron-interior
    /// collapses.
    pub preserve_topology: bool,
    /// Scale quadric contributions by triangle area rather than by count.
    pub weight_by_area: bool,
    pub avoid_flips: bool,
    /// Reject a collapse whose change in summed-normal magnitude squared
    /// falls below this threshold.
    pub flip_threshold: f64,
    pub avoid_small_triangles: bool,
    /// Reject a collapse that would scale the smallest angle of any
    /// surrounding triangle below this ratio of its current value.
    pub angle_threshold: f64,
    /// Vertices at these positions are marked untouchable.
    pub pinned_vertices: Vec<Vec3>,
    /// If positive, stop decimation once the conservative per-vertex drift
    /// exceeds this value.
    pub accuracy_threshold: Option<f64>,
}

impl Default for DecimationOptions {
    fn default() -> Self {
        Self {
            perimeter_penalty: 1.0,
            preserve_topology: false,
            weight_by_area: false,
            avoid_flips: false,
            flip_threshold: 0.0,
            avoid_small_triangles: false,
            angle_threshold: 0.0,
            pinned_vertices: Vec::new(),
            accuracy_threshold: None,
        }
    }
}

pub mod float_hash;
pub mod merge_points;
pub mod rng;
pub mod sample_points;

pub mod box3;
pub mod line_segment3;
pub mod plane3;
pub mod ray3;
pub mod sphere3;
pub mod triangle3;

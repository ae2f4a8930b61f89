use crate::helpers::aliases::Vec3;

/// Hashes a single float by quantizing it onto a large prime-scaled grid.
/// Two floats that compare equal always hash equal.
pub fn hash_float(float: f64) -> i32 {
    if float == 0.0 {
        return 0;
    }

    ((float * 73856093.0).floor() as i64 % i32::MAX as i64) as i32
}

pub fn hash_vec3(v: &Vec3) -> i32 {
    let x = hash_float(v.x);
    let y = hash_float(v.y);
    let z = hash_float(v.z);

    combine_hash(combine_hash(x, y), z)
}

#[inline]
pub fn combine_hash(h1: i32, h2: i32) -> i32 {
    i32::wrapping_add(h1 << 5, h1) ^ h2
}

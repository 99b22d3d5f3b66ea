//! Scalar helpers shared by the CPU effect bank and the compositor.
//!
//! The hash and noise functions here are mirrored line for line in `effects/effects.wgsl`.
//! They only use wrapping integer arithmetic plus a final `u32 -> f32` scale, so the CPU
//! reference output is bit-stable across runs.

pub(crate) fn mul_div255_u16(x: u16, y: u16) -> u16 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u16
}

pub(crate) fn unit_to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

pub(crate) fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Hermite smoothstep. Requires `edge0 < edge1`.
pub(crate) fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// PCG-style integer hash.
pub(crate) fn hash_u32(x: u32) -> u32 {
    let state = x.wrapping_mul(747_796_405).wrapping_add(2_891_336_453);
    let word = ((state >> ((state >> 28) + 4)) ^ state).wrapping_mul(277_803_737);
    (word >> 22) ^ word
}

/// Hash of a signed lattice cell plus seed, scaled into `[0, 1]`.
pub(crate) fn hash3(x: i32, y: i32, seed: u32) -> f32 {
    let h = hash_u32((x as u32) ^ hash_u32((y as u32) ^ hash_u32(seed)));
    h as f32 / u32::MAX as f32
}

/// Smoothly interpolated lattice noise in `[0, 1]`.
pub(crate) fn value_noise(x: f32, y: f32, seed: u32) -> f32 {
    let ix = x.floor();
    let iy = y.floor();
    let fx = x - ix;
    let fy = y - iy;
    let ux = fx * fx * (3.0 - 2.0 * fx);
    let uy = fy * fy * (3.0 - 2.0 * fy);

    let (ix, iy) = (ix as i32, iy as i32);
    let a = hash3(ix, iy, seed);
    let b = hash3(ix.wrapping_add(1), iy, seed);
    let c = hash3(ix, iy.wrapping_add(1), seed);
    let d = hash3(ix.wrapping_add(1), iy.wrapping_add(1), seed);
    lerp(lerp(a, b, ux), lerp(c, d, ux), uy)
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/math.rs"]
mod tests;

//! SIMD distance kernel using the `wide` crate.
//!
//! Processes 8 descriptor components at a time with `f32x8`; the tail is
//! handled with a scalar loop.

use crate::kernel::DistanceKernel;
use wide::f32x8;

const LANES: usize = 8;

/// Load 8 f32 values into f32x8.
#[inline]
fn load_f32x8(slice: &[f32]) -> f32x8 {
    f32x8::from([
        slice[0], slice[1], slice[2], slice[3], slice[4], slice[5], slice[6], slice[7],
    ])
}

/// Horizontal sum of f32x8.
#[inline]
fn hsum(v: f32x8) -> f32 {
    let arr = v.to_array();
    arr[0] + arr[1] + arr[2] + arr[3] + arr[4] + arr[5] + arr[6] + arr[7]
}

/// `f32x8` squared-distance kernel.
pub struct SimdL2;

impl DistanceKernel for SimdL2 {
    #[inline]
    fn sq_l2(a: &[f32], b: &[f32]) -> f32 {
        debug_assert_eq!(a.len(), b.len());
        let n = a.len().min(b.len());
        let simd_end = n / LANES * LANES;

        let mut acc = f32x8::ZERO;
        let mut i = 0;
        while i < simd_end {
            let d = load_f32x8(&a[i..i + LANES]) - load_f32x8(&b[i..i + LANES]);
            acc += d * d;
            i += LANES;
        }

        let mut tail = 0.0f32;
        for j in simd_end..n {
            let d = a[j] - b[j];
            tail += d * d;
        }
        hsum(acc) + tail
    }
}

#[cfg(test)]
mod tests {
    use super::SimdL2;
    use crate::kernel::scalar::ScalarL2;
    use crate::kernel::DistanceKernel;

    #[test]
    fn simd_matches_scalar() {
        let a: Vec<f32> = (0..21).map(|i| (i as f32 * 0.37).sin()).collect();
        let b: Vec<f32> = (0..21).map(|i| (i as f32 * 0.11).cos()).collect();
        let s = ScalarL2::sq_l2(&a, &b);
        let v = SimdL2::sq_l2(&a, &b);
        assert!((s - v).abs() < 1e-4);
    }
}

//! Scalar distance kernel.

use crate::kernel::DistanceKernel;

/// Plain loop over descriptor components.
pub struct ScalarL2;

impl DistanceKernel for ScalarL2 {
    #[inline]
    fn sq_l2(a: &[f32], b: &[f32]) -> f32 {
        debug_assert_eq!(a.len(), b.len());
        a.iter()
            .zip(b.iter())
            .map(|(x, y)| {
                let d = x - y;
                d * d
            })
            .sum()
    }
}

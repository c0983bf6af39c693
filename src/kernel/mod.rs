//! Descriptor distance kernels.
//!
//! The scalar kernel is always available; the `simd` feature adds an `f32x8`
//! kernel built on `wide`. Nearest-neighbor search goes through
//! [`DefaultL2`], which resolves to the fastest enabled kernel.

/// Squared Euclidean distance between two descriptors of equal length.
pub trait DistanceKernel {
    fn sq_l2(a: &[f32], b: &[f32]) -> f32;
}

pub mod scalar;

#[cfg(feature = "simd")]
pub mod simd;

#[cfg(not(feature = "simd"))]
pub type DefaultL2 = scalar::ScalarL2;
#[cfg(feature = "simd")]
pub type DefaultL2 = simd::SimdL2;

//! Small numeric helpers shared by the extractor and the geometry code.

/// Subtracts the mean and scales `values` to unit L2 norm.
///
/// Returns `false` and leaves the values centered when the norm is below
/// `min_norm`, which marks a flat patch.
pub(crate) fn center_and_normalize(values: &mut [f32], min_norm: f32) -> bool {
    if values.is_empty() {
        return false;
    }
    let mean = values.iter().sum::<f32>() / values.len() as f32;
    let mut norm_sq = 0.0f32;
    for v in values.iter_mut() {
        *v -= mean;
        norm_sq += *v * *v;
    }
    let norm = norm_sq.sqrt();
    if !norm.is_finite() || norm < min_norm {
        return false;
    }
    let inv = 1.0 / norm;
    for v in values.iter_mut() {
        *v *= inv;
    }
    true
}

/// Twice the signed area of the triangle `(a, b, c)`.
pub(crate) fn cross2(a: [f64; 2], b: [f64; 2], c: [f64; 2]) -> f64 {
    (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0])
}

#[cfg(test)]
mod tests {
    use super::{center_and_normalize, cross2};

    #[test]
    fn center_and_normalize_yields_unit_norm() {
        let mut values = [1.0f32, 2.0, 3.0, 6.0];
        assert!(center_and_normalize(&mut values, 1e-6));
        let mean: f32 = values.iter().sum::<f32>() / 4.0;
        let norm: f32 = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!(mean.abs() < 1e-6);
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn center_and_normalize_rejects_flat_values() {
        let mut values = [0.5f32; 16];
        assert!(!center_and_normalize(&mut values, 1e-6));
    }

    #[test]
    fn cross2_detects_collinear_points() {
        assert!(cross2([0.0, 0.0], [1.0, 1.0], [2.0, 2.0]).abs() < 1e-12);
        assert!((cross2([0.0, 0.0], [1.0, 0.0], [0.0, 1.0]) - 1.0).abs() < 1e-12);
    }
}

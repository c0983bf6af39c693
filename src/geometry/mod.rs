//! Planar projective geometry: homographies and their robust estimation.

mod homography;
pub mod ransac;

pub use homography::{dlt_homography, find_homography, HomographyFit, MIN_CORRESPONDENCES};
pub use ransac::{Estimator, RansacOptions, RansacResult};

use nalgebra::{Matrix3, Point2, Vector3};

/// 2D point in pixel coordinates.
pub type Pt2 = Point2<f64>;

const W_EPS: f64 = 1e-12;

/// 3x3 projective transform between two images' pixel coordinates.
///
/// The matrix is kept scaled so that `H[2,2] == 1` whenever that entry is
/// not vanishingly small.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Homography {
    m: Matrix3<f64>,
}

impl Homography {
    /// The identity mapping.
    pub fn identity() -> Self {
        Self {
            m: Matrix3::identity(),
        }
    }

    /// Wraps a matrix, normalizing its scale.
    pub fn from_matrix(m: Matrix3<f64>) -> Self {
        let scale = m[(2, 2)];
        let m = if scale.abs() > f64::EPSILON { m / scale } else { m };
        Self { m }
    }

    /// Returns the underlying matrix.
    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.m
    }

    /// Returns the matrix entries in row-major order.
    pub fn to_row_major(&self) -> [f64; 9] {
        let mut out = [0.0; 9];
        for r in 0..3 {
            for c in 0..3 {
                out[3 * r + c] = self.m[(r, c)];
            }
        }
        out
    }

    /// Maps a point, returning `None` when it lands at infinity.
    pub fn apply(&self, p: [f64; 2]) -> Option<[f64; 2]> {
        let v = self.m * Vector3::new(p[0], p[1], 1.0);
        let w = v[2];
        if !w.is_finite() || w.abs() <= W_EPS || !v[0].is_finite() || !v[1].is_finite() {
            return None;
        }
        Some([v[0] / w, v[1] / w])
    }

    /// Returns the inverse mapping if the matrix is invertible.
    pub fn inverse(&self) -> Option<Self> {
        let det = self.m.determinant();
        if !det.is_finite() || det.abs() <= W_EPS {
            return None;
        }
        self.m.try_inverse().map(Self::from_matrix)
    }
}

/// Hartley normalization: zero mean and average distance `sqrt(2)`.
///
/// Returns the normalized points and the similarity `T` with `p' = T p`, or
/// `None` when all points coincide.
pub(crate) fn normalize_points_2d(points: &[Pt2]) -> Option<(Vec<Pt2>, Matrix3<f64>)> {
    if points.is_empty() {
        return None;
    }

    let n = points.len() as f64;
    let (mut cx, mut cy) = (0.0, 0.0);
    for p in points {
        cx += p.x;
        cy += p.y;
    }
    cx /= n;
    cy /= n;

    let mut mean_dist = 0.0;
    for p in points {
        let dx = p.x - cx;
        let dy = p.y - cy;
        mean_dist += (dx * dx + dy * dy).sqrt();
    }
    mean_dist /= n;
    if mean_dist <= f64::EPSILON {
        return None;
    }

    let scale = 2.0_f64.sqrt() / mean_dist;
    let t = Matrix3::new(
        scale,
        0.0,
        -scale * cx,
        0.0,
        scale,
        -scale * cy,
        0.0,
        0.0,
        1.0,
    );
    let normalized = points
        .iter()
        .map(|p| Pt2::new(scale * (p.x - cx), scale * (p.y - cy)))
        .collect();
    Some((normalized, t))
}

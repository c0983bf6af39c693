//! Homography estimation: normalized DLT and a RANSAC wrapper.
//!
//! The estimated `H` maps **source** points to **destination** points,
//! `dst ~ H src`. Residuals are forward reprojection distances in pixels.

use crate::geometry::ransac::{ransac, Estimator, RansacOptions};
use crate::geometry::{normalize_points_2d, Homography, Pt2};
use crate::util::math::cross2;
use crate::util::{FormMatchError, FormMatchResult};
use nalgebra::{DMatrix, Matrix3};

/// Minimum number of correspondences for a homography.
pub const MIN_CORRESPONDENCES: usize = 4;

const COLLINEAR_EPS: f64 = 1e-6;

/// Result of a robust homography fit.
#[derive(Clone, Debug, PartialEq)]
pub struct HomographyFit {
    /// Best consensus homography (`dst ~ H src`).
    pub homography: Homography,
    /// One flag per input correspondence, `true` for inliers.
    pub inlier_mask: Vec<bool>,
}

impl HomographyFit {
    /// Number of inlier correspondences.
    pub fn inlier_count(&self) -> usize {
        self.inlier_mask.iter().filter(|&&m| m).count()
    }
}

/// Estimates `H` such that `dst ~ H src` with the normalized DLT.
///
/// Points are Hartley-normalized, `A h = 0` is solved through the SVD of the
/// design matrix, and the result is de-normalized and scaled to `H[2,2] = 1`.
pub fn dlt_homography(src: &[Pt2], dst: &[Pt2]) -> FormMatchResult<Homography> {
    let n = src.len();
    if dst.len() != n {
        return Err(FormMatchError::InvalidInput(
            "source and destination point counts differ",
        ));
    }
    if n < MIN_CORRESPONDENCES {
        return Err(FormMatchError::InvalidInput(
            "need at least 4 point correspondences",
        ));
    }

    let degenerate = FormMatchError::HomographyDegenerate {
        reason: "degenerate point configuration",
    };
    let (src_n, t_src) = normalize_points_2d(src).ok_or(degenerate.clone())?;
    let (dst_n, t_dst) = normalize_points_2d(dst).ok_or(degenerate)?;

    let mut a = DMatrix::<f64>::zeros(2 * n, 9);
    for (i, (ps, pd)) in src_n.iter().zip(dst_n.iter()).enumerate() {
        let (x, y) = (ps.x, ps.y);
        let (u, v) = (pd.x, pd.y);
        let r0 = 2 * i;
        let r1 = 2 * i + 1;

        a[(r0, 0)] = -x;
        a[(r0, 1)] = -y;
        a[(r0, 2)] = -1.0;
        a[(r0, 6)] = u * x;
        a[(r0, 7)] = u * y;
        a[(r0, 8)] = u;

        a[(r1, 3)] = -x;
        a[(r1, 4)] = -y;
        a[(r1, 5)] = -1.0;
        a[(r1, 6)] = v * x;
        a[(r1, 7)] = v * y;
        a[(r1, 8)] = v;
    }

    // The SVD needs at least as many rows as columns.
    if a.nrows() < a.ncols() {
        let (rows, cols) = (a.nrows(), a.ncols());
        let mut padded = DMatrix::<f64>::zeros(cols, cols);
        padded.view_mut((0, 0), (rows, cols)).copy_from(&a);
        a = padded;
    }

    let svd = a.svd(true, true);
    let v_t = svd.v_t.ok_or(FormMatchError::HomographyDegenerate {
        reason: "svd failed",
    })?;
    let h_vec = v_t.row(v_t.nrows() - 1);

    let mut h = Matrix3::zeros();
    for r in 0..3 {
        for c in 0..3 {
            h[(r, c)] = h_vec[3 * r + c];
        }
    }

    let t_dst_inv = t_dst
        .try_inverse()
        .ok_or(FormMatchError::HomographyDegenerate {
            reason: "normalization is not invertible",
        })?;
    let h = t_dst_inv * h * t_src;
    if h.iter().any(|v| !v.is_finite()) || h[(2, 2)].abs() <= f64::EPSILON {
        return Err(FormMatchError::HomographyDegenerate {
            reason: "non-finite or unnormalizable solution",
        });
    }
    Ok(Homography::from_matrix(h))
}

#[derive(Clone, Copy)]
struct Correspondence {
    src: Pt2,
    dst: Pt2,
}

struct HomographyEstimator;

fn any_three_collinear(points: [Pt2; 4]) -> bool {
    const TRIPLES: [[usize; 3]; 4] = [[0, 1, 2], [0, 1, 3], [0, 2, 3], [1, 2, 3]];
    TRIPLES.iter().any(|t| {
        let a = points[t[0]];
        let b = points[t[1]];
        let c = points[t[2]];
        cross2([a.x, a.y], [b.x, b.y], [c.x, c.y]).abs() < COLLINEAR_EPS
    })
}

impl Estimator for HomographyEstimator {
    type Datum = Correspondence;
    type Model = Homography;

    const MIN_SAMPLES: usize = MIN_CORRESPONDENCES;

    fn fit(data: &[Self::Datum], sample_indices: &[usize]) -> Option<Self::Model> {
        Self::refit(data, sample_indices)
    }

    fn residual(model: &Self::Model, datum: &Self::Datum) -> f64 {
        match model.apply([datum.src.x, datum.src.y]) {
            Some([u, v]) => ((u - datum.dst.x).powi(2) + (v - datum.dst.y).powi(2)).sqrt(),
            None => f64::INFINITY,
        }
    }

    fn is_degenerate(data: &[Self::Datum], sample_indices: &[usize]) -> bool {
        let [i0, i1, i2, i3] = match sample_indices {
            &[a, b, c, d] => [a, b, c, d],
            _ => return true,
        };
        let src = [data[i0].src, data[i1].src, data[i2].src, data[i3].src];
        let dst = [data[i0].dst, data[i1].dst, data[i2].dst, data[i3].dst];
        any_three_collinear(src) || any_three_collinear(dst)
    }

    fn refit(data: &[Self::Datum], inliers: &[usize]) -> Option<Self::Model> {
        if inliers.len() < MIN_CORRESPONDENCES {
            return None;
        }
        let src: Vec<Pt2> = inliers.iter().map(|&i| data[i].src).collect();
        let dst: Vec<Pt2> = inliers.iter().map(|&i| data[i].dst).collect();
        dlt_homography(&src, &dst).ok()
    }
}

/// Robustly estimates `H` such that `dst ~ H src`.
///
/// Fails with `InvalidInput` for fewer than four correspondences and with
/// `HomographyDegenerate` when no consensus model exists (for example when
/// every minimal sample is collinear).
pub fn find_homography(
    src: &[Pt2],
    dst: &[Pt2],
    opts: &RansacOptions,
) -> FormMatchResult<HomographyFit> {
    if src.len() != dst.len() {
        return Err(FormMatchError::InvalidInput(
            "source and destination point counts differ",
        ));
    }
    if src.len() < MIN_CORRESPONDENCES {
        return Err(FormMatchError::InvalidInput(
            "need at least 4 point correspondences",
        ));
    }

    let data: Vec<Correspondence> = src
        .iter()
        .zip(dst.iter())
        .map(|(&src, &dst)| Correspondence { src, dst })
        .collect();

    let res = ransac::<HomographyEstimator>(&data, opts);
    let homography = match (res.success, res.model) {
        (true, Some(model)) => model,
        _ => {
            return Err(FormMatchError::HomographyDegenerate {
                reason: "ransac found no consensus homography",
            })
        }
    };

    let mut inlier_mask = vec![false; data.len()];
    for &idx in &res.inliers {
        inlier_mask[idx] = true;
    }
    Ok(HomographyFit {
        homography,
        inlier_mask,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ground_truth() -> Homography {
        Homography::from_matrix(Matrix3::new(
            0.92, 0.04, 35.0, -0.03, 1.05, -12.0, 2e-5, -1e-5, 1.0,
        ))
    }

    fn grid_points() -> Vec<Pt2> {
        let mut pts = Vec::new();
        for y in 0..5 {
            for x in 0..6 {
                pts.push(Pt2::new(40.0 + 150.0 * x as f64, 30.0 + 120.0 * y as f64));
            }
        }
        pts
    }

    fn project(h: &Homography, pts: &[Pt2]) -> Vec<Pt2> {
        pts.iter()
            .map(|p| {
                let [u, v] = h.apply([p.x, p.y]).unwrap();
                Pt2::new(u, v)
            })
            .collect()
    }

    #[test]
    fn dlt_recovers_scale() {
        let src = [
            Pt2::new(0.0, 0.0),
            Pt2::new(1.0, 0.0),
            Pt2::new(1.0, 1.0),
            Pt2::new(0.0, 1.0),
        ];
        let dst = [
            Pt2::new(0.0, 0.0),
            Pt2::new(2.0, 0.0),
            Pt2::new(2.0, 2.0),
            Pt2::new(0.0, 2.0),
        ];
        let h = dlt_homography(&src, &dst).unwrap();
        assert!((h.matrix()[(0, 0)] - 2.0).abs() < 1e-9);
        assert!((h.matrix()[(1, 1)] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn ransac_rejects_outliers() {
        let h_gt = ground_truth();
        let mut src = grid_points();
        let mut dst = project(&h_gt, &src);
        let n_inliers = src.len();
        src.extend([Pt2::new(100.0, 100.0), Pt2::new(500.0, 300.0)]);
        dst.extend([Pt2::new(900.0, 10.0), Pt2::new(-80.0, 640.0)]);

        let fit = find_homography(&src, &dst, &RansacOptions::default()).unwrap();
        assert_eq!(fit.inlier_count(), n_inliers);
        assert!(!fit.inlier_mask[n_inliers]);
        assert!(!fit.inlier_mask[n_inliers + 1]);
        for (p, q) in src.iter().zip(dst.iter()).take(n_inliers) {
            let [u, v] = fit.homography.apply([p.x, p.y]).unwrap();
            assert!((u - q.x).abs() < 1e-6 && (v - q.y).abs() < 1e-6);
        }
    }

    #[test]
    fn collinear_correspondences_are_degenerate() {
        let src: Vec<Pt2> = (0..10).map(|i| Pt2::new(i as f64 * 10.0, i as f64 * 5.0)).collect();
        let dst = src.clone();
        let err = find_homography(&src, &dst, &RansacOptions::default()).unwrap_err();
        assert!(matches!(err, FormMatchError::HomographyDegenerate { .. }));
    }

    #[test]
    fn too_few_points_are_rejected() {
        let pts = [Pt2::new(0.0, 0.0), Pt2::new(1.0, 0.0), Pt2::new(0.0, 1.0)];
        assert!(matches!(
            find_homography(&pts, &pts, &RansacOptions::default()),
            Err(FormMatchError::InvalidInput(_))
        ));
    }
}

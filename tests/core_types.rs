use formmatch::geometry::Pt2;
use formmatch::{
    find_homography, FeatureSet, FormMatchError, Homography, ImageView, Keypoint, RansacOptions,
};
use nalgebra::Matrix3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[test]
fn image_view_rejects_invalid_dimensions() {
    let data = [0.0f32; 4];

    let err = ImageView::from_slice(&data, 0, 1).err().unwrap();
    assert_eq!(
        err,
        FormMatchError::InvalidDimensions {
            width: 0,
            height: 1,
        }
    );

    let err = ImageView::new(&data, 4, 1, 3).err().unwrap();
    assert_eq!(
        err,
        FormMatchError::InvalidStride {
            width: 4,
            stride: 3,
        }
    );
}

#[test]
fn feature_set_rejects_misaligned_descriptors() {
    let kps = vec![Keypoint::new(1.0, 2.0), Keypoint::new(3.0, 4.0)];
    let err = FeatureSet::new(kps, vec![0.0; 12], 4).unwrap_err();
    assert_eq!(
        err,
        FormMatchError::DescriptorLengthMismatch {
            keypoints: 2,
            descriptors: 3,
        }
    );
}

#[test]
fn homography_survives_outliers() {
    let truth = Homography::from_matrix(Matrix3::new(
        1.02, -0.05, 14.0, 0.03, 0.97, -9.0, 1.5e-5, -2e-5, 1.0,
    ));
    let mut rng = StdRng::seed_from_u64(7);
    let mut src = Vec::new();
    let mut dst = Vec::new();
    for i in 0..120 {
        let p = [rng.random_range(0.0..1970.0), rng.random_range(0.0..1436.0)];
        src.push(Pt2::new(p[0], p[1]));
        let q = if i % 4 == 0 {
            [rng.random_range(0.0..1970.0), rng.random_range(0.0..1436.0)]
        } else {
            truth.apply(p).unwrap()
        };
        dst.push(Pt2::new(q[0], q[1]));
    }

    let fit = find_homography(&src, &dst, &RansacOptions::default()).unwrap();
    assert!(fit.inlier_count() >= 90);
    for i in (1..120).filter(|i| i % 4 != 0) {
        assert!(fit.inlier_mask[i], "inlier {i} rejected");
    }
    for p in [[0.0, 0.0], [1970.0, 1436.0], [985.0, 700.0]] {
        let a = fit.homography.apply(p).unwrap();
        let b = truth.apply(p).unwrap();
        assert!((a[0] - b[0]).abs() < 1e-3 && (a[1] - b[1]).abs() < 1e-3);
    }
}

#[test]
fn homography_needs_four_points() {
    let pts = vec![Pt2::new(0.0, 0.0), Pt2::new(1.0, 0.0), Pt2::new(0.0, 1.0)];
    assert!(matches!(
        find_homography(&pts, &pts, &RansacOptions::default()),
        Err(FormMatchError::InvalidInput(_))
    ));
}

use formmatch::{BuilderConfig, FeatureSet, Homography, Keypoint, TemplateBuilder};
use nalgebra::Matrix3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const DIM: usize = 64;

fn random_descriptor(rng: &mut StdRng) -> Vec<f32> {
    let mut d: Vec<f32> = (0..DIM).map(|_| rng.random_range(-1.0..1.0)).collect();
    let norm = d.iter().map(|v| v * v).sum::<f32>().sqrt();
    d.iter_mut().for_each(|v| *v /= norm);
    d
}

fn random_reference(n: usize, seed: u64) -> FeatureSet {
    let mut rng = StdRng::seed_from_u64(seed);
    let kps = (0..n)
        .map(|_| Keypoint::new(rng.random_range(20.0..1950.0), rng.random_range(20.0..1416.0)))
        .collect();
    let rows = (0..n).map(|_| random_descriptor(&mut rng)).collect();
    FeatureSet::from_rows(kps, rows).unwrap()
}

/// Auxiliary sample holding the reference pairs in `range`, moved by `h`,
/// followed by `extra` unrelated features.
fn auxiliary(
    reference: &FeatureSet,
    range: std::ops::Range<usize>,
    h: &Homography,
    extra: usize,
    seed: u64,
) -> FeatureSet {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut kps = Vec::new();
    let mut rows = Vec::new();
    for idx in range.rev() {
        let kp = reference.keypoints()[idx];
        let [x, y] = h.apply([f64::from(kp.x), f64::from(kp.y)]).unwrap();
        kps.push(Keypoint::new(x as f32, y as f32));
        rows.push(reference.descriptor(idx).unwrap().to_vec());
    }
    for _ in 0..extra {
        kps.push(Keypoint::new(rng.random_range(0.0..1970.0), rng.random_range(0.0..1436.0)));
        rows.push(random_descriptor(&mut rng));
    }
    FeatureSet::from_rows(kps, rows).unwrap()
}

fn shifts() -> (Homography, Homography) {
    let h1 = Homography::from_matrix(Matrix3::new(
        1.01, 0.02, 12.0, -0.015, 0.99, 7.5, 1e-6, 2e-6, 1.0,
    ));
    let h2 = Homography::from_matrix(Matrix3::new(
        0.98, -0.01, -20.0, 0.01, 1.02, 4.0, -2e-6, 1e-6, 1.0,
    ));
    (h1, h2)
}

fn expected_order(groups: &[std::ops::Range<usize>], k: usize) -> Vec<usize> {
    groups.iter().cloned().flatten().take(k).collect()
}

#[test]
fn keeps_top_thousand_by_inlier_count() {
    let reference = random_reference(1200, 1);
    let (h1, h2) = shifts();
    let aux = vec![
        auxiliary(&reference, 0..600, &h1, 150, 2),
        auxiliary(&reference, 300..900, &h2, 150, 3),
    ];
    let builder = TemplateBuilder::new(BuilderConfig {
        skip_first_auxiliary: false,
        ..BuilderConfig::default()
    })
    .unwrap();

    let hist = builder.accumulate("recto_a", &reference, &aux).unwrap();
    assert_eq!(hist.count(450), 2);
    assert_eq!(hist.count(10), 1);
    assert_eq!(hist.count(700), 1);
    assert_eq!(hist.count(1000), 0);

    let template = builder.build("recto_a", &reference, &aux).unwrap();
    assert_eq!(template.form_name(), "recto_a");
    assert_eq!(template.len(), 1000);

    // Count 2 first, then count 1 in index order, then count 0.
    let order = expected_order(&[300..600, 0..300, 600..900, 900..1200], 1000);
    assert_eq!(template.features(), &reference.select(&order).unwrap());
}

#[test]
fn first_auxiliary_is_skipped_by_default() {
    let reference = random_reference(1200, 4);
    let (h1, h2) = shifts();
    let aux = vec![
        auxiliary(&reference, 0..600, &h1, 100, 5),
        auxiliary(&reference, 300..900, &h2, 100, 6),
    ];
    let builder = TemplateBuilder::new(BuilderConfig::default()).unwrap();
    let hist = builder.accumulate("form", &reference, &aux).unwrap();
    assert_eq!(hist.total(), 600);

    let template = builder.build("form", &reference, &aux).unwrap();
    let order = expected_order(&[300..900, 0..300, 900..1200], 1000);
    assert_eq!(template.features(), &reference.select(&order).unwrap());
}

#[test]
fn building_twice_gives_identical_templates() {
    let reference = random_reference(400, 8);
    let (h1, h2) = shifts();
    let aux = vec![
        auxiliary(&reference, 0..200, &h1, 50, 9),
        auxiliary(&reference, 100..400, &h2, 50, 10),
        auxiliary(&reference, 50..250, &h1, 50, 11),
    ];
    let builder = TemplateBuilder::new(BuilderConfig {
        top_k: 250,
        ..BuilderConfig::default()
    })
    .unwrap();
    let a = builder.build("form", &reference, &aux).unwrap();
    let b = builder.build("form", &reference, &aux).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.len(), 250);
}

#[test]
fn reference_only_keeps_first_k() {
    let reference = random_reference(1200, 12);
    let builder = TemplateBuilder::new(BuilderConfig::default()).unwrap();
    let hist = builder.accumulate("form", &reference, &[]).unwrap();
    assert_eq!(hist.total(), 0);
    let template = builder.build("form", &reference, &[]).unwrap();
    assert_eq!(template.features(), &reference.truncated(1000));
}

#[test]
fn unusable_samples_contribute_nothing() {
    let reference = random_reference(300, 13);
    let (h1, _) = shifts();
    let aux = vec![
        auxiliary(&reference, 0..3, &h1, 40, 14),
        auxiliary(&reference, 0..0, &h1, 40, 15),
    ];
    let builder = TemplateBuilder::new(BuilderConfig {
        skip_first_auxiliary: false,
        ..BuilderConfig::default()
    })
    .unwrap();
    let hist = builder.accumulate("form", &reference, &aux).unwrap();
    assert_eq!(hist.total(), 0);
}

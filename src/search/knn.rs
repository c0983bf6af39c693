//! Brute-force 2-NN search.

use crate::features::FeatureSet;
use crate::kernel::{DefaultL2, DistanceKernel};
use crate::util::{FormMatchError, FormMatchResult};
#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Pairing `(query_idx, train_idx, distance)` from nearest-neighbor search.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DescriptorMatch {
    /// Index into the query feature set.
    pub query_idx: usize,
    /// Index into the train feature set.
    pub train_idx: usize,
    /// Euclidean descriptor distance.
    pub distance: f32,
}

/// Nearest and second-nearest train descriptors of one query descriptor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KnnPair {
    pub best: DescriptorMatch,
    /// `None` when the train set holds a single descriptor.
    pub second: Option<DescriptorMatch>,
}

impl KnnPair {
    /// Ratio test: `best.distance < ratio * second.distance`.
    ///
    /// A pair without a second neighbor never passes.
    pub fn passes_ratio(&self, ratio: f32) -> bool {
        self.second
            .is_some_and(|second| self.best.distance < ratio * second.distance)
    }
}

fn nearest_two(query_idx: usize, q: &[f32], train: &FeatureSet) -> Option<KnnPair> {
    let mut best: Option<(usize, f32)> = None;
    let mut second: Option<(usize, f32)> = None;
    for (train_idx, t) in train.descriptor_rows().enumerate() {
        let d = DefaultL2::sq_l2(q, t);
        match best {
            Some((_, bd)) if d >= bd => {
                if second.map_or(true, |(_, sd)| d < sd) {
                    second = Some((train_idx, d));
                }
            }
            _ => {
                second = best;
                best = Some((train_idx, d));
            }
        }
    }
    let to_match = |(train_idx, sq): (usize, f32)| DescriptorMatch {
        query_idx,
        train_idx,
        distance: sq.sqrt(),
    };
    best.map(|b| KnnPair {
        best: to_match(b),
        second: second.map(to_match),
    })
}

fn check_dims(query: &FeatureSet, train: &FeatureSet) -> FormMatchResult<()> {
    if query.is_empty() || train.is_empty() || query.dim() == train.dim() {
        return Ok(());
    }
    Err(FormMatchError::DescriptorDimMismatch {
        expected: train.dim(),
        got: query.dim(),
    })
}

/// Finds the two nearest train descriptors for every query descriptor.
///
/// Returns one pair per query, in query order, or nothing when the train set
/// is empty. Equal distances keep the lower train index first.
pub fn knn2(query: &FeatureSet, train: &FeatureSet) -> FormMatchResult<Vec<KnnPair>> {
    check_dims(query, train)?;
    Ok(query
        .descriptor_rows()
        .enumerate()
        .filter_map(|(i, q)| nearest_two(i, q, train))
        .collect())
}

/// Row-parallel variant of [`knn2`]; the output is identical.
#[cfg(feature = "rayon")]
pub fn knn2_par(query: &FeatureSet, train: &FeatureSet) -> FormMatchResult<Vec<KnnPair>> {
    check_dims(query, train)?;
    let rows: Vec<&[f32]> = query.descriptor_rows().collect();
    Ok(rows
        .par_iter()
        .enumerate()
        .filter_map(|(i, q)| nearest_two(i, q, train))
        .collect())
}

/// Keeps the nearest matches of the pairs that pass the ratio test.
pub fn ratio_test(pairs: &[KnnPair], ratio: f32) -> Vec<DescriptorMatch> {
    pairs
        .iter()
        .filter(|pair| pair.passes_ratio(ratio))
        .map(|pair| pair.best)
        .collect()
}

/// 2-NN search followed by the ratio test.
///
/// `parallel` selects the rayon search when the `rayon` feature is enabled
/// and is ignored otherwise.
pub fn good_matches(
    query: &FeatureSet,
    train: &FeatureSet,
    ratio: f32,
    parallel: bool,
) -> FormMatchResult<Vec<DescriptorMatch>> {
    #[cfg(feature = "rayon")]
    let pairs = if parallel {
        knn2_par(query, train)?
    } else {
        knn2(query, train)?
    };
    #[cfg(not(feature = "rayon"))]
    let pairs = {
        let _ = parallel;
        knn2(query, train)?
    };
    Ok(ratio_test(&pairs, ratio))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::Keypoint;

    fn set(rows: &[[f32; 2]]) -> FeatureSet {
        let kps = rows.iter().map(|_| Keypoint::new(0.0, 0.0)).collect();
        FeatureSet::from_rows(kps, rows.iter().map(|r| r.to_vec()).collect()).unwrap()
    }

    #[test]
    fn finds_two_nearest_in_order() {
        let query = set(&[[0.0, 0.0]]);
        let train = set(&[[3.0, 4.0], [1.0, 0.0], [0.0, 2.0]]);
        let pairs = knn2(&query, &train).unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].best.train_idx, 1);
        assert!((pairs[0].best.distance - 1.0).abs() < 1e-6);
        let second = pairs[0].second.unwrap();
        assert_eq!(second.train_idx, 2);
        assert!((second.distance - 2.0).abs() < 1e-6);
    }

    #[test]
    fn equal_distances_keep_lower_index() {
        let query = set(&[[0.0, 0.0]]);
        let train = set(&[[1.0, 0.0], [0.0, 1.0], [-1.0, 0.0]]);
        let pair = knn2(&query, &train).unwrap()[0];
        assert_eq!(pair.best.train_idx, 0);
        assert_eq!(pair.second.unwrap().train_idx, 1);
        // Equal distances are ambiguous and fail the strict ratio test.
        assert!(!pair.passes_ratio(0.99));
    }

    #[test]
    fn ratio_test_keeps_distinctive_matches() {
        let query = set(&[[0.0, 0.0], [5.0, 5.0]]);
        let train = set(&[[0.1, 0.0], [2.0, 0.0], [5.0, 6.0], [5.0, 4.0]]);
        let good = good_matches(&query, &train, 0.75, false).unwrap();
        assert_eq!(good.len(), 1);
        assert_eq!(good[0].query_idx, 0);
        assert_eq!(good[0].train_idx, 0);
    }

    #[test]
    fn single_train_descriptor_never_passes() {
        let query = set(&[[0.0, 0.0]]);
        let train = set(&[[0.0, 0.0]]);
        assert!(good_matches(&query, &train, 0.75, false).unwrap().is_empty());
    }

    #[test]
    fn dimension_mismatch_is_reported() {
        let query = set(&[[0.0, 0.0]]);
        let train = FeatureSet::from_rows(vec![Keypoint::new(0.0, 0.0)], vec![vec![0.0; 3]]).unwrap();
        assert_eq!(
            knn2(&query, &train).unwrap_err(),
            FormMatchError::DescriptorDimMismatch {
                expected: 3,
                got: 2
            }
        );
    }
}

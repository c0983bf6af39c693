//! Inlier histogram and top-K selection.
//!
//! Both steps are pure: the histogram is folded from per-sample inlier
//! sets and the ranking is computed from the finished histogram, so the
//! same inputs always select the same reference indices in the same order.

/// Per reference keypoint, the number of auxiliary samples in which it was
/// a geometric inlier.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InlierHistogram {
    counts: Vec<usize>,
}

impl InlierHistogram {
    /// A histogram over `len` reference keypoints with every count at zero.
    pub fn zeros(len: usize) -> Self {
        Self {
            counts: vec![0; len],
        }
    }

    /// Folds inlier reference indices, one slice per contributing sample.
    ///
    /// Indices outside `0..len` are ignored.
    pub fn accumulate<I, S>(len: usize, samples: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[usize]>,
    {
        samples.into_iter().fold(Self::zeros(len), |mut hist, inliers| {
            for &idx in inliers.as_ref() {
                if let Some(count) = hist.counts.get_mut(idx) {
                    *count += 1;
                }
            }
            hist
        })
    }

    /// Count of reference index `idx` (zero when out of range).
    pub fn count(&self, idx: usize) -> usize {
        self.counts.get(idx).copied().unwrap_or(0)
    }

    /// Counts indexed by reference keypoint.
    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    /// Number of reference keypoints covered.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Returns true if the histogram covers no keypoints.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Sum of all counts.
    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }
}

/// Reference indices ranked by descending count, keeping at most `k`.
///
/// Equal counts keep ascending index order.
pub fn select_top_k(hist: &InlierHistogram, k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..hist.len()).collect();
    // Stable sort: ties stay in index order.
    order.sort_by(|&a, &b| hist.counts[b].cmp(&hist.counts[a]));
    order.truncate(k);
    order
}

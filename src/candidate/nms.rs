//! Non-maximum suppression for response peaks.

use crate::candidate::peak::{sort_peaks_desc, Peak};
use std::collections::HashMap;

/// Applies 2D non-maximum suppression using Chebyshev distance.
///
/// Peaks are sorted by descending score and kept if they are farther than
/// `radius` in Chebyshev distance from all previously kept peaks. At most
/// `limit` peaks are returned. Kept peaks are bucketed on a grid of cell size
/// `radius + 1`, so each candidate only checks its 3x3 cell neighborhood.
pub fn nms_2d(peaks: &mut [Peak], radius: usize, limit: usize) -> Vec<Peak> {
    sort_peaks_desc(peaks);
    if radius == 0 {
        return peaks.iter().copied().take(limit).collect();
    }

    let cell = radius + 1;
    let mut buckets: HashMap<(usize, usize), Vec<Peak>> = HashMap::new();
    let mut kept: Vec<Peak> = Vec::new();

    'outer: for peak in peaks.iter().copied() {
        if kept.len() >= limit {
            break;
        }
        let cx = peak.x / cell;
        let cy = peak.y / cell;
        for ny in cy.saturating_sub(1)..=cy + 1 {
            for nx in cx.saturating_sub(1)..=cx + 1 {
                let Some(bucket) = buckets.get(&(nx, ny)) else {
                    continue;
                };
                for other in bucket {
                    let dx = peak.x.abs_diff(other.x);
                    let dy = peak.y.abs_diff(other.y);
                    if dx.max(dy) <= radius {
                        continue 'outer;
                    }
                }
            }
        }
        buckets.entry((cx, cy)).or_default().push(peak);
        kept.push(peak);
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::nms_2d;
    use crate::candidate::peak::Peak;

    #[test]
    fn suppresses_neighbors_within_radius() {
        let mut peaks = vec![
            Peak { x: 10, y: 10, score: 0.9 },
            Peak { x: 12, y: 11, score: 0.8 },
            Peak { x: 20, y: 10, score: 0.7 },
            Peak { x: 10, y: 13, score: 0.6 },
        ];
        let kept = nms_2d(&mut peaks, 3, usize::MAX);
        let coords: Vec<(usize, usize)> = kept.iter().map(|p| (p.x, p.y)).collect();
        assert_eq!(coords, vec![(10, 10), (20, 10)]);
    }

    #[test]
    fn respects_limit() {
        let mut peaks: Vec<Peak> = (0..10)
            .map(|i| Peak { x: i * 10, y: 0, score: i as f32 })
            .collect();
        let kept = nms_2d(&mut peaks, 2, 3);
        assert_eq!(kept.len(), 3);
        assert_eq!(kept[0].x, 90);
    }
}

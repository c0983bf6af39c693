//! Reference extractor: Harris corners with normalized patch descriptors.
//!
//! Corner strength is the Harris response `det(M) - k * trace(M)^2` of the
//! gradient structure tensor `M`, summed over a square window with integral
//! images. Local maxima above a fraction of the strongest response are
//! thinned with Chebyshev non-maximum suppression. Each surviving corner is
//! described by the cell averages of the patch around it, centered and
//! scaled to unit L2 norm, so descriptors are invariant to affine intensity
//! changes.

use crate::candidate::nms::nms_2d;
use crate::candidate::peak::Peak;
use crate::features::{FeatureExtractor, FeatureSet, Keypoint};
use crate::image::ImageView;
use crate::trace::{trace_event, trace_span};
use crate::util::math::center_and_normalize;
use crate::util::{FormMatchError, FormMatchResult};

const MIN_PATCH_NORM: f32 = 1e-4;

/// Parameters of the [`PatchExtractor`].
#[derive(Clone, Debug, PartialEq)]
pub struct PatchExtractorConfig {
    /// Maximum number of keypoints kept per image.
    pub max_keypoints: usize,
    /// Half-size of the structure tensor window.
    pub window_radius: usize,
    /// Harris sensitivity constant.
    pub harris_k: f32,
    /// Minimum response as a fraction of the strongest response.
    pub rel_threshold: f32,
    /// Chebyshev suppression radius between kept corners.
    pub nms_radius: usize,
    /// Half-size of the descriptor patch.
    pub patch_radius: usize,
    /// Cells per patch side; the descriptor dimension is `grid * grid`.
    pub grid: usize,
}

impl Default for PatchExtractorConfig {
    fn default() -> Self {
        Self {
            max_keypoints: 2000,
            window_radius: 2,
            harris_k: 0.04,
            rel_threshold: 0.01,
            nms_radius: 4,
            patch_radius: 8,
            grid: 8,
        }
    }
}

/// Deterministic corner detector and patch descriptor.
#[derive(Clone, Debug)]
pub struct PatchExtractor {
    cfg: PatchExtractorConfig,
}

impl PatchExtractor {
    /// Validates the configuration and builds the extractor.
    pub fn new(cfg: PatchExtractorConfig) -> FormMatchResult<Self> {
        if cfg.grid == 0 || cfg.patch_radius == 0 {
            return Err(FormMatchError::InvalidInput(
                "patch_radius and grid must be > 0",
            ));
        }
        if (2 * cfg.patch_radius) % cfg.grid != 0 {
            return Err(FormMatchError::InvalidInput(
                "patch side (2 * patch_radius) must be divisible by grid",
            ));
        }
        if cfg.window_radius == 0 {
            return Err(FormMatchError::InvalidInput("window_radius must be > 0"));
        }
        if !(cfg.rel_threshold >= 0.0 && cfg.rel_threshold.is_finite()) {
            return Err(FormMatchError::InvalidInput(
                "rel_threshold must be finite and non-negative",
            ));
        }
        Ok(Self { cfg })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &PatchExtractorConfig {
        &self.cfg
    }

    /// Descriptor dimension produced by this extractor.
    pub fn dim(&self) -> usize {
        self.cfg.grid * self.cfg.grid
    }

    fn border(&self) -> usize {
        self.cfg.patch_radius.max(self.cfg.window_radius + 1)
    }

    fn harris_response(&self, image: ImageView<'_, f32>) -> FormMatchResult<Vec<f32>> {
        let width = image.width();
        let height = image.height();
        // Integral images of Ix², Iy² and IxIy with a zero first row/column.
        let iw = width + 1;
        let mut sxx = vec![0.0f64; iw * (height + 1)];
        let mut syy = vec![0.0f64; iw * (height + 1)];
        let mut sxy = vec![0.0f64; iw * (height + 1)];

        let row_of = |y: usize| {
            image.row(y).ok_or(FormMatchError::BufferTooSmall {
                needed: y * image.stride() + width,
                got: image.as_slice().len(),
            })
        };

        for y in 0..height {
            let row = row_of(y)?;
            let up = row_of(y.saturating_sub(1))?;
            let down = row_of((y + 1).min(height - 1))?;
            let (mut acc_xx, mut acc_yy, mut acc_xy) = (0.0f64, 0.0f64, 0.0f64);
            for x in 0..width {
                let (gx, gy) = if x == 0 || y == 0 || x + 1 == width || y + 1 == height {
                    (0.0, 0.0)
                } else {
                    (
                        0.5 * f64::from(row[x + 1] - row[x - 1]),
                        0.5 * f64::from(down[x] - up[x]),
                    )
                };
                acc_xx += gx * gx;
                acc_yy += gy * gy;
                acc_xy += gx * gy;
                let idx = (y + 1) * iw + x + 1;
                sxx[idx] = sxx[idx - iw] + acc_xx;
                syy[idx] = syy[idx - iw] + acc_yy;
                sxy[idx] = sxy[idx - iw] + acc_xy;
            }
        }

        let r = self.cfg.window_radius;
        let k = f64::from(self.cfg.harris_k);
        let box_sum = |s: &[f64], x0: usize, y0: usize, x1: usize, y1: usize| {
            s[y1 * iw + x1] - s[y0 * iw + x1] - s[y1 * iw + x0] + s[y0 * iw + x0]
        };

        let mut response = vec![0.0f32; width * height];
        if width <= 2 * r + 2 || height <= 2 * r + 2 {
            return Ok(response);
        }
        for y in (r + 1)..(height - r - 1) {
            for x in (r + 1)..(width - r - 1) {
                let (x0, y0, x1, y1) = (x - r, y - r, x + r + 1, y + r + 1);
                let a = box_sum(&sxx, x0, y0, x1, y1);
                let b = box_sum(&syy, x0, y0, x1, y1);
                let c = box_sum(&sxy, x0, y0, x1, y1);
                let det = a * b - c * c;
                let trace = a + b;
                response[y * width + x] = (det - k * trace * trace) as f32;
            }
        }
        Ok(response)
    }

    fn local_maxima(&self, response: &[f32], width: usize, height: usize) -> Vec<Peak> {
        let border = self.border();
        if width <= 2 * border || height <= 2 * border {
            return Vec::new();
        }
        let max_response = response.iter().copied().fold(0.0f32, f32::max);
        if max_response <= 0.0 {
            return Vec::new();
        }
        let threshold = max_response * self.cfg.rel_threshold;

        let mut peaks = Vec::new();
        for y in border..(height - border) {
            for x in border..(width - border) {
                let v = response[y * width + x];
                if v <= threshold || v <= 0.0 {
                    continue;
                }
                let mut is_max = true;
                'nbhd: for ny in (y - 1)..=(y + 1) {
                    for nx in (x - 1)..=(x + 1) {
                        if (nx, ny) != (x, y) && response[ny * width + nx] > v {
                            is_max = false;
                            break 'nbhd;
                        }
                    }
                }
                if is_max {
                    peaks.push(Peak { x, y, score: v });
                }
            }
        }
        peaks
    }

    fn describe(&self, image: ImageView<'_, f32>, x: usize, y: usize, out: &mut Vec<f32>) -> bool {
        let side = 2 * self.cfg.patch_radius;
        let grid = self.cfg.grid;
        let cell = side / grid;
        let x0 = x - self.cfg.patch_radius;
        let y0 = y - self.cfg.patch_radius;
        let Ok(patch) = image.roi(x0, y0, side, side) else {
            return false;
        };

        let start = out.len();
        out.resize(start + grid * grid, 0.0);
        let cells = &mut out[start..];
        let inv_area = 1.0 / (cell * cell) as f32;
        for py in 0..side {
            let Some(row) = patch.row(py) else {
                out.truncate(start);
                return false;
            };
            let cy = py / cell;
            for (px, &v) in row.iter().enumerate() {
                cells[cy * grid + px / cell] += v * inv_area;
            }
        }

        if !center_and_normalize(cells, MIN_PATCH_NORM) {
            out.truncate(start);
            return false;
        }
        true
    }
}

impl FeatureExtractor for PatchExtractor {
    fn extract(&self, image: ImageView<'_, f32>) -> FormMatchResult<FeatureSet> {
        let width = image.width();
        let height = image.height();
        let _span = trace_span!("patch_extract", width = width, height = height).entered();

        let response = self.harris_response(image)?;
        let mut peaks = self.local_maxima(&response, width, height);
        let kept = nms_2d(&mut peaks, self.cfg.nms_radius, self.cfg.max_keypoints);

        let mut keypoints = Vec::with_capacity(kept.len());
        let mut descriptors = Vec::with_capacity(kept.len() * self.dim());
        for peak in kept {
            if self.describe(image, peak.x, peak.y, &mut descriptors) {
                keypoints.push(Keypoint::new(peak.x as f32, peak.y as f32));
            }
        }

        trace_event!("patch_keypoints", count = keypoints.len());
        FeatureSet::new(keypoints, descriptors, self.dim())
    }
}

#[cfg(test)]
mod tests {
    use super::{PatchExtractor, PatchExtractorConfig};
    use crate::features::FeatureExtractor;
    use crate::image::OwnedImage;

    fn blocks_image(width: usize, height: usize) -> OwnedImage {
        let mut data = vec![0.1f32; width * height];
        let rects = [(20, 20, 18, 14), (60, 30, 10, 22), (30, 60, 25, 9), (75, 70, 12, 12)];
        for (i, &(x0, y0, w, h)) in rects.iter().enumerate() {
            for y in y0..y0 + h {
                for x in x0..x0 + w {
                    data[y * width + x] = 0.4 + 0.15 * i as f32;
                }
            }
        }
        OwnedImage::new(data, width, height).unwrap()
    }

    #[test]
    fn detects_rectangle_corners() {
        let img = blocks_image(110, 100);
        let extractor = PatchExtractor::new(PatchExtractorConfig::default()).unwrap();
        let set = extractor.extract(img.view()).unwrap();
        assert!(set.len() >= 8, "expected corners, got {}", set.len());
        assert_eq!(set.descriptors().len(), set.len() * extractor.dim());
        for row in set.descriptor_rows() {
            let norm: f32 = row.iter().map(|v| v * v).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-4);
        }
        // A corner of the first block sits near (20, 20).
        assert!(set
            .keypoints()
            .iter()
            .any(|kp| (kp.x - 20.0).abs() <= 2.0 && (kp.y - 20.0).abs() <= 2.0));
    }

    #[test]
    fn flat_image_has_no_keypoints() {
        let img = OwnedImage::filled(64, 64, 0.5).unwrap();
        let extractor = PatchExtractor::new(PatchExtractorConfig::default()).unwrap();
        assert!(extractor.extract(img.view()).unwrap().is_empty());
    }

    #[test]
    fn extraction_is_deterministic() {
        let img = blocks_image(110, 100);
        let extractor = PatchExtractor::new(PatchExtractorConfig::default()).unwrap();
        let a = extractor.extract(img.view()).unwrap();
        let b = extractor.extract(img.view()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_indivisible_grid() {
        let cfg = PatchExtractorConfig {
            patch_radius: 5,
            grid: 4,
            ..PatchExtractorConfig::default()
        };
        assert!(PatchExtractor::new(cfg).is_err());
    }
}

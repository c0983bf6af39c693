//! Consensus template building from multiple training scans.
//!
//! The reference scan's descriptors are matched against every auxiliary
//! scan, a RANSAC homography separates geometric inliers from chance
//! matches, and the reference keypoints that are inliers most often are
//! retained. Keypoints on printed form structure survive; keypoints on
//! handwriting or stamps that differ between samples do not.

use super::consensus::{select_top_k, InlierHistogram};
use super::FormTemplate;
use crate::features::{FeatureExtractor, FeatureSet};
use crate::geometry::{find_homography, Pt2, RansacOptions, MIN_CORRESPONDENCES};
use crate::image::resize::{resize_bilinear, WorkingSize};
use crate::image::ImageView;
use crate::search::good_matches;
use crate::trace::{trace_event, trace_span, trace_warn};
use crate::util::{FormMatchError, FormMatchResult};

/// Template builder parameters.
#[derive(Clone, Debug)]
pub struct BuilderConfig {
    /// Resolution every training image is resized to before extraction.
    pub working_size: WorkingSize,
    /// Maximum number of retained reference pairs.
    pub top_k: usize,
    /// Ratio-test threshold.
    pub ratio: f32,
    /// Leave the first auxiliary sample out of the histogram.
    pub skip_first_auxiliary: bool,
    /// RANSAC parameters for the per-sample homography.
    pub ransac: RansacOptions,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            working_size: WorkingSize::default(),
            top_k: 1000,
            ratio: 0.75,
            skip_first_auxiliary: true,
            ransac: RansacOptions::default(),
        }
    }
}

/// Builds [`FormTemplate`]s from a reference and auxiliary samples.
#[derive(Clone, Debug)]
pub struct TemplateBuilder {
    cfg: BuilderConfig,
}

impl TemplateBuilder {
    /// Validates the configuration.
    pub fn new(cfg: BuilderConfig) -> FormMatchResult<Self> {
        if cfg.top_k == 0 {
            return Err(FormMatchError::InvalidInput("top_k must be > 0"));
        }
        if !(cfg.ratio > 0.0 && cfg.ratio <= 1.0) {
            return Err(FormMatchError::InvalidInput("ratio must be in (0, 1]"));
        }
        if !(cfg.ransac.thresh > 0.0) {
            return Err(FormMatchError::InvalidInput(
                "ransac threshold must be positive",
            ));
        }
        Ok(Self { cfg })
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.cfg
    }

    /// Counts, per reference keypoint, the auxiliary samples in which it was
    /// a RANSAC inlier.
    ///
    /// Samples with fewer than four good matches, or without a consensus
    /// homography, contribute nothing. With no usable samples the histogram
    /// is all zeros.
    pub fn accumulate(
        &self,
        form_name: &str,
        reference: &FeatureSet,
        auxiliary: &[FeatureSet],
    ) -> FormMatchResult<InlierHistogram> {
        let skip = usize::from(self.cfg.skip_first_auxiliary);
        let mut per_sample = Vec::with_capacity(auxiliary.len());
        for (sample, aux) in auxiliary.iter().enumerate().skip(skip) {
            if let Some(inliers) = self.sample_inliers(form_name, sample, reference, aux)? {
                per_sample.push(inliers);
            }
        }
        Ok(InlierHistogram::accumulate(reference.len(), per_sample))
    }

    /// Builds the template of `form_name` from already extracted features.
    ///
    /// The template keeps at most `top_k` reference pairs ordered by
    /// descending inlier count, ties by reference index. Without auxiliary
    /// samples this is the reference truncated to `top_k`.
    pub fn build(
        &self,
        form_name: &str,
        reference: &FeatureSet,
        auxiliary: &[FeatureSet],
    ) -> FormMatchResult<FormTemplate> {
        let _span = trace_span!("template_build", form = form_name, samples = auxiliary.len())
            .entered();
        if reference.is_empty() {
            return Err(FormMatchError::ExtractionFailure {
                reason: format!("form {form_name}: reference image has no keypoints"),
            });
        }

        let hist = self.accumulate(form_name, reference, auxiliary)?;
        let order = select_top_k(&hist, self.cfg.top_k);
        let features = reference.select(&order)?;

        trace_event!(
            "template_built",
            kept = features.len(),
            inlier_votes = hist.total()
        );
        Ok(FormTemplate::new(form_name, features))
    }

    /// Resizes the images to the working resolution, extracts features and
    /// builds the template.
    pub fn build_from_images<E: FeatureExtractor>(
        &self,
        extractor: &E,
        form_name: &str,
        reference: ImageView<'_, f32>,
        auxiliary: &[ImageView<'_, f32>],
    ) -> FormMatchResult<FormTemplate> {
        let extract = |view: ImageView<'_, f32>| -> FormMatchResult<FeatureSet> {
            let resized = resize_bilinear(view, self.cfg.working_size)?;
            extractor.extract(resized.view())
        };
        let reference = extract(reference)?;
        let auxiliary = auxiliary
            .iter()
            .map(|view| extract(*view))
            .collect::<FormMatchResult<Vec<_>>>()?;
        self.build(form_name, &reference, &auxiliary)
    }

    fn sample_inliers(
        &self,
        form_name: &str,
        sample: usize,
        reference: &FeatureSet,
        aux: &FeatureSet,
    ) -> FormMatchResult<Option<Vec<usize>>> {
        let _span = trace_span!("consensus_sample", form = form_name, sample = sample).entered();
        let good = good_matches(reference, aux, self.cfg.ratio, false)?;
        if good.len() < MIN_CORRESPONDENCES {
            trace_warn!(
                "auxiliary_sample_skipped",
                form = form_name,
                sample = sample,
                good_matches = good.len()
            );
            return Ok(None);
        }

        let (src, dst): (Vec<Pt2>, Vec<Pt2>) = good
            .iter()
            .map(|m| {
                let r = reference.keypoints()[m.query_idx];
                let a = aux.keypoints()[m.train_idx];
                (
                    Pt2::new(f64::from(r.x), f64::from(r.y)),
                    Pt2::new(f64::from(a.x), f64::from(a.y)),
                )
            })
            .unzip();

        let fit = match find_homography(&src, &dst, &self.cfg.ransac) {
            Ok(fit) => fit,
            Err(err) => {
                let reason = err.to_string();
                trace_warn!(
                    "auxiliary_sample_skipped",
                    form = form_name,
                    sample = sample,
                    reason = reason.as_str()
                );
                return Ok(None);
            }
        };

        let inliers: Vec<usize> = good
            .iter()
            .zip(&fit.inlier_mask)
            .filter(|(_, inlier)| **inlier)
            .map(|(m, _)| m.query_idx)
            .collect();
        trace_event!(
            "consensus_sample_done",
            good_matches = good.len(),
            inliers = inliers.len()
        );
        Ok(Some(inliers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::Keypoint;

    fn descriptor(i: usize) -> Vec<f32> {
        let mut d = vec![0.0f32; 8];
        d[i % 8] = 1.0 + (i / 8) as f32;
        d[(i / 8) % 8] += 0.5;
        d
    }

    fn reference(n: usize) -> FeatureSet {
        let kps = (0..n)
            .map(|i| Keypoint::new((i % 10) as f32 * 40.0 + 10.0, (i / 10) as f32 * 35.0 + 5.0))
            .collect();
        FeatureSet::from_rows(kps, (0..n).map(descriptor).collect()).unwrap()
    }

    #[test]
    fn rejects_zero_top_k() {
        let cfg = BuilderConfig {
            top_k: 0,
            ..BuilderConfig::default()
        };
        assert!(TemplateBuilder::new(cfg).is_err());
    }

    #[test]
    fn reference_only_is_truncated() {
        let builder = TemplateBuilder::new(BuilderConfig {
            top_k: 5,
            ..BuilderConfig::default()
        })
        .unwrap();
        let reference = reference(12);
        let hist = builder.accumulate("form", &reference, &[]).unwrap();
        assert_eq!(hist.total(), 0);
        let template = builder.build("form", &reference, &[]).unwrap();
        assert_eq!(template.features(), &reference.truncated(5));
    }

    #[test]
    fn empty_reference_is_an_extraction_failure() {
        let builder = TemplateBuilder::new(BuilderConfig::default()).unwrap();
        let err = builder.build("form", &FeatureSet::empty(8), &[]).unwrap_err();
        assert!(matches!(err, FormMatchError::ExtractionFailure { .. }));
    }

    #[test]
    fn sample_with_too_few_matches_is_skipped() {
        let builder = TemplateBuilder::new(BuilderConfig {
            skip_first_auxiliary: false,
            ..BuilderConfig::default()
        })
        .unwrap();
        let reference = reference(20);
        let aux = reference.select(&[0, 1, 2]).unwrap();
        let hist = builder.accumulate("form", &reference, &[aux]).unwrap();
        assert_eq!(hist.total(), 0);
    }
}

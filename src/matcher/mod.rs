//! Form recognition against a template store.
//!
//! The scan's descriptors are matched against every template; the template
//! with the most ratio-test survivors wins, a RANSAC homography maps the
//! scan onto it, and the scan is warped into the template frame.

use crate::features::{FeatureExtractor, FeatureSet, Keypoint};
use crate::geometry::{find_homography, Homography, Pt2, RansacOptions, MIN_CORRESPONDENCES};
use crate::image::resize::{resize_bilinear, WorkingSize};
use crate::image::warp::warp_perspective;
use crate::image::{ImageView, OwnedImage};
use crate::search::{good_matches, DescriptorMatch};
use crate::template::{FormTemplate, TemplateStore};
use crate::trace::{trace_event, trace_span};
use crate::util::{FormMatchError, FormMatchResult};

/// Recognition parameters.
#[derive(Clone, Debug)]
pub struct MatcherConfig {
    /// Resolution scans are resized to and rectified into.
    pub working_size: WorkingSize,
    /// Ratio-test threshold.
    pub ratio: f32,
    /// Minimum good matches on the winning template.
    pub min_matches: usize,
    /// RANSAC parameters for the scan-to-template homography.
    pub ransac: RansacOptions,
    /// Parallelize the descriptor search (requires the `rayon` feature).
    pub parallel: bool,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            working_size: WorkingSize::default(),
            ratio: 0.70,
            min_matches: MIN_CORRESPONDENCES,
            ransac: RansacOptions::default(),
            parallel: false,
        }
    }
}

/// Good-match count of one template.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormScore {
    pub form_name: String,
    pub good_matches: usize,
}

/// Result of recognizing one scan.
#[derive(Clone, Debug)]
pub struct Recognition {
    /// Predicted form identifier.
    pub form_name: String,
    /// Maps scan pixel coordinates to template pixel coordinates.
    pub homography: Homography,
    /// RANSAC inlier flags, one per good match on the winning template.
    pub inlier_mask: Vec<bool>,
    /// Keypoints extracted from the scan.
    pub keypoints: Vec<Keypoint>,
    /// Scan warped into the template frame at the working resolution.
    pub rectified: OwnedImage,
    /// Good-match counts of every template, in store order.
    pub scores: Vec<FormScore>,
}

impl Recognition {
    pub fn inlier_count(&self) -> usize {
        self.inlier_mask.iter().filter(|&&inlier| inlier).count()
    }
}

/// Winning template and its good matches.
struct Selection<'s> {
    template: &'s FormTemplate,
    matches: Vec<DescriptorMatch>,
    scores: Vec<FormScore>,
}

/// Recognizes scans against a borrowed [`TemplateStore`].
#[derive(Clone, Debug)]
pub struct FormMatcher<'s> {
    store: &'s TemplateStore,
    cfg: MatcherConfig,
}

impl<'s> FormMatcher<'s> {
    pub fn new(store: &'s TemplateStore, cfg: MatcherConfig) -> FormMatchResult<Self> {
        if !(cfg.ratio > 0.0 && cfg.ratio <= 1.0) {
            return Err(FormMatchError::InvalidInput("ratio must be in (0, 1]"));
        }
        if cfg.min_matches < MIN_CORRESPONDENCES {
            return Err(FormMatchError::InvalidInput(
                "min_matches must be at least 4",
            ));
        }
        Ok(Self { store, cfg })
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.cfg
    }

    pub fn store(&self) -> &'s TemplateStore {
        self.store
    }

    /// Good-match counts of every template, in store order.
    pub fn score(&self, scan: &FeatureSet) -> FormMatchResult<Vec<FormScore>> {
        Ok(self.select(scan)?.scores)
    }

    fn select(&self, scan: &FeatureSet) -> FormMatchResult<Selection<'s>> {
        if self.store.is_empty() {
            return Err(FormMatchError::NoTemplatesAvailable);
        }
        if scan.is_empty() {
            return Err(FormMatchError::ExtractionFailure {
                reason: "scan has no keypoints".to_owned(),
            });
        }

        let mut best: Option<(&'s FormTemplate, Vec<DescriptorMatch>)> = None;
        let mut scores = Vec::with_capacity(self.store.len());
        for template in self.store.iter() {
            let matches = good_matches(scan, template.features(), self.cfg.ratio, self.cfg.parallel)?;
            scores.push(FormScore {
                form_name: template.form_name().to_owned(),
                good_matches: matches.len(),
            });
            // Strictly greater: ties keep the earlier template.
            if best.as_ref().map_or(true, |(_, b)| matches.len() > b.len()) {
                best = Some((template, matches));
            }
        }

        let (template, matches) = best.ok_or(FormMatchError::NoTemplatesAvailable)?;
        Ok(Selection {
            template,
            matches,
            scores,
        })
    }

    /// Recognizes a scan from already extracted features.
    ///
    /// `image` is the image the features were extracted from; it is warped
    /// into the winning template's frame.
    pub fn recognize_features(
        &self,
        scan: &FeatureSet,
        image: ImageView<'_, f32>,
    ) -> FormMatchResult<Recognition> {
        let _span = trace_span!("recognize", keypoints = scan.len()).entered();
        let Selection {
            template,
            matches,
            scores,
        } = self.select(scan)?;

        if matches.len() < self.cfg.min_matches {
            return Err(FormMatchError::InsufficientMatches {
                form: template.form_name().to_owned(),
                found: matches.len(),
                required: self.cfg.min_matches,
            });
        }

        let tpl_kps = template.features().keypoints();
        let (src, dst): (Vec<Pt2>, Vec<Pt2>) = matches
            .iter()
            .map(|m| {
                let s = scan.keypoints()[m.query_idx];
                let t = tpl_kps[m.train_idx];
                (
                    Pt2::new(f64::from(s.x), f64::from(s.y)),
                    Pt2::new(f64::from(t.x), f64::from(t.y)),
                )
            })
            .unzip();
        let fit = find_homography(&src, &dst, &self.cfg.ransac)?;
        let rectified = warp_perspective(image, &fit.homography, self.cfg.working_size, 0.0)?;

        trace_event!(
            "recognized",
            form = template.form_name(),
            good_matches = matches.len(),
            inliers = fit.inlier_count()
        );
        Ok(Recognition {
            form_name: template.form_name().to_owned(),
            homography: fit.homography,
            inlier_mask: fit.inlier_mask,
            keypoints: scan.keypoints().to_vec(),
            rectified,
            scores,
        })
    }

    /// Resizes `image` to the working resolution, extracts its features and
    /// recognizes it.
    pub fn recognize<E: FeatureExtractor>(
        &self,
        extractor: &E,
        image: ImageView<'_, f32>,
    ) -> FormMatchResult<Recognition> {
        let working = resize_bilinear(image, self.cfg.working_size)?;
        let scan = extractor.extract(working.view())?;
        self.recognize_features(&scan, working.view())
    }
}

//! FormMatch identifies which known paper-form layout a scan shows and
//! rectifies the scan into that layout's frame.
//!
//! Training builds one [`FormTemplate`] per form from a reference scan and
//! several filled-in samples, keeping the reference keypoints that are
//! geometric inliers most often. Recognition matches a scan against every
//! template in a [`TemplateStore`], picks the template with the most good
//! matches, and warps the scan through a RANSAC homography. Feature
//! extraction is pluggable through [`FeatureExtractor`]; the optional
//! `rayon`, `simd`, `image-io` and `tracing` features add parallel search,
//! vectorized distances, filesystem pipelines and spans.

mod candidate;
pub mod features;
pub mod fields;
pub mod geometry;
pub mod image;
pub mod kernel;
pub mod lowlevel;
pub mod matcher;
#[cfg(feature = "image-io")]
pub mod pipeline;
pub mod search;
pub mod template;
mod trace;
pub mod util;

pub use features::{FeatureExtractor, FeatureSet, Keypoint, PatchExtractor, PatchExtractorConfig};
pub use fields::{read_fields, FieldBox, FieldLayout, OcrEngine, TextRecognizer};
pub use geometry::{find_homography, Homography, HomographyFit, RansacOptions};
pub use image::resize::WorkingSize;
pub use image::{ImageView, OwnedImage};
pub use matcher::{FormMatcher, FormScore, MatcherConfig, Recognition};
pub use search::{good_matches, DescriptorMatch};
pub use template::{BuilderConfig, FormTemplate, TemplateBuilder, TemplateStore};
pub use util::{FormMatchError, FormMatchResult};

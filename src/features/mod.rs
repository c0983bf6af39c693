//! Keypoints, descriptors and the feature-extractor boundary.
//!
//! A [`FeatureSet`] holds an ordered keypoint set and an index-aligned
//! descriptor set of fixed dimension. The index is the implicit identifier
//! used by matches, inlier histograms and templates.

mod patch;

pub use patch::{PatchExtractor, PatchExtractorConfig};

use crate::image::ImageView;
use crate::util::{FormMatchError, FormMatchResult};

/// Detected salient location in pixel coordinates of the working image.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Keypoints with index-aligned, row-major descriptors.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureSet {
    keypoints: Vec<Keypoint>,
    descriptors: Vec<f32>,
    dim: usize,
}

impl FeatureSet {
    /// Creates a feature set from keypoints and a flat descriptor buffer.
    ///
    /// `descriptors` must hold exactly `keypoints.len() * dim` values.
    pub fn new(keypoints: Vec<Keypoint>, descriptors: Vec<f32>, dim: usize) -> FormMatchResult<Self> {
        if dim == 0 {
            return Err(FormMatchError::InvalidInput("descriptor dimension must be > 0"));
        }
        if descriptors.len() % dim != 0 {
            return Err(FormMatchError::InvalidInput(
                "descriptor buffer is not a multiple of the dimension",
            ));
        }
        let rows = descriptors.len() / dim;
        if rows != keypoints.len() {
            return Err(FormMatchError::DescriptorLengthMismatch {
                keypoints: keypoints.len(),
                descriptors: rows,
            });
        }
        Ok(Self {
            keypoints,
            descriptors,
            dim,
        })
    }

    /// Creates a feature set from one descriptor vector per keypoint.
    pub fn from_rows(keypoints: Vec<Keypoint>, rows: Vec<Vec<f32>>) -> FormMatchResult<Self> {
        if rows.len() != keypoints.len() {
            return Err(FormMatchError::DescriptorLengthMismatch {
                keypoints: keypoints.len(),
                descriptors: rows.len(),
            });
        }
        let Some(dim) = rows.first().map(Vec::len) else {
            return Ok(Self::empty(1));
        };
        if rows.iter().any(|r| r.len() != dim) {
            return Err(FormMatchError::InvalidInput("descriptor rows differ in length"));
        }
        Self::new(keypoints, rows.concat(), dim)
    }

    /// An empty set with the given descriptor dimension.
    pub fn empty(dim: usize) -> Self {
        Self {
            keypoints: Vec::new(),
            descriptors: Vec::new(),
            dim: dim.max(1),
        }
    }

    /// Number of keypoint/descriptor pairs.
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    /// Returns true if the set holds no keypoints.
    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    /// Descriptor dimension.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Ordered keypoints.
    pub fn keypoints(&self) -> &[Keypoint] {
        &self.keypoints
    }

    /// Flat row-major descriptor buffer.
    pub fn descriptors(&self) -> &[f32] {
        &self.descriptors
    }

    /// Descriptor of keypoint `idx`.
    pub fn descriptor(&self, idx: usize) -> Option<&[f32]> {
        let start = idx.checked_mul(self.dim)?;
        self.descriptors.get(start..start + self.dim)
    }

    /// Iterates descriptor rows in keypoint order.
    pub fn descriptor_rows(&self) -> std::slice::ChunksExact<'_, f32> {
        self.descriptors.chunks_exact(self.dim)
    }

    /// Gathers the pairs at `indices`, in that order.
    pub fn select(&self, indices: &[usize]) -> FormMatchResult<Self> {
        let mut keypoints = Vec::with_capacity(indices.len());
        let mut descriptors = Vec::with_capacity(indices.len() * self.dim);
        for &idx in indices {
            let kp = self
                .keypoints
                .get(idx)
                .ok_or(FormMatchError::InvalidInput("feature index out of range"))?;
            let desc = self
                .descriptor(idx)
                .ok_or(FormMatchError::InvalidInput("feature index out of range"))?;
            keypoints.push(*kp);
            descriptors.extend_from_slice(desc);
        }
        Self::new(keypoints, descriptors, self.dim)
    }

    /// The first `k` pairs (or all of them when fewer are available).
    pub fn truncated(&self, k: usize) -> Self {
        let n = k.min(self.len());
        Self {
            keypoints: self.keypoints[..n].to_vec(),
            descriptors: self.descriptors[..n * self.dim].to_vec(),
            dim: self.dim,
        }
    }
}

/// Converts a normalized image into keypoints and descriptors.
///
/// Implementations receive a single-channel image at the working resolution
/// with intensities in `[0, 1]`, and must be deterministic. A handle is built
/// once and shared by reference with the builder, the matcher and the
/// pipeline.
pub trait FeatureExtractor {
    /// Extracts an ordered keypoint set and its aligned descriptors.
    fn extract(&self, image: ImageView<'_, f32>) -> FormMatchResult<FeatureSet>;
}

impl<T: FeatureExtractor + ?Sized> FeatureExtractor for &T {
    fn extract(&self, image: ImageView<'_, f32>) -> FormMatchResult<FeatureSet> {
        (**self).extract(image)
    }
}

//! Error types for formmatch.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias for formmatch operations.
pub type FormMatchResult<T> = std::result::Result<T, FormMatchError>;

/// Errors that can occur while building templates or recognizing scans.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum FormMatchError {
    /// The input data or parameters are invalid.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// Image dimensions are zero or overflow.
    #[error("invalid dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },
    /// The stride is smaller than the row width.
    #[error("invalid stride {stride} for width {width}")]
    InvalidStride { width: usize, stride: usize },
    /// The backing buffer cannot hold the requested view.
    #[error("buffer too small: needed {needed}, got {got}")]
    BufferTooSmall { needed: usize, got: usize },
    /// Keypoints and descriptors are not index-aligned.
    #[error("{descriptors} descriptors for {keypoints} keypoints")]
    DescriptorLengthMismatch { keypoints: usize, descriptors: usize },
    /// Two descriptor sets have different dimensions.
    #[error("descriptor dimension mismatch: expected {expected}, got {got}")]
    DescriptorDimMismatch { expected: usize, got: usize },
    /// The extractor produced empty or unusable output.
    #[error("feature extraction failed: {reason}")]
    ExtractionFailure { reason: String },
    /// Too few good correspondences to fit a homography.
    #[error("form {form}: {found} good matches, at least {required} required")]
    InsufficientMatches {
        form: String,
        found: usize,
        required: usize,
    },
    /// The template store holds no templates.
    #[error("no templates available")]
    NoTemplatesAvailable,
    /// RANSAC found no consistent projective model.
    #[error("degenerate homography: {reason}")]
    HomographyDegenerate { reason: &'static str },
    /// A training folder has no image named after the folder.
    #[error("form {form}: no reference image in {}", folder.display())]
    MissingReferenceImage { form: String, folder: PathBuf },
    /// A front/back pair resolved to forms of the wrong side.
    #[error("expected a {expected} form, got {form}")]
    SideMismatch { expected: &'static str, form: String },
    /// The OCR engine tag is not one of the supported engines.
    #[error("unknown OCR engine: {0}")]
    UnknownOcrEngine(String),
    /// A field layout could not be parsed.
    #[error("invalid field layout: {reason}")]
    InvalidLayout { reason: String },
    /// Image decoding or encoding failed.
    #[error("image io error: {reason}")]
    ImageIo { reason: String },
    /// Filesystem access failed.
    #[error("io error at {}: {reason}", path.display())]
    Io { path: PathBuf, reason: String },
    /// A persisted array could not be encoded or decoded.
    #[error("serialization error at {}: {reason}", path.display())]
    Serialization { path: PathBuf, reason: String },
}

impl FormMatchError {
    pub(crate) fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            reason: err.to_string(),
        }
    }
}

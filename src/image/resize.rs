//! Resizing to the fixed working resolution.
//!
//! Every scan is brought to one working resolution before feature extraction
//! so that keypoint coordinates are comparable across images without any
//! per-image scale correction.

use crate::image::{ImageView, OwnedImage};
use crate::util::{FormMatchError, FormMatchResult};

/// Target width and height in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkingSize {
    pub width: usize,
    pub height: usize,
}

impl WorkingSize {
    /// Creates a working size, rejecting zero extents.
    pub fn new(width: usize, height: usize) -> FormMatchResult<Self> {
        if width == 0 || height == 0 {
            return Err(FormMatchError::InvalidDimensions { width, height });
        }
        Ok(Self { width, height })
    }
}

impl Default for WorkingSize {
    fn default() -> Self {
        Self {
            width: 1970,
            height: 1436,
        }
    }
}

/// Resizes an image with bilinear interpolation.
///
/// Destination pixel centers are mapped to the source with the half-pixel
/// convention `src = (dst + 0.5) * scale - 0.5`, clamped to the source
/// bounds. Resizing to the source dimensions returns an exact copy.
pub fn resize_bilinear(src: ImageView<'_, f32>, size: WorkingSize) -> FormMatchResult<OwnedImage> {
    let WorkingSize { width, height } = size;
    if width == 0 || height == 0 {
        return Err(FormMatchError::InvalidDimensions { width, height });
    }
    if width == src.width() && height == src.height() {
        return OwnedImage::from_view(src);
    }

    let scale_x = src.width() as f32 / width as f32;
    let scale_y = src.height() as f32 / height as f32;
    let max_x = src.width() as f32 - 1.0;
    let max_y = src.height() as f32 - 1.0;

    let mut out = OwnedImage::filled(width, height, 0.0)?;
    let dst = out.data_mut();
    for y in 0..height {
        let sy = ((y as f32 + 0.5) * scale_y - 0.5).clamp(0.0, max_y);
        for x in 0..width {
            let sx = ((x as f32 + 0.5) * scale_x - 0.5).clamp(0.0, max_x);
            dst[y * width + x] = src.sample_bilinear(sx, sy).unwrap_or(0.0);
        }
    }
    Ok(out)
}

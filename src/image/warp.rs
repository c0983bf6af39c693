//! Perspective warping into a template frame.

use crate::geometry::Homography;
use crate::image::resize::WorkingSize;
use crate::image::{ImageView, OwnedImage};
use crate::util::{FormMatchError, FormMatchResult};

/// Warps `src` through `h` into an image of `size`.
///
/// `h` maps source pixel coordinates to destination coordinates. Each
/// destination pixel `(x, y)` is pulled from `h⁻¹ · (x, y, 1)` with bilinear
/// sampling; samples that land outside the source are set to `fill`.
pub fn warp_perspective(
    src: ImageView<'_, f32>,
    h: &Homography,
    size: WorkingSize,
    fill: f32,
) -> FormMatchResult<OwnedImage> {
    let inv = h.inverse().ok_or(FormMatchError::HomographyDegenerate {
        reason: "homography is not invertible",
    })?;

    let WorkingSize { width, height } = size;
    let mut out = OwnedImage::filled(width, height, fill)?;
    let dst = out.data_mut();
    for y in 0..height {
        for x in 0..width {
            let Some([sx, sy]) = inv.apply([x as f64, y as f64]) else {
                continue;
            };
            if let Some(value) = src.sample_bilinear(sx as f32, sy as f32) {
                dst[y * width + x] = value;
            }
        }
    }
    Ok(out)
}

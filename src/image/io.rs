//! Convenience helpers for loading and saving images via the `image` crate.
//!
//! Available when the `image-io` feature is enabled.

use crate::image::resize::{resize_bilinear, WorkingSize};
use crate::image::OwnedImage;
use crate::util::{FormMatchError, FormMatchResult};
use std::path::Path;

/// Creates a normalized image from a grayscale image buffer.
pub fn owned_from_gray_image(img: &image::GrayImage) -> FormMatchResult<OwnedImage> {
    let width = img.width() as usize;
    let height = img.height() as usize;
    OwnedImage::from_u8(img.as_raw(), width, height)
}

/// Creates a normalized grayscale image from a dynamic image.
pub fn owned_from_dynamic_image(img: &image::DynamicImage) -> FormMatchResult<OwnedImage> {
    let gray = img.to_luma8();
    owned_from_gray_image(&gray)
}

/// Loads an image from disk as grayscale with intensities in `[0, 1]`.
pub fn load_gray_image<P: AsRef<Path>>(path: P) -> FormMatchResult<OwnedImage> {
    let img = image::open(path).map_err(|err| FormMatchError::ImageIo {
        reason: err.to_string(),
    })?;
    owned_from_dynamic_image(&img)
}

/// Loads an image and resizes it to the working resolution.
pub fn load_working_image<P: AsRef<Path>>(
    path: P,
    size: WorkingSize,
) -> FormMatchResult<OwnedImage> {
    let img = load_gray_image(path)?;
    resize_bilinear(img.view(), size)
}

/// Saves a normalized image as an 8-bit grayscale file.
///
/// The format is inferred from the file extension.
pub fn save_gray_image<P: AsRef<Path>>(img: &OwnedImage, path: P) -> FormMatchResult<()> {
    let buffer = image::GrayImage::from_raw(img.width() as u32, img.height() as u32, img.to_u8())
        .ok_or(FormMatchError::InvalidDimensions {
            width: img.width(),
            height: img.height(),
        })?;
    buffer.save(path).map_err(|err| FormMatchError::ImageIo {
        reason: err.to_string(),
    })
}

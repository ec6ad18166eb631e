//! Image decoding and grayscale conversion.
//!
//! Raw bytes in (PNG, JPEG, BMP, WebP), 8-bit luminance out. Plotter
//! paper is white, so transparent areas are composited onto white
//! before conversion and never attract ink.

use image::{DynamicImage, GrayImage, Luma};

use crate::types::PipelineError;

/// Decode raw image bytes into a grayscale image.
///
/// Luminance uses the `image` crate's weighted conversion, so green
/// contributes most and blue least. Alpha is flattened onto a white
/// background first.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `bytes` is empty.
/// Returns [`PipelineError::ImageDecode`] if the format is
/// unrecognized or the data is corrupt.
#[must_use = "returns the decoded grayscale image"]
pub fn decode_and_grayscale(bytes: &[u8]) -> Result<GrayImage, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    let img = image::load_from_memory(bytes)?;
    Ok(to_grayscale(&img))
}

/// Convert an already-decoded image, flattening alpha onto white.
#[must_use]
pub fn to_grayscale(img: &DynamicImage) -> GrayImage {
    if !img.color().has_alpha() {
        return img.to_luma8();
    }
    let la = img.to_luma_alpha8();
    GrayImage::from_fn(la.width(), la.height(), |x, y| {
        let [l, a] = la.get_pixel(x, y).0;
        let (l, a) = (u32::from(l), u32::from(a));
        // l·a + 255·(255 − a), rounded, over 255.
        let v = (l * a + 255 * (255 - a) + 127) / 255;
        Luma([u8::try_from(v).unwrap_or(u8::MAX)])
    })
}

//! zigline-pipeline: grayscale image to pulse-line toolpath (sans-IO).
//!
//! Converts a raster image into a single boustrophedon polyline of
//! zigzag "pulses" whose amplitude follows local darkness:
//! decode -> optional tone shaping -> projection onto paper ->
//! block sampling -> scan line generation.
//!
//! This crate has **no I/O dependencies**. It works on in-memory byte
//! slices and images and produces plain data; G-code and SVG output
//! live in `zigline-export`.

pub mod grayscale;
pub mod preprocess;
pub mod projection;
pub mod sample;
pub mod scan;
pub mod types;

pub use preprocess::Preprocess;
pub use scan::{PULSE_MINIMUM, Scan, ScanPathGenerator, scan, scan_with};
pub use types::{
    GrayImage, PaperRect, PathPoint, PipelineError, ScanDirection, ScanParameters, ScanSummary,
    Toolpath,
};

/// Decode, preprocess and scan an encoded image in one call.
///
/// # Pipeline steps
///
/// 1. Decode image and convert to grayscale
/// 2. Optional blur, histogram equalization and inversion
/// 3. Project onto the paper and generate scan lines
///
/// # Errors
///
/// Returns [`PipelineError::InvalidParameter`] for unusable scan or
/// preprocessing parameters (checked before the image is decoded), [`PipelineError::EmptyInput`]
/// if `image_bytes` is empty, or [`PipelineError::ImageDecode`] if the
/// image format is unrecognized.
pub fn process(
    image_bytes: &[u8],
    preprocess: &Preprocess,
    params: &ScanParameters,
) -> Result<Toolpath, PipelineError> {
    let generator = ScanPathGenerator::new(params.clone())?;
    preprocess.validate()?;
    let gray = grayscale::decode_and_grayscale(image_bytes)?;
    let gray = preprocess.apply(&gray);
    generator.generate(&gray)
}

//! Optional tone shaping applied to the grayscale image before scanning.
//!
//! All steps are off by default, leaving the image untouched. When
//! enabled they run in a fixed order: blur, equalize, invert.

use image::GrayImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::PipelineError;

/// Tone-shaping options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preprocess {
    /// Gaussian blur sigma in pixels. Non-positive disables the blur.
    pub blur_sigma: f32,
    /// Stretch the histogram so the full tonal range is used.
    pub equalize: bool,
    /// Swap dark and light, so light areas are inked instead.
    pub invert: bool,
}

impl Preprocess {
    /// Default blur sigma (no blur).
    pub const DEFAULT_BLUR_SIGMA: f32 = 0.0;
    /// Default for histogram equalization (off).
    pub const DEFAULT_EQUALIZE: bool = false;
    /// Default for inversion (off).
    pub const DEFAULT_INVERT: bool = false;
    /// Largest accepted blur sigma, in pixels.
    pub const MAX_BLUR_SIGMA: f32 = 100.0;

    /// Check that the options can be applied.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidParameter`] when `blur_sigma` is
    /// not finite or exceeds [`Self::MAX_BLUR_SIGMA`].
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !self.blur_sigma.is_finite() || self.blur_sigma > Self::MAX_BLUR_SIGMA {
            return Err(PipelineError::InvalidParameter(format!(
                "blur_sigma must be a finite number no greater than {}, got {}",
                Self::MAX_BLUR_SIGMA,
                self.blur_sigma
            )));
        }
        Ok(())
    }

    /// Whether any step is enabled.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        !self.blurs() && !self.equalize && !self.invert
    }

    /// Blur only for sigmas [`Self::validate`] accepts.
    fn blurs(&self) -> bool {
        self.blur_sigma > 0.0 && self.blur_sigma <= Self::MAX_BLUR_SIGMA
    }

    /// Apply the enabled steps to `image`.
    ///
    /// A sigma that fails [`Self::validate`] is skipped rather than
    /// applied.
    #[must_use = "returns the processed image"]
    pub fn apply(&self, image: &GrayImage) -> GrayImage {
        if self.is_identity() {
            return image.clone();
        }
        let mut out = if self.blurs() {
            imageproc::filter::gaussian_blur_f32(image, self.blur_sigma)
        } else {
            image.clone()
        };
        if self.equalize {
            out = imageproc::contrast::equalize_histogram(&out);
        }
        if self.invert {
            image::imageops::invert(&mut out);
        }
        debug!(
            blur_sigma = self.blur_sigma,
            equalize = self.equalize,
            invert = self.invert,
            "preprocessed image"
        );
        out
    }
}

impl Default for Preprocess {
    fn default() -> Self {
        Self {
            blur_sigma: Self::DEFAULT_BLUR_SIGMA,
            equalize: Self::DEFAULT_EQUALIZE,
            invert: Self::DEFAULT_INVERT,
        }
    }
}

#[cfg(test)]
mod tests {
    use image::Luma;

    use super::*;

    fn gradient() -> GrayImage {
        GrayImage::from_fn(16, 4, |x, _| Luma([u8::try_from(100 + x * 2).unwrap_or(0)]))
    }

    #[test]
    fn default_leaves_image_untouched() {
        let img = gradient();
        let pre = Preprocess::default();
        assert!(pre.is_identity());
        assert_eq!(pre.apply(&img), img);
    }

    #[test]
    fn invert_swaps_black_and_white() {
        let img = GrayImage::from_fn(2, 1, |x, _| if x == 0 { Luma([0]) } else { Luma([255]) });
        let pre = Preprocess {
            invert: true,
            ..Preprocess::default()
        };
        let out = pre.apply(&img);
        assert_eq!(out.get_pixel(0, 0).0[0], 255);
        assert_eq!(out.get_pixel(1, 0).0[0], 0);
    }

    #[test]
    fn equalize_widens_a_narrow_range() {
        let img = gradient();
        let pre = Preprocess {
            equalize: true,
            ..Preprocess::default()
        };
        let out = pre.apply(&img);
        let (lo, hi) = out
            .pixels()
            .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p.0[0]), hi.max(p.0[0])));
        assert!(hi - lo > 30 * 2, "range {lo}..{hi} not widened");
    }

    #[test]
    fn blur_softens_a_sharp_edge() {
        let img = GrayImage::from_fn(10, 10, |x, _| if x < 5 { Luma([0]) } else { Luma([255]) });
        let pre = Preprocess {
            blur_sigma: 1.5,
            ..Preprocess::default()
        };
        let out = pre.apply(&img);
        let v = out.get_pixel(4, 5).0[0];
        assert!(v > 0 && v < 255, "edge pixel {v} should be grey");
        assert_eq!(out.dimensions(), img.dimensions());
    }

    #[test]
    fn non_positive_sigma_is_no_blur() {
        let pre = Preprocess {
            blur_sigma: -1.0,
            ..Preprocess::default()
        };
        assert!(pre.is_identity());
    }

    #[test]
    fn default_options_validate() {
        assert!(Preprocess::default().validate().is_ok());
        let pre = Preprocess {
            blur_sigma: Preprocess::MAX_BLUR_SIGMA,
            ..Preprocess::default()
        };
        assert!(pre.validate().is_ok());
    }

    #[test]
    fn unusable_blur_sigma_is_rejected() {
        for blur_sigma in [f32::INFINITY, f32::NEG_INFINITY, f32::NAN, 1e30] {
            let pre = Preprocess {
                blur_sigma,
                ..Preprocess::default()
            };
            assert!(
                matches!(pre.validate(), Err(PipelineError::InvalidParameter(_))),
                "sigma {blur_sigma} accepted"
            );
        }
    }

    #[test]
    fn infinite_sigma_is_never_applied() {
        let img = gradient();
        let pre = Preprocess {
            blur_sigma: f32::INFINITY,
            ..Preprocess::default()
        };
        assert!(pre.is_identity());
        assert_eq!(pre.apply(&img), img);
    }

    #[test]
    fn deserializes_partial_json() {
        let pre: Preprocess = serde_json::from_str(r#"{"invert": true}"#).unwrap_or_default();
        assert!(pre.invert);
        assert!(!pre.equalize);
    }
}

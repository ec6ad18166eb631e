//! Geometry mapping: where the image lands on the paper.
//!
//! The image is centred on the paper origin and scaled to fill the
//! sheet width. If that makes it taller than the sheet, it is
//! rescaled to fill the sheet height instead. Either way the aspect
//! ratio of the source image is preserved.
//!
//! Paper dimensions are multiplied by `10 × margin_factor`: the 10
//! converts centimetres to the millimetres used by the plotter, and
//! the margin shrinks the picture away from the paper edge.

use tracing::debug;

use crate::types::{PaperRect, PipelineError};

/// Paper units to plotter units.
const UNIT_SCALE: f64 = 10.0;

/// Compute the centred, aspect-preserving paper rectangle for an
/// `image_width × image_height` image.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidParameter`] when either image
/// dimension is zero or either paper dimension is not a positive
/// finite number.
///
/// # Examples
///
/// ```
/// use zigline_pipeline::projection::compute_projection;
///
/// // A square image on landscape paper is bound by the height.
/// let rect = compute_projection(100, 100, 30.0, 20.0, 1.0).unwrap();
/// assert!((rect.y_start + 100.0).abs() < 1e-9);
/// assert!((rect.x_start + 100.0).abs() < 1e-9);
/// assert_eq!(rect.x_end, -rect.x_start);
/// ```
pub fn compute_projection(
    image_width: u32,
    image_height: u32,
    paper_width: f64,
    paper_height: f64,
    margin_factor: f64,
) -> Result<PaperRect, PipelineError> {
    if image_width == 0 || image_height == 0 {
        return Err(PipelineError::InvalidParameter(format!(
            "image dimensions must be positive, got {image_width}x{image_height}"
        )));
    }
    if !paper_width.is_finite() || paper_width <= 0.0 {
        return Err(PipelineError::InvalidParameter(format!(
            "paper_width must be a positive finite number, got {paper_width}"
        )));
    }
    if !paper_height.is_finite() || paper_height <= 0.0 {
        return Err(PipelineError::InvalidParameter(format!(
            "paper_height must be a positive finite number, got {paper_height}"
        )));
    }

    let half_height = paper_height / 2.0;

    // Width-constrained fit.
    let mut x_start = -paper_width / 2.0;
    let mut y_start = x_start * f64::from(image_height) / f64::from(image_width);

    // Too tall: switch to a height-constrained fit.
    if y_start.abs() > half_height {
        x_start *= half_height / y_start.abs();
        y_start = -half_height;
    }

    let scale = UNIT_SCALE * margin_factor;
    x_start *= scale;
    y_start *= scale;

    let rect = PaperRect {
        x_start,
        y_start,
        x_end: -x_start,
        y_end: -y_start,
    };
    debug!(
        image_width,
        image_height,
        width = rect.width(),
        height = rect.height(),
        "projected image onto paper"
    );
    Ok(rect)
}

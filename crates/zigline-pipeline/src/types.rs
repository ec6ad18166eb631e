//! Shared types for the zigline scan-conversion pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Re-export `GrayImage` so downstream crates can hand intensity grids
/// to the pipeline without depending on `image` directly.
pub use image::GrayImage;

/// Primary axis along which scan lines are laid out.
///
/// `Horizontal` scan lines run along X and are stacked along Y;
/// `Vertical` scan lines run along Y and are stacked along X.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanDirection {
    /// Lines run left/right, stepping upward through the sheet.
    #[default]
    Horizontal,
    /// Lines run up/down, stepping rightward through the sheet.
    Vertical,
}

impl fmt::Display for ScanDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Horizontal => f.write_str("Horizontal"),
            Self::Vertical => f.write_str("Vertical"),
        }
    }
}

/// Parameters for one image-to-toolpath conversion.
///
/// Paper dimensions are given in the machine's paper unit; the
/// projection multiplies them by 10 (centimetres to millimetres), so
/// `tool_diameter` and every emitted coordinate are in millimetres.
///
/// Fields are public for ergonomic construction; call
/// [`validate`](Self::validate) (the pipeline entry points do this for
/// you) before relying on them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanParameters {
    /// Which axis the scan lines step along.
    pub direction: ScanDirection,

    /// Scan line spacing as a multiple of `tool_diameter`.
    pub block_scale: f64,

    /// Pen tip width. Sets the zigzag step and, scaled by
    /// `block_scale`, the distance between scan lines.
    pub tool_diameter: f64,

    /// Paper width (before the ×10 unit conversion).
    pub paper_width: f64,

    /// Paper height (before the ×10 unit conversion).
    pub paper_height: f64,

    /// Fraction of the paper the projected image may use, in `(0, 1]`.
    pub margin_factor: f64,

    /// Exponent applied to normalized darkness before it becomes a
    /// pulse amplitude. `1.0` is linear, `2.0` quadratic.
    pub tone_exponent: f64,
}

impl ScanParameters {
    /// Default scan direction.
    pub const DEFAULT_DIRECTION: ScanDirection = ScanDirection::Horizontal;
    /// Default line spacing multiplier.
    pub const DEFAULT_BLOCK_SCALE: f64 = 6.0;
    /// Default pen tip width in millimetres.
    pub const DEFAULT_TOOL_DIAMETER: f64 = 1.5;
    /// Default paper width (A4 portrait, centimetres).
    pub const DEFAULT_PAPER_WIDTH: f64 = 21.0;
    /// Default paper height (A4 portrait, centimetres).
    pub const DEFAULT_PAPER_HEIGHT: f64 = 29.7;
    /// Default usable fraction of the sheet.
    pub const DEFAULT_MARGIN_FACTOR: f64 = 0.9;
    /// Default darkness-to-amplitude exponent (linear).
    pub const DEFAULT_TONE_EXPONENT: f64 = 1.0;

    /// Distance between consecutive scan lines.
    #[must_use]
    pub fn step_size(&self) -> f64 {
        self.tool_diameter * self.block_scale
    }

    /// Maximum pulse amplitude: half the scan line spacing.
    #[must_use]
    pub fn half_step(&self) -> f64 {
        self.step_size() / 2.0
    }

    /// Distance between consecutive zigzag vertices along a line.
    #[must_use]
    pub const fn zig_zag_spacing(&self) -> f64 {
        self.tool_diameter
    }

    /// Check every parameter invariant.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidParameter`] naming the first
    /// offending field when a length is non-positive or non-finite,
    /// `margin_factor` lies outside `(0, 1]`, or `tone_exponent` is not
    /// a positive finite number.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let positive = [
            ("block_scale", self.block_scale),
            ("tool_diameter", self.tool_diameter),
            ("paper_width", self.paper_width),
            ("paper_height", self.paper_height),
            ("tone_exponent", self.tone_exponent),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(PipelineError::InvalidParameter(format!(
                    "{name} must be a positive finite number, got {value}"
                )));
            }
        }

        if !self.margin_factor.is_finite() || self.margin_factor <= 0.0 || self.margin_factor > 1.0
        {
            return Err(PipelineError::InvalidParameter(format!(
                "margin_factor must be in (0, 1], got {}",
                self.margin_factor
            )));
        }

        // Products of valid inputs can still underflow to zero.
        let step = self.step_size();
        if !step.is_finite() || step <= 0.0 {
            return Err(PipelineError::InvalidParameter(format!(
                "tool_diameter * block_scale must be positive, got {step}"
            )));
        }

        Ok(())
    }
}

impl Default for ScanParameters {
    fn default() -> Self {
        Self {
            direction: Self::DEFAULT_DIRECTION,
            block_scale: Self::DEFAULT_BLOCK_SCALE,
            tool_diameter: Self::DEFAULT_TOOL_DIAMETER,
            paper_width: Self::DEFAULT_PAPER_WIDTH,
            paper_height: Self::DEFAULT_PAPER_HEIGHT,
            margin_factor: Self::DEFAULT_MARGIN_FACTOR,
            tone_exponent: Self::DEFAULT_TONE_EXPONENT,
        }
    }
}

/// Paper-space rectangle the image is projected onto.
///
/// Always centred on the origin: `x_start == -x_end` and
/// `y_start == -y_end`. Paper Y increases upward.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PaperRect {
    /// Left edge.
    pub x_start: f64,
    /// Bottom edge.
    pub y_start: f64,
    /// Right edge.
    pub x_end: f64,
    /// Top edge.
    pub y_end: f64,
}

impl PaperRect {
    /// Horizontal extent.
    #[must_use]
    pub fn width(&self) -> f64 {
        self.x_end - self.x_start
    }

    /// Vertical extent.
    #[must_use]
    pub fn height(&self) -> f64 {
        self.y_end - self.y_start
    }

    /// Whether `(x, y)` lies inside the rectangle (edges inclusive).
    #[must_use]
    pub fn contains(&self, x: f64, y: f64) -> bool {
        (self.x_start..=self.x_end).contains(&x) && (self.y_start..=self.y_end).contains(&y)
    }
}

/// One emitted toolpath vertex in paper space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PathPoint {
    /// Horizontal position.
    pub x: f64,
    /// Vertical position (paper Y, increasing upward).
    pub y: f64,
    /// `true` when the pen travels lifted to this point.
    pub pen_up: bool,
}

impl PathPoint {
    /// Create a new path point.
    #[must_use]
    pub const fn new(x: f64, y: f64, pen_up: bool) -> Self {
        Self { x, y, pen_up }
    }
}

/// Counters describing one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    /// Number of scan lines visited.
    pub lines: usize,
    /// Total points emitted, bracket points included.
    pub points: usize,
    /// Points emitted with the pen down.
    pub pen_down_points: usize,
}

/// A complete in-memory toolpath.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Toolpath {
    /// Points in emission order.
    pub points: Vec<PathPoint>,
    /// The rectangle the image was projected onto.
    pub rect: PaperRect,
    /// Scan counters.
    pub summary: ScanSummary,
}

/// Errors that can occur during pipeline processing.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// A scan parameter or the image dimensions are unusable.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

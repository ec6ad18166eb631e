//! Pulse-line scan generation: the boustrophedon zigzag state machine.
//!
//! The projected paper rectangle is swept by parallel scan lines
//! spaced `tool_diameter × block_scale` apart. Each line is walked in
//! `tool_diameter` steps; at every step the image under a small box is
//! averaged and turned into a perpendicular deflection (the pulse).
//! Consecutive vertices alternate above and below the line centre, so
//! dark areas become tall zigzags and light areas become a flat,
//! pen-up glide.
//!
//! Lines alternate direction (odd lines run high→low, even lines
//! low→high) so each line starts where the previous one ended.
//!
//! Every line is bracketed by pen-up points on the line centre at both
//! ends. Points are produced strictly in plotting order and handed to
//! a visitor as they are generated; [`ScanPathGenerator::generate`]
//! simply collects them.

use std::convert::Infallible;

use image::GrayImage;
use tracing::{debug, trace};

use crate::projection::compute_projection;
use crate::sample::sample_region;
use crate::types::{
    PaperRect, PathPoint, PipelineError, ScanDirection, ScanParameters, ScanSummary, Toolpath,
};

/// Pulses smaller than this (in plotter units) are drawn pen-up.
pub const PULSE_MINIMUM: f64 = 0.5;

/// Slack, in steps, on loop bounds so a vertex landing a hair past an
/// edge because of rounding is neither added nor dropped.
const BOUND_SLACK: f64 = 1e-9;

/// Reusable pulse-line generator bound to one validated parameter set.
///
/// Holds no per-scan state, so one generator can convert any number
/// of images, from any number of threads.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanPathGenerator {
    params: ScanParameters,
}

impl ScanPathGenerator {
    /// Validate `params` and build a generator.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidParameter`] when the parameters
    /// violate any invariant (see [`ScanParameters::validate`]).
    pub fn new(params: ScanParameters) -> Result<Self, PipelineError> {
        params.validate()?;
        Ok(Self { params })
    }

    /// The validated parameters.
    #[must_use]
    pub const fn params(&self) -> &ScanParameters {
        &self.params
    }

    /// Project `image` onto the paper and return a ready-to-run scan.
    ///
    /// Nothing is emitted yet; this is the last point at which a
    /// conversion can fail on its inputs.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidParameter`] when the image has a
    /// zero dimension.
    pub fn prepare<'a>(&'a self, image: &'a GrayImage) -> Result<Scan<'a>, PipelineError> {
        let rect = compute_projection(
            image.width(),
            image.height(),
            self.params.paper_width,
            self.params.paper_height,
            self.params.margin_factor,
        )?;
        Ok(Scan {
            image,
            params: &self.params,
            rect,
        })
    }

    /// Convert `image` into a complete in-memory toolpath.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidParameter`] when the image has a
    /// zero dimension.
    pub fn generate(&self, image: &GrayImage) -> Result<Toolpath, PipelineError> {
        let scan = self.prepare(image)?;
        let mut points = Vec::new();
        let Ok(summary) = scan.run(|point| {
            points.push(point);
            Ok::<(), Infallible>(())
        });
        Ok(Toolpath {
            points,
            rect: scan.rect(),
            summary,
        })
    }
}

/// One prepared image-to-toolpath conversion.
#[derive(Debug, Clone, Copy)]
pub struct Scan<'a> {
    image: &'a GrayImage,
    params: &'a ScanParameters,
    rect: PaperRect,
}

/// Mutable state threaded through a single scan.
struct ScanState {
    /// 1-based scan line counter; its parity picks the direction.
    line_index: usize,
    /// Zigzag sign alternator, flipped after every step vertex.
    sign: f64,
    summary: ScanSummary,
}

impl ScanState {
    const fn new() -> Self {
        Self {
            line_index: 0,
            sign: 1.0,
            summary: ScanSummary {
                lines: 0,
                points: 0,
                pen_down_points: 0,
            },
        }
    }
}

/// Maps (primary, secondary) scan coordinates onto paper X/Y.
///
/// The primary axis is the one scan lines step along; the secondary
/// axis is the one each line travels along.
#[derive(Debug, Clone, Copy)]
struct Axes {
    direction: ScanDirection,
    primary: (f64, f64),
    secondary: (f64, f64),
}

impl Axes {
    const fn new(direction: ScanDirection, rect: &PaperRect) -> Self {
        match direction {
            ScanDirection::Horizontal => Self {
                direction,
                primary: (rect.y_start, rect.y_end),
                secondary: (rect.x_start, rect.x_end),
            },
            ScanDirection::Vertical => Self {
                direction,
                primary: (rect.x_start, rect.x_end),
                secondary: (rect.y_start, rect.y_end),
            },
        }
    }

    const fn point(self, primary: f64, secondary: f64, pen_up: bool) -> PathPoint {
        match self.direction {
            ScanDirection::Horizontal => PathPoint::new(secondary, primary, pen_up),
            ScanDirection::Vertical => PathPoint::new(primary, secondary, pen_up),
        }
    }

    /// Paper box `(x0, y0, x1, y1)` spanning `±across` on the primary
    /// axis and `±along` on the secondary axis.
    const fn sample_box(
        self,
        primary: f64,
        secondary: f64,
        across: f64,
        along: f64,
    ) -> (f64, f64, f64, f64) {
        match self.direction {
            ScanDirection::Horizontal => (
                secondary - along,
                primary - across,
                secondary + along,
                primary + across,
            ),
            ScanDirection::Vertical => (
                primary - across,
                secondary - along,
                primary + across,
                secondary + along,
            ),
        }
    }
}

impl Scan<'_> {
    /// The paper rectangle the image is projected onto.
    #[must_use]
    pub const fn rect(&self) -> PaperRect {
        self.rect
    }

    /// Walk every scan line, handing each point to `visit` in order.
    ///
    /// The first error returned by `visit` stops the scan immediately
    /// and is passed back to the caller; nothing further is sampled.
    ///
    /// # Errors
    ///
    /// Only errors produced by `visit`.
    #[allow(clippy::cast_precision_loss)]
    pub fn run<E>(
        &self,
        mut visit: impl FnMut(PathPoint) -> Result<(), E>,
    ) -> Result<ScanSummary, E> {
        let step = self.params.step_size();
        let half_step = self.params.half_step();
        let spacing = self.params.zig_zag_spacing();
        let axes = Axes::new(self.params.direction, &self.rect);
        let (p_start, p_end) = axes.primary;
        let (s_start, s_end) = axes.secondary;
        let line_count = steps_before(p_end - p_start, step);
        let forward_steps = steps_before(s_end - s_start, spacing);
        let reverse_steps = steps_through(s_end - s_start, spacing);

        let mut state = ScanState::new();
        let mut emit = |state: &mut ScanState, point: PathPoint| {
            state.summary.points += 1;
            if !point.pen_up {
                state.summary.pen_down_points += 1;
            }
            visit(point)
        };

        for k in 0..line_count {
            let line = (k as f64).mul_add(step, p_start);
            state.line_index += 1;
            state.summary.lines += 1;
            let centre = line + half_step;
            let forward = state.line_index % 2 == 0;
            let (entry, exit) = if forward {
                (s_start, s_end)
            } else {
                (s_end, s_start)
            };
            trace!(line = state.line_index, at = line, forward, "scan line");

            emit(&mut state, axes.point(centre, entry, true))?;

            let steps = if forward {
                forward_steps
            } else {
                reverse_steps
            };
            for j in 0..steps {
                let offset = j as f64 * spacing;
                let along = if forward {
                    s_start + offset
                } else {
                    s_end - offset
                };

                let pulse = self.pulse_at(axes, line, along, half_step, spacing);
                let pen_up = pulse < PULSE_MINIMUM;
                let point = axes.point(pulse.mul_add(state.sign, centre), along, pen_up);
                emit(&mut state, point)?;
                state.sign = -state.sign;
            }

            emit(&mut state, axes.point(centre, exit, true))?;
        }

        debug!(
            lines = state.summary.lines,
            points = state.summary.points,
            pen_down = state.summary.pen_down_points,
            "scan complete"
        );
        Ok(state.summary)
    }

    /// Pulse amplitude for the box centred on (`line`, `along`), in
    /// `[0, half_step]`.
    fn pulse_at(self, axes: Axes, line: f64, along: f64, half_step: f64, spacing: f64) -> f64 {
        let (x0, y0, x1, y1) = axes.sample_box(line, along, half_step, spacing);
        let z = sample_region(self.image, &self.rect, x0, y0, x1, y1);
        half_step * darkness(z, self.params.tone_exponent)
    }
}

/// Number of vertices `start + k × step` lying strictly before
/// `start + span`: the forward walk, exclusive of its far edge.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn steps_before(span: f64, step: f64) -> u64 {
    (span / step - BOUND_SLACK).ceil().max(0.0) as u64
}

/// Number of vertices `end - k × step` lying at or after `end - span`:
/// the reverse walk, inclusive of its far edge.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn steps_through(span: f64, step: f64) -> u64 {
    ((span / step + BOUND_SLACK).floor().max(0.0) as u64).saturating_add(1)
}

/// Normalized darkness of intensity `z`: 0 for white, 1 for black,
/// shaped by `exponent`.
#[must_use]
pub fn darkness(z: f64, exponent: f64) -> f64 {
    ((255.0 - z) / 255.0).clamp(0.0, 1.0).powf(exponent)
}

/// Convert `image` into an in-memory toolpath with `params`.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidParameter`] for unusable parameters
/// or a zero-sized image; nothing is generated in that case.
pub fn scan(image: &GrayImage, params: &ScanParameters) -> Result<Toolpath, PipelineError> {
    ScanPathGenerator::new(params.clone())?.generate(image)
}

/// Stream the toolpath for `image` into `visit`, point by point.
///
/// Parameters and image are validated before the first point is
/// produced. A visitor error stops the scan and is returned as-is.
///
/// # Errors
///
/// Returns `E::from(PipelineError::InvalidParameter)` for unusable
/// inputs, or the first error produced by `visit`.
pub fn scan_with<E>(
    image: &GrayImage,
    params: &ScanParameters,
    visit: impl FnMut(PathPoint) -> Result<(), E>,
) -> Result<ScanSummary, E>
where
    E: From<PipelineError>,
{
    let generator = ScanPathGenerator::new(params.clone())?;
    let scan = generator.prepare(image)?;
    scan.run(visit)
}

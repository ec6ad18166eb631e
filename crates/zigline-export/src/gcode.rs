//! Motion emission: turning a toolpath into pen-plotter commands.
//!
//! [`MotionSink`] is the device-protocol seam: four actuator calls plus
//! a preamble and a final flush. [`MotionEmitter`] sits in front of a
//! sink and enforces the pen-toggle contract, issuing a pen command
//! only when the requested state differs from the last one.
//! [`GcodeSink`] is the stock sink, writing plain G-code text.
//!
//! [`convert`] ties it together: scan an image and stream every point
//! straight into a sink without buffering the toolpath.
//! [`emit_toolpath`] writes a toolpath that was already generated.
//!
//! ## Program shape
//!
//! ```text
//! ; zigline                 metadata comments
//! G00 G90;                  absolute positioning
//! M06 T0;                   tool change
//! G00 Z90;                  pen up
//! G00 X.. Y..;              points, with Z commands only on change
//! G00 X0.000 Y0.000;        return to origin, pen up
//! ```

use std::io::{self, Write};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use zigline_pipeline::{
    GrayImage, PathPoint, PipelineError, ScanParameters, ScanPathGenerator, ScanSummary,
    Toolpath,
};

/// Errors raised while emitting motion commands.
#[derive(Debug, Error)]
pub enum EmitError {
    /// The conversion could not start or the scan failed.
    #[error(transparent)]
    Scan(#[from] PipelineError),

    /// The sink rejected a write.
    #[error("failed to write motion commands: {0}")]
    SinkFailure(#[from] io::Error),
}

/// Metadata written at the top of an emitted program.
///
/// All fields are optional. Sinks that cannot carry comments ignore it.
#[derive(Debug, Clone, Default)]
pub struct GcodeMetadata<'a> {
    /// Source image name, emitted as `; Source: <title>`.
    pub title: Option<&'a str>,

    /// Free-form description, one comment line per text line.
    pub description: Option<&'a str>,

    /// Serialized [`ScanParameters`], emitted as `; Config: <json>` so
    /// a program carries the settings that produced it.
    pub config_json: Option<&'a str>,
}

/// A device that accepts pen-plotter motion.
///
/// Coordinates are paper-space plotter units.
pub trait MotionSink {
    /// Program preamble: metadata and absolute positioning.
    ///
    /// # Errors
    ///
    /// Returns [`EmitError::SinkFailure`] if the device rejects it.
    fn begin(&mut self, metadata: &GcodeMetadata<'_>) -> Result<(), EmitError> {
        let _ = metadata;
        Ok(())
    }

    /// Raise the pen off the paper.
    ///
    /// # Errors
    ///
    /// Returns [`EmitError::SinkFailure`] if the device rejects it.
    fn lift_pen(&mut self) -> Result<(), EmitError>;

    /// Put the pen on the paper.
    ///
    /// # Errors
    ///
    /// Returns [`EmitError::SinkFailure`] if the device rejects it.
    fn lower_pen(&mut self) -> Result<(), EmitError>;

    /// Straight move to `(x, y)` with the pen in its current state.
    ///
    /// # Errors
    ///
    /// Returns [`EmitError::SinkFailure`] if the device rejects it.
    fn move_to(&mut self, x: f64, y: f64) -> Result<(), EmitError>;

    /// Release the device: flush buffered output. Called exactly once
    /// per conversion, also after a failure.
    ///
    /// # Errors
    ///
    /// Returns [`EmitError::SinkFailure`] if flushing fails.
    fn finish(&mut self) -> Result<(), EmitError>;
}

impl<S: MotionSink + ?Sized> MotionSink for &mut S {
    fn begin(&mut self, metadata: &GcodeMetadata<'_>) -> Result<(), EmitError> {
        (**self).begin(metadata)
    }

    fn lift_pen(&mut self) -> Result<(), EmitError> {
        (**self).lift_pen()
    }

    fn lower_pen(&mut self) -> Result<(), EmitError> {
        (**self).lower_pen()
    }

    fn move_to(&mut self, x: f64, y: f64) -> Result<(), EmitError> {
        (**self).move_to(x, y)
    }

    fn finish(&mut self) -> Result<(), EmitError> {
        (**self).finish()
    }
}

/// Pen-state tracking front end for a [`MotionSink`].
#[derive(Debug)]
pub struct MotionEmitter<S> {
    sink: S,
    /// Last commanded pen state; `None` until the first command.
    pen_up: Option<bool>,
    pen_commands: usize,
    moves: usize,
}

impl<S: MotionSink> MotionEmitter<S> {
    /// Wrap `sink`. The pen state starts unknown.
    #[must_use]
    pub const fn new(sink: S) -> Self {
        Self {
            sink,
            pen_up: None,
            pen_commands: 0,
            moves: 0,
        }
    }

    /// Emit the program preamble and lift the pen.
    ///
    /// # Errors
    ///
    /// Propagates sink failures.
    pub fn begin(&mut self, metadata: &GcodeMetadata<'_>) -> Result<(), EmitError> {
        self.sink.begin(metadata)?;
        self.set_pen(true)
    }

    /// Command the pen to `up`, unless it is already there.
    ///
    /// # Errors
    ///
    /// Propagates sink failures.
    pub fn set_pen(&mut self, up: bool) -> Result<(), EmitError> {
        if self.pen_up == Some(up) {
            return Ok(());
        }
        if up {
            self.sink.lift_pen()?;
        } else {
            self.sink.lower_pen()?;
        }
        self.pen_up = Some(up);
        self.pen_commands += 1;
        Ok(())
    }

    /// Move to `point`, switching the pen first if its state changed.
    ///
    /// # Errors
    ///
    /// Propagates sink failures.
    pub fn emit(&mut self, point: PathPoint) -> Result<(), EmitError> {
        self.set_pen(point.pen_up)?;
        self.sink.move_to(point.x, point.y)?;
        self.moves += 1;
        Ok(())
    }

    /// Lift the pen if needed and park at the origin.
    ///
    /// # Errors
    ///
    /// Propagates sink failures.
    pub fn end(&mut self) -> Result<(), EmitError> {
        self.emit(PathPoint::new(0.0, 0.0, true))
    }

    /// Flush and release the sink.
    ///
    /// # Errors
    ///
    /// Propagates sink failures.
    pub fn finish(&mut self) -> Result<(), EmitError> {
        self.sink.finish()
    }

    /// Pen commands issued so far.
    #[must_use]
    pub const fn pen_commands(&self) -> usize {
        self.pen_commands
    }

    /// Moves issued so far.
    #[must_use]
    pub const fn moves(&self) -> usize {
        self.moves
    }

    /// The wrapped sink.
    #[must_use]
    pub const fn sink(&self) -> &S {
        &self.sink
    }

    /// Unwrap the emitter, returning the sink.
    #[must_use]
    pub fn into_sink(self) -> S {
        self.sink
    }
}

/// Options for [`GcodeSink`] output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GcodeOptions {
    /// Z value written for pen up.
    pub pen_up_z: f64,
    /// Z value written for pen down.
    pub pen_down_z: f64,
    /// Tool selected in the preamble (`M06 T<n>;`).
    pub tool_number: u32,
}

impl GcodeOptions {
    /// Default pen-up Z (servo angle of a raised pen).
    pub const DEFAULT_PEN_UP_Z: f64 = 90.0;
    /// Default pen-down Z.
    pub const DEFAULT_PEN_DOWN_Z: f64 = 0.0;
    /// Default tool number.
    pub const DEFAULT_TOOL_NUMBER: u32 = 0;
}

impl Default for GcodeOptions {
    fn default() -> Self {
        Self {
            pen_up_z: Self::DEFAULT_PEN_UP_Z,
            pen_down_z: Self::DEFAULT_PEN_DOWN_Z,
            tool_number: Self::DEFAULT_TOOL_NUMBER,
        }
    }
}

/// [`MotionSink`] writing G-code text to any [`Write`].
///
/// Wrap files in a `BufWriter`; [`MotionSink::finish`] flushes it.
#[derive(Debug)]
pub struct GcodeSink<W: Write> {
    out: W,
    options: GcodeOptions,
}

impl<W: Write> GcodeSink<W> {
    /// Sink with default pen heights.
    pub fn new(out: W) -> Self {
        Self::with_options(out, GcodeOptions::default())
    }

    /// Sink with explicit pen heights and tool number.
    pub const fn with_options(out: W, options: GcodeOptions) -> Self {
        Self { out, options }
    }

    /// Unwrap the sink, returning the writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> MotionSink for GcodeSink<W> {
    fn begin(&mut self, metadata: &GcodeMetadata<'_>) -> Result<(), EmitError> {
        writeln!(self.out, "; zigline")?;
        if let Some(title) = metadata.title {
            for line in title.lines() {
                writeln!(self.out, "; Source: {line}")?;
            }
        }
        if let Some(description) = metadata.description {
            for line in description.lines() {
                writeln!(self.out, "; {line}")?;
            }
        }
        if let Some(config_json) = metadata.config_json {
            // Compact JSON has no newlines; guard against pretty input.
            let flat: String = config_json.lines().map(str::trim).collect();
            writeln!(self.out, "; Config: {flat}")?;
        }
        writeln!(self.out, "G00 G90;")?;
        writeln!(self.out, "M06 T{};", self.options.tool_number)?;
        Ok(())
    }

    fn lift_pen(&mut self) -> Result<(), EmitError> {
        writeln!(self.out, "G00 Z{};", self.options.pen_up_z)?;
        Ok(())
    }

    fn lower_pen(&mut self) -> Result<(), EmitError> {
        writeln!(self.out, "G00 Z{};", self.options.pen_down_z)?;
        Ok(())
    }

    fn move_to(&mut self, x: f64, y: f64) -> Result<(), EmitError> {
        // Avoid "-0.000".
        let x = if x.abs() < 0.0005 { 0.0 } else { x };
        let y = if y.abs() < 0.0005 { 0.0 } else { y };
        writeln!(self.out, "G00 X{x:.3} Y{y:.3};")?;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), EmitError> {
        self.out.flush()?;
        Ok(())
    }
}

/// Scan `image` and stream the resulting program into `sink`.
///
/// Parameters and image are checked before anything is written. The
/// sink's [`MotionSink::finish`] is called exactly once on every exit
/// path; when a write fails midway, whatever reached the sink stays
/// there.
///
/// # Errors
///
/// Returns [`EmitError::Scan`] for unusable parameters or images, and
/// [`EmitError::SinkFailure`] when the sink rejects a write or flush.
/// A write failure takes precedence over a later flush failure.
pub fn convert<S: MotionSink + ?Sized>(
    image: &GrayImage,
    params: &ScanParameters,
    sink: &mut S,
    metadata: &GcodeMetadata<'_>,
) -> Result<ScanSummary, EmitError> {
    with_emitter(sink, |emitter| emit_program(image, params, emitter, metadata))
}

/// Write an already generated `toolpath` into `sink` as a program.
///
/// Use this instead of [`convert`] when the toolpath is also needed
/// elsewhere, such as for a preview. The sink is finished exactly once,
/// as in [`convert`].
///
/// # Errors
///
/// Returns [`EmitError::SinkFailure`] when the sink rejects a write or
/// flush. A write failure takes precedence over a later flush failure.
pub fn emit_toolpath<S: MotionSink + ?Sized>(
    toolpath: &Toolpath,
    sink: &mut S,
    metadata: &GcodeMetadata<'_>,
) -> Result<(), EmitError> {
    with_emitter(sink, |emitter| {
        emitter.begin(metadata)?;
        for &point in &toolpath.points {
            emitter.emit(point)?;
        }
        emitter.end()
    })
}

/// Run `body` against an emitter over `sink`, then finish the sink
/// whatever the outcome.
fn with_emitter<'s, S: MotionSink + ?Sized, T>(
    sink: &'s mut S,
    body: impl FnOnce(&mut MotionEmitter<&'s mut S>) -> Result<T, EmitError>,
) -> Result<T, EmitError> {
    let mut emitter = MotionEmitter::new(sink);
    let result = body(&mut emitter);
    let finished = emitter.finish();
    let value = result?;
    finished?;
    debug!(
        moves = emitter.moves(),
        pen_commands = emitter.pen_commands(),
        "motion program written"
    );
    Ok(value)
}

fn emit_program<S: MotionSink>(
    image: &GrayImage,
    params: &ScanParameters,
    emitter: &mut MotionEmitter<S>,
    metadata: &GcodeMetadata<'_>,
) -> Result<ScanSummary, EmitError> {
    let generator = ScanPathGenerator::new(params.clone())?;
    let scan = generator.prepare(image)?;
    emitter.begin(metadata)?;
    let summary = scan
        .run(|point| emitter.emit(point))
        .inspect_err(|e| warn!(error = %e, "scan aborted"))?;
    emitter.end()?;
    Ok(summary)
}

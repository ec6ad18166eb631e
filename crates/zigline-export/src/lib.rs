//! zigline-export: motion emitters and preview serializers.
//!
//! Turns toolpaths from `zigline-pipeline` into output: G-code for
//! pen plotters (streamed through the [`MotionSink`] seam) and SVG
//! previews. Nothing here touches the filesystem; callers hand in a
//! writer or receive a `String`.

pub mod gcode;
pub mod svg;

pub use gcode::{
    EmitError, GcodeMetadata, GcodeOptions, GcodeSink, MotionEmitter, MotionSink, convert,
    emit_toolpath,
};
pub use svg::{SvgMetadata, SvgOptions, to_svg};

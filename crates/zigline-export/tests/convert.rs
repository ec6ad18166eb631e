//! Integration tests: image in, plotter program out.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::io::{self, Write};

use image::{GrayImage, Luma};
use zigline_export::{
    EmitError, GcodeMetadata, GcodeSink, MotionSink, SvgMetadata, SvgOptions, convert,
    emit_toolpath, to_svg,
};
use zigline_pipeline::{PipelineError, ScanDirection, ScanParameters};

/// 2x2 image with black on the diagonal, laid out one unit per pixel.
fn diagonal() -> (GrayImage, ScanParameters) {
    let img = GrayImage::from_fn(2, 2, |x, y| if x == y { Luma([0]) } else { Luma([255]) });
    let params = ScanParameters {
        direction: ScanDirection::Horizontal,
        block_scale: 1.0,
        tool_diameter: 1.0,
        paper_width: 2.0,
        paper_height: 2.0,
        margin_factor: 0.1,
        tone_exponent: 1.0,
    };
    (img, params)
}

fn portrait() -> GrayImage {
    GrayImage::from_fn(48, 64, |x, y| {
        let dx = f64::from(x) - 24.0;
        let dy = f64::from(y) - 32.0;
        let d = dx.hypot(dy).min(255.0);
        Luma([u8::try_from(d as u32 * 8).unwrap_or(255)])
    })
}

#[test]
fn diagonal_image_gcode_is_exact() {
    let (img, params) = diagonal();
    let mut sink = GcodeSink::new(Vec::new());
    let summary = convert(&img, &params, &mut sink, &GcodeMetadata::default()).unwrap();
    assert_eq!(summary.lines, 2);

    let text = String::from_utf8(sink.into_inner()).unwrap();
    let expected = "\
; zigline
G00 G90;
M06 T0;
G00 Z90;
G00 X1.000 Y-0.500;
G00 X1.000 Y-0.500;
G00 X0.000 Y-0.500;
G00 X-1.000 Y-0.500;
G00 X-1.000 Y-0.500;
G00 X-1.000 Y0.500;
G00 Z0;
G00 X-1.000 Y0.000;
G00 X0.000 Y1.000;
G00 Z90;
G00 X1.000 Y0.500;
G00 X0.000 Y0.000;
";
    assert_eq!(text, expected);
}

#[test]
fn program_toggles_pen_only_on_change() {
    let img = portrait();
    let mut sink = GcodeSink::new(Vec::new());
    let metadata = GcodeMetadata {
        title: Some("portrait"),
        ..GcodeMetadata::default()
    };
    convert(&img, &ScanParameters::default(), &mut sink, &metadata).unwrap();
    let text = String::from_utf8(sink.into_inner()).unwrap();

    assert!(text.starts_with("; zigline\n; Source: portrait\nG00 G90;\n"));
    assert!(text.ends_with("G00 X0.000 Y0.000;\n"));

    let pens: Vec<&str> = text.lines().filter(|l| l.starts_with("G00 Z")).collect();
    assert!(pens.len() > 2, "portrait should need the pen down somewhere");
    assert_eq!(pens[0], "G00 Z90;");
    for pair in pens.windows(2) {
        assert_ne!(pair[0], pair[1], "redundant pen command");
    }
    assert_eq!(*pens.last().unwrap(), "G00 Z90;");
}

#[test]
fn invalid_parameters_leave_output_empty() {
    let img = portrait();
    let params = ScanParameters {
        block_scale: 0.0,
        ..ScanParameters::default()
    };
    let mut sink = GcodeSink::new(Vec::new());
    let result = convert(&img, &params, &mut sink, &GcodeMetadata::default());
    assert!(matches!(
        result,
        Err(EmitError::Scan(PipelineError::InvalidParameter(_)))
    ));
    assert!(sink.into_inner().is_empty());
}

#[test]
fn empty_image_is_a_scan_error() {
    let img = GrayImage::new(0, 0);
    let mut sink = GcodeSink::new(Vec::new());
    let result = convert(&img, &ScanParameters::default(), &mut sink, &GcodeMetadata::default());
    assert!(matches!(result, Err(EmitError::Scan(_))));
}

/// Writer that accepts `budget` lines, then fails; counts flushes.
struct FailingWriter {
    budget: usize,
    written: Vec<u8>,
    flushes: usize,
}

impl Write for FailingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let newlines = buf.iter().filter(|&&b| b == b'\n').count();
        if newlines > self.budget {
            return Err(io::Error::other("device unplugged"));
        }
        self.budget -= newlines;
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flushes += 1;
        Ok(())
    }
}

#[test]
fn write_failure_stops_conversion_and_still_flushes() {
    let img = portrait();
    let mut sink = GcodeSink::new(FailingWriter {
        budget: 20,
        written: Vec::new(),
        flushes: 0,
    });
    let result = convert(&img, &ScanParameters::default(), &mut sink, &GcodeMetadata::default());
    assert!(matches!(result, Err(EmitError::SinkFailure(_))));

    let writer = sink.into_inner();
    assert_eq!(writer.flushes, 1);
    // Partial output stays behind, possibly ending mid-line.
    let partial = String::from_utf8(writer.written).unwrap();
    assert_eq!(partial.matches('\n').count(), 20);
    assert!(partial.starts_with("; zigline\n"));
}

/// Sink that fails on the n-th move and counts `finish` calls.
struct Flaky {
    moves_left: usize,
    finished: usize,
}

impl MotionSink for Flaky {
    fn lift_pen(&mut self) -> Result<(), EmitError> {
        Ok(())
    }

    fn lower_pen(&mut self) -> Result<(), EmitError> {
        Ok(())
    }

    fn move_to(&mut self, _x: f64, _y: f64) -> Result<(), EmitError> {
        if self.moves_left == 0 {
            return Err(EmitError::SinkFailure(io::Error::other("jammed")));
        }
        self.moves_left -= 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), EmitError> {
        self.finished += 1;
        Ok(())
    }
}

#[test]
fn custom_sink_failure_releases_the_sink_once() {
    let img = portrait();
    let mut sink = Flaky {
        moves_left: 3,
        finished: 0,
    };
    let err = convert(&img, &ScanParameters::default(), &mut sink, &GcodeMetadata::default())
        .unwrap_err();
    assert_eq!(err.to_string(), "failed to write motion commands: jammed");
    assert_eq!(sink.moves_left, 0);
    assert_eq!(sink.finished, 1);
}

#[test]
fn generated_toolpath_emits_the_same_program() {
    let img = portrait();
    let params = ScanParameters::default();
    let metadata = GcodeMetadata {
        title: Some("portrait"),
        ..GcodeMetadata::default()
    };

    let mut streamed = GcodeSink::new(Vec::new());
    convert(&img, &params, &mut streamed, &metadata).unwrap();

    let toolpath = zigline_pipeline::scan(&img, &params).unwrap();
    let mut replayed = GcodeSink::new(Vec::new());
    emit_toolpath(&toolpath, &mut replayed, &metadata).unwrap();

    assert_eq!(streamed.into_inner(), replayed.into_inner());
}

#[test]
fn generated_toolpath_failure_releases_the_sink_once() {
    let toolpath = zigline_pipeline::scan(&portrait(), &ScanParameters::default()).unwrap();
    let mut sink = Flaky {
        moves_left: 2,
        finished: 0,
    };
    let err = emit_toolpath(&toolpath, &mut sink, &GcodeMetadata::default()).unwrap_err();
    assert!(matches!(err, EmitError::SinkFailure(_)));
    assert_eq!(sink.finished, 1);
}

#[test]
fn preview_svg_draws_the_dark_parts() {
    let img = portrait();
    let toolpath = zigline_pipeline::scan(&img, &ScanParameters::default()).unwrap();
    let svg = to_svg(
        &toolpath,
        &SvgMetadata {
            title: Some("portrait"),
            ..SvgMetadata::default()
        },
        &SvgOptions::default(),
    );
    assert!(svg.contains("<title>portrait</title>"));
    assert!(svg.contains("<path"));
    assert!(svg.contains("</svg>"));
}

#[test]
fn white_image_preview_has_no_drawn_paths() {
    let img = GrayImage::from_pixel(30, 30, Luma([255]));
    let toolpath = zigline_pipeline::scan(&img, &ScanParameters::default()).unwrap();
    let svg = to_svg(&toolpath, &SvgMetadata::default(), &SvgOptions::default());
    assert!(!svg.contains("<path"));
}

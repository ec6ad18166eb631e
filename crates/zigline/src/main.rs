//! zigline: convert an image into pulse-line G-code for a pen plotter.
//!
//! Reads an image, optionally shapes its tones, scans it into a
//! zigzag toolpath and writes G-code to a file or stdout. SVG and PNG
//! previews of the same toolpath can be written alongside.
//!
//! # Usage
//!
//! ```text
//! zigline [OPTIONS] <IMAGE_PATH>
//! zigline portrait.jpg -o portrait.gcode --svg preview.svg
//! zigline portrait.jpg --config job.json > portrait.gcode
//! ```
//!
//! Logs go to stderr; `RUST_LOG` overrides `-v`/`-q`.

mod preview;

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{ArgAction, Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use zigline_export::{GcodeMetadata, GcodeOptions, GcodeSink, SvgMetadata, SvgOptions};
use zigline_pipeline::{
    PipelineError, Preprocess, ScanDirection, ScanParameters, ScanPathGenerator,
};

/// Convert raster images into zigzag pulse-line G-code for pen plotters.
///
/// Dark areas become tall pen-down zigzags, light areas a pen-up glide.
#[derive(Parser, Debug)]
#[command(name = "zigline", version)]
struct Cli {
    /// Path to the input image (PNG, JPEG, BMP, WebP).
    image_path: PathBuf,

    /// Write G-code here instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Scan line orientation.
    #[arg(long, value_enum, default_value_t = CLI_DEFAULT_DIRECTION)]
    direction: Direction,

    /// Scan line spacing, in tool diameters.
    #[arg(long, default_value_t = ScanParameters::DEFAULT_BLOCK_SCALE)]
    block_scale: f64,

    /// Pen tip diameter; also the zigzag step along a line.
    #[arg(long, default_value_t = ScanParameters::DEFAULT_TOOL_DIAMETER)]
    tool_diameter: f64,

    /// Paper width in centimetres.
    #[arg(long, default_value_t = ScanParameters::DEFAULT_PAPER_WIDTH)]
    paper_width: f64,

    /// Paper height in centimetres.
    #[arg(long, default_value_t = ScanParameters::DEFAULT_PAPER_HEIGHT)]
    paper_height: f64,

    /// Fraction of the paper the picture may use (0, 1].
    #[arg(long, default_value_t = ScanParameters::DEFAULT_MARGIN_FACTOR)]
    margin: f64,

    /// Tone curve exponent: 1 is linear, 2 lightens mid-tones.
    #[arg(long, default_value_t = ScanParameters::DEFAULT_TONE_EXPONENT)]
    tone_exponent: f64,

    /// Gaussian blur sigma in pixels before scanning (0 disables).
    #[arg(long, default_value_t = Preprocess::DEFAULT_BLUR_SIGMA)]
    blur_sigma: f32,

    /// Equalize the image histogram before scanning.
    #[arg(long)]
    equalize: bool,

    /// Invert the image, inking the light areas.
    #[arg(long)]
    invert: bool,

    /// Z value for pen up.
    #[arg(long, default_value_t = GcodeOptions::DEFAULT_PEN_UP_Z, allow_negative_numbers = true)]
    pen_up_z: f64,

    /// Z value for pen down.
    #[arg(long, default_value_t = GcodeOptions::DEFAULT_PEN_DOWN_Z, allow_negative_numbers = true)]
    pen_down_z: f64,

    /// Tool number selected in the program preamble.
    #[arg(long, default_value_t = GcodeOptions::DEFAULT_TOOL_NUMBER)]
    tool_number: u32,

    /// Full job config as a JSON string.
    ///
    /// When provided, all other scan, preprocess and G-code flags are
    /// ignored. Missing fields take their defaults.
    #[arg(long, conflicts_with = "config")]
    config_json: Option<String>,

    /// Read the full job config from a JSON file (see `--config-json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Also write an SVG preview.
    #[arg(long)]
    svg: Option<PathBuf>,

    /// Draw pen-up travel in the SVG preview.
    #[arg(long)]
    show_travel: bool,

    /// Also write a PNG preview.
    #[arg(long)]
    png: Option<PathBuf>,

    /// PNG preview width in pixels.
    #[arg(long, default_value_t = 1200, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(16..=16384))]
    png_width: u32,

    /// More log output (-v debug, -vv trace).
    #[arg(short, long, action = ArgAction::Count, conflicts_with = "quiet")]
    verbose: u8,

    /// Only log warnings and errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Scan direction selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Direction {
    /// Lines run left/right and step upward.
    Horizontal,
    /// Lines run up/down and step rightward.
    Vertical,
}

/// Maps a [`ScanDirection`] to the local CLI [`Direction`] enum.
const fn direction_from_pipeline(d: ScanDirection) -> Direction {
    match d {
        ScanDirection::Horizontal => Direction::Horizontal,
        ScanDirection::Vertical => Direction::Vertical,
    }
}

/// The CLI default direction, derived from
/// [`ScanParameters::DEFAULT_DIRECTION`] so the two cannot diverge.
const CLI_DEFAULT_DIRECTION: Direction = direction_from_pipeline(ScanParameters::DEFAULT_DIRECTION);

/// Everything that shapes the output, as stored in `--config` files
/// and embedded in the generated program.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct JobConfig {
    scan: ScanParameters,
    preprocess: Preprocess,
    gcode: GcodeOptions,
}

impl JobConfig {
    /// Reject unusable scan or preprocessing settings before any file
    /// is read.
    fn validate(&self) -> Result<(), PipelineError> {
        self.scan.validate()?;
        self.preprocess.validate()
    }
}

/// Build a [`JobConfig`] from CLI arguments.
///
/// `--config-json` or `--config` replace the individual flags entirely.
fn config_from_cli(cli: &Cli) -> Result<JobConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }
    if let Some(ref path) = cli.config {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("Error reading {}: {e}", path.display()))?;
        return serde_json::from_str(&text)
            .map_err(|e| format!("Error parsing {}: {e}", path.display()));
    }

    Ok(JobConfig {
        scan: ScanParameters {
            direction: match cli.direction {
                Direction::Horizontal => ScanDirection::Horizontal,
                Direction::Vertical => ScanDirection::Vertical,
            },
            block_scale: cli.block_scale,
            tool_diameter: cli.tool_diameter,
            paper_width: cli.paper_width,
            paper_height: cli.paper_height,
            margin_factor: cli.margin,
            tone_exponent: cli.tone_exponent,
        },
        preprocess: Preprocess {
            blur_sigma: cli.blur_sigma,
            equalize: cli.equalize,
            invert: cli.invert,
        },
        gcode: GcodeOptions {
            pen_up_z: cli.pen_up_z,
            pen_down_z: cli.pen_down_z,
            tool_number: cli.tool_number,
        },
    })
}

/// Log filter for the verbosity flags, unless `RUST_LOG` is set.
fn env_filter(verbose: u8, quiet: bool) -> EnvFilter {
    let level = match (quiet, verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

fn init_logging(cli: &Cli) {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(cli.verbose, cli.quiet))
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            error!("{msg}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), String> {
    let config = config_from_cli(cli)?;
    config
        .validate()
        .map_err(|e| format!("Config error: {e}"))?;
    let generator =
        ScanPathGenerator::new(config.scan.clone()).map_err(|e| format!("Config error: {e}"))?;

    let image_bytes = std::fs::read(&cli.image_path)
        .map_err(|e| format!("Error reading {}: {e}", cli.image_path.display()))?;
    info!(
        image = %cli.image_path.display(),
        bytes = image_bytes.len(),
        "loaded image"
    );

    let gray = zigline_pipeline::grayscale::decode_and_grayscale(&image_bytes)
        .map_err(|e| format!("Error decoding {}: {e}", cli.image_path.display()))?;
    let gray = config.preprocess.apply(&gray);

    let title = cli
        .image_path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("image");
    let description = describe(&config.scan);
    let config_json =
        serde_json::to_string(&config).map_err(|e| format!("Error serializing config: {e}"))?;

    let out: Box<dyn Write> = match cli.output {
        Some(ref path) => Box::new(
            File::create(path).map_err(|e| format!("Error creating {}: {e}", path.display()))?,
        ),
        None => Box::new(io::stdout().lock()),
    };
    let mut sink = GcodeSink::with_options(BufWriter::new(out), config.gcode.clone());
    let metadata = GcodeMetadata {
        title: Some(title),
        description: Some(&description),
        config_json: Some(&config_json),
    };
    // Previews reuse the toolpath; without them it is streamed.
    let (summary, toolpath) = if cli.svg.is_some() || cli.png.is_some() {
        let toolpath = generator
            .generate(&gray)
            .map_err(|e| format!("Conversion failed: {e}"))?;
        zigline_export::emit_toolpath(&toolpath, &mut sink, &metadata)
            .map_err(|e| format!("Conversion failed: {e}"))?;
        (toolpath.summary, Some(toolpath))
    } else {
        let summary = zigline_export::convert(&gray, generator.params(), &mut sink, &metadata)
            .map_err(|e| format!("Conversion failed: {e}"))?;
        (summary, None)
    };
    info!(
        lines = summary.lines,
        points = summary.points,
        pen_down = summary.pen_down_points,
        "G-code written"
    );

    if let Some(toolpath) = toolpath {
        if let Some(ref path) = cli.svg {
            let svg = zigline_export::to_svg(
                &toolpath,
                &SvgMetadata {
                    title: Some(title),
                    description: Some(&description),
                    config_json: Some(&config_json),
                },
                &SvgOptions {
                    stroke_width: config.scan.tool_diameter,
                    show_travel: cli.show_travel,
                },
            );
            write_file(path, svg.as_bytes())?;
            info!(path = %path.display(), bytes = svg.len(), "SVG preview written");
        }

        if let Some(ref path) = cli.png {
            let img = preview::render(&toolpath, cli.png_width, config.scan.tool_diameter)?;
            img.save(path)
                .map_err(|e| format!("Error writing {}: {e}", path.display()))?;
            info!(
                path = %path.display(),
                width = img.width(),
                height = img.height(),
                "PNG preview written"
            );
        }
    }

    Ok(())
}

/// One-line human-readable summary of the scan settings.
fn describe(scan: &ScanParameters) -> String {
    format!(
        "{} scan, block {}, tool {}, paper {}x{} cm, margin {}, tone {}",
        scan.direction,
        scan.block_scale,
        scan.tool_diameter,
        scan.paper_width,
        scan.paper_height,
        scan.margin_factor,
        scan.tone_exponent,
    )
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), String> {
    std::fs::write(path, bytes).map_err(|e| format!("Error writing {}: {e}", path.display()))
}

//! SVG preview serializer.
//!
//! Renders a [`Toolpath`] as an SVG document using the [`svg`] crate
//! for document construction, XML escaping, and path data formatting.
//!
//! Every run of pen-down moves becomes one `<path>`. A run starts at
//! the point where the pen was lowered, since the plotter lowers the
//! pen in place before moving to the first pen-down point. Pen-up
//! travel can optionally be drawn as thin dashed paths.
//!
//! Coordinates stay in plotter units (millimetres); the `viewBox`
//! covers every point and the paper rectangle. Paper Y grows upward
//! and SVG Y grows downward, so Y is negated.
//!
//! This is a pure function with no I/O -- it returns a `String`.

use svg::Document;
use svg::node::element::path::Data;
use svg::node::element::{Description, Element, Group, Path, Title};
use svg::node::{Node, Text, Value};

use zigline_pipeline::{PathPoint, Toolpath};

/// Metadata to embed in the SVG document.
///
/// All fields are optional. Text values are XML-escaped automatically
/// by the `svg` crate.
#[derive(Debug, Clone, Default)]
pub struct SvgMetadata<'a> {
    /// Document title, emitted as `<title>`.
    ///
    /// Typically the source image filename.
    pub title: Option<&'a str>,

    /// Document description, emitted as `<desc>`.
    pub description: Option<&'a str>,

    /// Serialized scan parameters, emitted inside `<metadata>` as a
    /// namespaced `<zigline:scan>` element for reproducibility.
    pub config_json: Option<&'a str>,
}

/// Rendering options for [`to_svg`].
#[derive(Debug, Clone, PartialEq)]
pub struct SvgOptions {
    /// Stroke width of pen-down paths, in plotter units.
    pub stroke_width: f64,
    /// Draw pen-up travel as dashed lines.
    pub show_travel: bool,
}

impl SvgOptions {
    /// Default stroke width in plotter units, a fine pen tip.
    pub const DEFAULT_STROKE_WIDTH: f64 = 0.35;
    /// Travel is hidden unless asked for.
    pub const DEFAULT_SHOW_TRAVEL: bool = false;
}

impl Default for SvgOptions {
    fn default() -> Self {
        Self {
            stroke_width: Self::DEFAULT_STROKE_WIDTH,
            show_travel: Self::DEFAULT_SHOW_TRAVEL,
        }
    }
}

/// Namespace URI for the embedded scan configuration.
const CONFIG_NAMESPACE: &str = "https://github.com/zigline/zigline/ns/1";

/// Split a toolpath into pen-down runs and pen-up travel runs.
///
/// Each run is a polyline in paper coordinates with at least two
/// points. Both kinds share their boundary points with each other.
#[must_use]
pub fn split_runs(points: &[PathPoint]) -> (Vec<Vec<(f64, f64)>>, Vec<Vec<(f64, f64)>>) {
    let mut drawn = Vec::new();
    let mut travel = Vec::new();
    let mut draw_run: Vec<(f64, f64)> = Vec::new();
    let mut travel_run: Vec<(f64, f64)> = Vec::new();
    let mut prev: Option<(f64, f64)> = None;

    for point in points {
        let here = (point.x, point.y);
        let (run, other, other_out) = if point.pen_up {
            (&mut travel_run, &mut draw_run, &mut drawn)
        } else {
            (&mut draw_run, &mut travel_run, &mut travel)
        };
        if run.is_empty() {
            if let Some(p) = prev {
                run.push(p);
            }
        }
        run.push(here);
        flush(other, other_out);
        prev = Some(here);
    }
    flush(&mut draw_run, &mut drawn);
    flush(&mut travel_run, &mut travel);
    (drawn, travel)
}

fn flush(run: &mut Vec<(f64, f64)>, out: &mut Vec<Vec<(f64, f64)>>) {
    if run.len() >= 2 {
        out.push(std::mem::take(run));
    } else {
        run.clear();
    }
}

/// Build an SVG path `d` attribute from a paper-space polyline,
/// negating Y. Empty for fewer than two points.
///
/// # Examples
///
/// ```
/// use zigline_export::svg::build_path_data;
///
/// let d = build_path_data(&[(10.0, 20.0), (30.0, -40.0)]);
/// assert_eq!(d, "M10,-20 L30,40");
/// ```
#[must_use]
pub fn build_path_data(run: &[(f64, f64)]) -> String {
    let [first, rest @ ..] = run else {
        return String::new();
    };
    if rest.is_empty() {
        return String::new();
    }
    let mut data = Data::new().move_to((first.0, flip(first.1)));
    for &(x, y) in rest {
        data = data.line_to((x, flip(y)));
    }
    String::from(Value::from(data))
}

/// Paper Y to SVG Y. Subtracting from zero keeps `0` from printing as `-0`.
fn flip(y: f64) -> f64 {
    0.0 - y
}

/// Bounding box `(min_x, min_y, max_x, max_y)` of the paper rectangle
/// and every point, in paper coordinates.
#[must_use]
pub fn bounds(toolpath: &Toolpath) -> (f64, f64, f64, f64) {
    let r = toolpath.rect;
    toolpath.points.iter().fold(
        (r.x_start, r.y_start, r.x_end, r.y_end),
        |(x0, y0, x1, y1), p| (x0.min(p.x), y0.min(p.y), x1.max(p.x), y1.max(p.y)),
    )
}

/// Serialize a toolpath into an SVG string.
#[must_use]
pub fn to_svg(toolpath: &Toolpath, metadata: &SvgMetadata<'_>, options: &SvgOptions) -> String {
    let (min_x, min_y, max_x, max_y) = bounds(toolpath);
    let pad = options.stroke_width;
    let width = 2.0f64.mul_add(pad, max_x - min_x);
    let height = 2.0f64.mul_add(pad, max_y - min_y);
    // SVG top edge is the paper's highest Y.
    let top = flip(max_y) - pad;
    let left = min_x - pad;

    let mut doc = Document::new()
        .set("width", format!("{width}mm"))
        .set("height", format!("{height}mm"))
        .set("viewBox", format!("{left} {top} {width} {height}"));

    if let Some(title) = metadata.title {
        doc = doc.add(Title::new(title));
    }
    if let Some(description) = metadata.description {
        doc = doc.add(Description::new().add(Text::new(description)));
    }
    if let Some(config_json) = metadata.config_json {
        let mut scan_el = Element::new("zigline:scan");
        scan_el.assign("xmlns:zigline", CONFIG_NAMESPACE);
        scan_el.append(Text::new(config_json));
        let mut metadata_el = Element::new("metadata");
        metadata_el.append(scan_el);
        doc = doc.add(metadata_el);
    }

    let (drawn, travel) = split_runs(&toolpath.points);

    if options.show_travel && !travel.is_empty() {
        let mut group = Group::new()
            .set("fill", "none")
            .set("stroke", "#c04040")
            .set("stroke-width", options.stroke_width / 4.0)
            .set(
                "stroke-dasharray",
                format!("{} {}", options.stroke_width, options.stroke_width),
            );
        for run in &travel {
            group = group.add(Path::new().set("d", build_path_data(run)));
        }
        doc = doc.add(group);
    }

    for run in &drawn {
        let path = Path::new()
            .set("d", build_path_data(run))
            .set("fill", "none")
            .set("stroke", "black")
            .set("stroke-width", options.stroke_width)
            .set("stroke-linejoin", "round");
        doc = doc.add(path);
    }

    // The svg crate omits the XML declaration, so we prepend it.
    format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{doc}\n")
}

//! Raster preview of a toolpath via tiny-skia.
//!
//! Pen-down runs are stroked in black on white paper, scaled so the
//! toolpath bounds fill `width` pixels. Paper Y is flipped to image Y.

use image::RgbaImage;
use tiny_skia::{Color, LineCap, LineJoin, Paint, PathBuilder, Pixmap, Stroke, Transform};
use zigline_export::svg::{bounds, split_runs};
use zigline_pipeline::Toolpath;

/// Border around the drawing, in pixels.
const BORDER_PX: f64 = 8.0;

/// Render `toolpath` into an RGBA image `width` pixels wide.
///
/// `pen_width` is the pen tip width in plotter units; strokes are never
/// thinner than one pixel.
///
/// # Errors
///
/// Returns a message when the requested size cannot be allocated.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn render(toolpath: &Toolpath, width: u32, pen_width: f64) -> Result<RgbaImage, String> {
    let (min_x, min_y, max_x, max_y) = bounds(toolpath);
    let span_x = (max_x - min_x).max(f64::EPSILON);
    let span_y = (max_y - min_y).max(0.0);
    let scale = 2.0f64.mul_add(-BORDER_PX, f64::from(width)).max(1.0) / span_x;
    let height = 2.0f64.mul_add(BORDER_PX, span_y * scale).ceil().max(1.0) as u32;

    let Some(mut pixmap) = Pixmap::new(width, height) else {
        return Err(format!("cannot allocate a {width}x{height} preview"));
    };
    pixmap.fill(Color::WHITE);

    let to_px = |x: f64, y: f64| {
        (
            (x - min_x).mul_add(scale, BORDER_PX) as f32,
            (max_y - y).mul_add(scale, BORDER_PX) as f32,
        )
    };

    let (drawn, _) = split_runs(&toolpath.points);
    let mut pb = PathBuilder::new();
    for run in &drawn {
        let Some((&(x0, y0), rest)) = run.split_first() else {
            continue;
        };
        let (px, py) = to_px(x0, y0);
        pb.move_to(px, py);
        for &(x, y) in rest {
            let (px, py) = to_px(x, y);
            pb.line_to(px, py);
        }
    }

    if let Some(path) = pb.finish() {
        let stroke = Stroke {
            width: (pen_width * scale).max(1.0) as f32,
            line_cap: LineCap::Round,
            line_join: LineJoin::Round,
            ..Stroke::default()
        };
        let mut paint = Paint::default();
        paint.set_color_rgba8(0, 0, 0, 255);
        paint.anti_alias = true;
        pixmap.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
    }

    // Opaque white background: premultiplied and straight RGBA agree.
    RgbaImage::from_raw(width, height, pixmap.take())
        .ok_or_else(|| "preview buffer has unexpected size".to_string())
}

//! Block-intensity sampling of the source image from paper space.
//!
//! A paper-space query box is mapped linearly onto the image pixel
//! grid, with the Y axis inverted (paper Y grows upward, image rows
//! grow downward). Pixel bounds are truncated and clamped to
//! `[0, W-1] x [0, H-1]`, then every pixel strictly inside the clamped
//! box contributes equally to the average. A clamped box holding no
//! pixels reads as pure white, so the pen stays lifted beyond the
//! picture. The last row and column only ever act as an upper bound.

use image::GrayImage;

use crate::types::PaperRect;

/// Intensity reported for a box that covers no pixels.
pub const WHITE: f64 = 255.0;

/// Average intensity (0 = black, 255 = white) of the image region under
/// the paper-space box `(qx0, qy0)`–`(qx1, qy1)`.
///
/// `qx0 <= qx1` and `qy0 <= qy1` are expected; an inverted box covers
/// nothing and reads as [`WHITE`]. Never fails: out-of-range boxes are
/// clipped to the image.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn sample_region(
    image: &GrayImage,
    rect: &PaperRect,
    qx0: f64,
    qy0: f64,
    qx1: f64,
    qy1: f64,
) -> f64 {
    let width = f64::from(image.width());
    let height = f64::from(image.height());

    let px0 = (qx0 - rect.x_start) / rect.width() * width;
    let px1 = (qx1 - rect.x_start) / rect.width() * width;
    // Paper top (qy1) is the smaller image row.
    let py0 = height - (qy1 - rect.y_start) / rect.height() * height;
    let py1 = height - (qy0 - rect.y_start) / rect.height() * height;

    let (Some((x_lo, x_hi)), Some((y_lo, y_hi))) = (
        pixel_span(px0, px1, image.width()),
        pixel_span(py0, py1, image.height()),
    ) else {
        return WHITE;
    };

    let mut total: u64 = 0;
    for y in y_lo..y_hi {
        for x in x_lo..x_hi {
            total += u64::from(image.get_pixel(x, y).0[0]);
        }
    }
    let count = u64::from(x_hi - x_lo) * u64::from(y_hi - y_lo);

    total as f64 / count as f64
}

/// Half-open pixel range `floor(lo)..floor(hi)`, both ends clamped to
/// `0..=len-1`. `None` when the range holds no pixels.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn pixel_span(lo: f64, hi: f64, len: u32) -> Option<(u32, u32)> {
    if lo.is_nan() || hi.is_nan() {
        return None;
    }
    let last = f64::from(len.saturating_sub(1));
    let first = lo.floor().clamp(0.0, last);
    let end = hi.floor().clamp(0.0, last);
    (first < end).then(|| (first as u32, end as u32))
}

#[cfg(test)]
mod tests {
    use image::Luma;
    use proptest::prelude::*;

    use super::*;

    /// Rectangle mapping one paper unit to one pixel for a `w × h` image.
    fn unit_rect(w: u32, h: u32) -> PaperRect {
        let hw = f64::from(w) / 2.0;
        let hh = f64::from(h) / 2.0;
        PaperRect {
            x_start: -hw,
            y_start: -hh,
            x_end: hw,
            y_end: hh,
        }
    }

    /// 2x2 checkerboard: black at top-left and bottom-right.
    fn checker() -> GrayImage {
        GrayImage::from_fn(2, 2, |x, y| if x == y { Luma([0]) } else { Luma([255]) })
    }

    #[test]
    fn average_excludes_last_row_and_column() {
        // 3x3 image: the top-left 2x2 block averages 100.
        let img = GrayImage::from_fn(3, 3, |x, y| match (x, y) {
            (0, 0) | (1, 1) => Luma([50]),
            (1, 0) | (0, 1) => Luma([150]),
            _ => Luma([0]),
        });
        let rect = unit_rect(3, 3);
        let z = sample_region(&img, &rect, -1.5, -1.5, 1.5, 1.5);
        assert!((z - 100.0).abs() < 1e-9, "got {z}");
    }

    #[test]
    fn top_left_quadrant_is_black() {
        // Paper top-left is image row 0, column 0.
        let img = checker();
        let rect = unit_rect(2, 2);
        let z = sample_region(&img, &rect, -1.0, 0.0, 0.0, 1.0);
        assert!(z.abs() < 1e-9, "expected black, got {z}");
    }

    #[test]
    fn y_axis_is_flipped() {
        // Top row black, bottom row white.
        let img = GrayImage::from_fn(4, 4, |_, y| if y < 2 { Luma([0]) } else { Luma([255]) });
        let rect = unit_rect(4, 4);
        let top = sample_region(&img, &rect, -2.0, 0.0, 2.0, 2.0);
        let bottom = sample_region(&img, &rect, -2.0, -2.0, 2.0, 0.0);
        assert!(top < 1.0);
        assert!(bottom > 254.0);
    }

    #[test]
    fn box_overhanging_edge_is_clipped() {
        let img = GrayImage::from_pixel(4, 4, Luma([40]));
        let rect = unit_rect(4, 4);
        let z = sample_region(&img, &rect, 0.0, 0.0, 50.0, 50.0);
        assert!((z - 40.0).abs() < 1e-9);
    }

    #[test]
    fn box_outside_image_is_white() {
        let img = GrayImage::from_pixel(4, 4, Luma([0]));
        let rect = unit_rect(4, 4);
        assert!((sample_region(&img, &rect, 10.0, 10.0, 20.0, 20.0) - WHITE).abs() < 1e-9);
        assert!((sample_region(&img, &rect, -20.0, -1.0, -10.0, 1.0) - WHITE).abs() < 1e-9);
    }

    #[test]
    fn zero_area_box_is_white() {
        let img = GrayImage::from_pixel(4, 4, Luma([0]));
        let rect = unit_rect(4, 4);
        assert!((sample_region(&img, &rect, 0.3, -1.0, 0.3, 1.0) - WHITE).abs() < 1e-9);
    }

    #[test]
    fn inverted_box_is_white() {
        let img = GrayImage::from_pixel(4, 4, Luma([0]));
        let rect = unit_rect(4, 4);
        assert!((sample_region(&img, &rect, 1.0, 1.0, -1.0, -1.0) - WHITE).abs() < 1e-9);
    }

    #[test]
    fn box_inside_one_pixel_is_white() {
        // 2x2 black image on a rectangle of ±10: ten units per pixel.
        let img = GrayImage::from_pixel(2, 2, Luma([0]));
        let rect = PaperRect {
            x_start: -10.0,
            y_start: -10.0,
            x_end: 10.0,
            y_end: 10.0,
        };
        // Pixel coordinates [0.2, 0.4] on both axes.
        let z = sample_region(&img, &rect, -8.0, 6.0, -6.0, 8.0);
        assert!((z - WHITE).abs() < 1e-9, "got {z}");
    }

    #[test]
    fn box_over_only_the_last_column_is_white() {
        let img = GrayImage::from_pixel(2, 2, Luma([0]));
        let rect = PaperRect {
            x_start: -10.0,
            y_start: -10.0,
            x_end: 10.0,
            y_end: 10.0,
        };
        // Pixel x in [1, 2], full height.
        let z = sample_region(&img, &rect, 0.0, -10.0, 10.0, 10.0);
        assert!((z - WHITE).abs() < 1e-9, "got {z}");
    }

    #[test]
    fn empty_image_is_white() {
        let img = GrayImage::new(0, 0);
        let rect = unit_rect(4, 4);
        assert!((sample_region(&img, &rect, -2.0, -2.0, 2.0, 2.0) - WHITE).abs() < 1e-9);
    }

    #[test]
    fn pixel_span_truncates_and_clamps() {
        assert_eq!(pixel_span(0.5, 1.5, 4), Some((0, 1)));
        assert_eq!(pixel_span(0.0, 2.0, 4), Some((0, 2)));
        assert_eq!(pixel_span(0.6, 2.9, 4), Some((0, 2)));
        assert_eq!(pixel_span(-3.0, 10.0, 4), Some((0, 3)));
        assert_eq!(pixel_span(0.2, 0.4, 4), None);
        assert_eq!(pixel_span(3.0, 4.0, 4), None);
        assert_eq!(pixel_span(5.0, 10.0, 4), None);
        assert_eq!(pixel_span(-5.0, -1.0, 4), None);
        assert_eq!(pixel_span(1.0, 1.0, 4), None);
        assert_eq!(pixel_span(f64::NAN, 1.0, 4), None);
    }

    proptest! {
        #[test]
        fn output_is_always_an_intensity(
            seed in any::<u8>(),
            qx0 in -500.0f64..500.0,
            qy0 in -500.0f64..500.0,
            dx in 0.0f64..400.0,
            dy in 0.0f64..400.0,
        ) {
            let img = GrayImage::from_fn(7, 5, |x, y| {
                Luma([seed.wrapping_mul(31).wrapping_add((x * 13 + y * 7) as u8)])
            });
            let rect = unit_rect(7, 5);
            let z = sample_region(&img, &rect, qx0, qy0, qx0 + dx, qy0 + dy);
            prop_assert!((0.0..=255.0).contains(&z));
        }
    }
}

//! Pure geometry for face boxes: clamping, padding, cropping and rescaling
//! between the shrunk provider submission and the original photo.

use image::DynamicImage;

use crate::models::FaceCoordinates;

/// Box as returned by a detection provider: top-left corner plus size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawBox {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

pub fn clamp(v: i64, lo: i64, hi: i64) -> i64 {
    v.max(lo).min(hi)
}

/// Maps a coordinate measured in a resized image back to the original image.
/// `scale` is the factor the original was multiplied by (`0 < scale <= 1`).
pub fn rescale(coord: i64, scale: f64) -> i64 {
    if scale >= 1.0 || scale <= 0.0 {
        return coord;
    }
    (coord as f64 / scale).round() as i64
}

pub fn rescale_box(raw: RawBox, scale: f64) -> RawBox {
    RawBox {
        x: rescale(raw.x, scale),
        y: rescale(raw.y, scale),
        width: rescale(raw.width, scale),
        height: rescale(raw.height, scale),
    }
}

/// Grows `raw` by `padding` on every side, then clamps to `[0,width]x[0,height]`.
/// Returns `None` when nothing of the box is left inside the image.
pub fn pad_and_clamp(raw: RawBox, padding: i64, width: u32, height: u32) -> Option<FaceCoordinates> {
    let (w, h) = (width as i64, height as i64);
    let x1 = clamp(raw.x - padding, 0, w);
    let y1 = clamp(raw.y - padding, 0, h);
    let x2 = clamp(raw.x + raw.width + padding, 0, w);
    let y2 = clamp(raw.y + raw.height + padding, 0, h);
    if x2 <= x1 || y2 <= y1 {
        return None;
    }
    Some(FaceCoordinates { x1: x1 as u32, y1: y1 as u32, x2: x2 as u32, y2: y2 as u32 })
}

/// Clamps a user-supplied box: `x1,y1` into the image, `x2,y2` into
/// `[x1,width]` / `[y1,height]`. Inverted ranges collapse instead of failing.
pub fn clamp_box(x1: i64, y1: i64, x2: i64, y2: i64, width: u32, height: u32) -> FaceCoordinates {
    let (w, h) = (width as i64, height as i64);
    let x1 = clamp(x1, 0, w);
    let y1 = clamp(y1, 0, h);
    let x2 = clamp(x2, x1, w);
    let y2 = clamp(y2, y1, h);
    FaceCoordinates { x1: x1 as u32, y1: y1 as u32, x2: x2 as u32, y2: y2 as u32 }
}

/// Pixel region `[x1,x2) x [y1,y2)` of `img`. Caller clamps first; the region
/// is intersected with the image once more so it can never read out of bounds.
pub fn crop_rect(img: &DynamicImage, c: FaceCoordinates) -> DynamicImage {
    let x1 = c.x1.min(img.width());
    let y1 = c.y1.min(img.height());
    let x2 = c.x2.min(img.width()).max(x1);
    let y2 = c.y2.min(img.height()).max(y1);
    img.crop_imm(x1, y1, x2 - x1, y2 - y1)
}

/// Dimensions after shrinking so the long edge is at most `max_edge`, and the
/// factor used. Images already within the limit are left alone (`scale == 1.0`).
pub fn fit_long_edge(width: u32, height: u32, max_edge: u32) -> (u32, u32, f64) {
    let max_edge = max_edge.max(1);
    let long_edge = width.max(height);
    if long_edge <= max_edge || long_edge == 0 {
        return (width, height, 1.0);
    }
    let scale = max_edge as f64 / long_edge as f64;
    let w = (width as u64 * max_edge as u64 / long_edge as u64).max(1) as u32;
    let h = (height as u64 * max_edge as u64 / long_edge as u64).max(1) as u32;
    (w, h, scale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn clamp_bounds() {
        assert_eq!(clamp(-5, 0, 10), 0);
        assert_eq!(clamp(15, 0, 10), 10);
        assert_eq!(clamp(7, 0, 10), 7);
    }

    #[test]
    fn rescale_is_identity_without_resize() {
        assert_eq!(rescale(123, 1.0), 123);
        assert_eq!(rescale_box(RawBox { x: 1, y: 2, width: 3, height: 4 }, 1.0), RawBox { x: 1, y: 2, width: 3, height: 4 });
    }

    #[test]
    fn rescale_round_trips_within_a_pixel() {
        let (_, _, scale) = fit_long_edge(6000, 4000, 4000);
        for original in [0i64, 1, 149, 150, 1234, 5999] {
            let shrunk = (original as f64 * scale).round() as i64;
            let back = rescale(shrunk, scale);
            assert!((back - original).abs() <= 1, "{} -> {} -> {}", original, shrunk, back);
        }
    }

    #[test]
    fn fit_long_edge_zero_limit_keeps_a_usable_scale() {
        let (w, h, scale) = fit_long_edge(400, 200, 0);
        assert_eq!((w, h), (1, 1));
        assert!(scale > 0.0 && scale < 1.0);
        assert_eq!(rescale(1, scale), 400);
    }

    #[test]
    fn fit_long_edge_shrinks_landscape() {
        assert_eq!(fit_long_edge(6000, 4000, 4000), (4000, 2666, 4000.0 / 6000.0));
        assert_eq!(fit_long_edge(3000, 2000, 4000), (3000, 2000, 1.0));
        let (w, h, _) = fit_long_edge(2000, 8000, 4000);
        assert_eq!((w, h), (1000, 4000));
    }

    #[test]
    fn pad_and_clamp_expands_then_limits() {
        let c = pad_and_clamp(RawBox { x: 5, y: 50, width: 20, height: 20 }, 10, 100, 75).unwrap();
        assert_eq!(c, FaceCoordinates { x1: 0, y1: 40, x2: 35, y2: 75 });
    }

    #[test]
    fn pad_and_clamp_drops_boxes_outside_image() {
        assert!(pad_and_clamp(RawBox { x: 500, y: 500, width: 20, height: 20 }, 0, 100, 100).is_none());
    }

    #[test]
    fn clamp_box_collapses_inverted_ranges() {
        let c = clamp_box(80, 10, 20, 5, 100, 100);
        assert_eq!(c, FaceCoordinates { x1: 80, y1: 10, x2: 80, y2: 10 });
        let c = clamp_box(-10, -10, 500, 500, 100, 60);
        assert_eq!(c, FaceCoordinates { x1: 0, y1: 0, x2: 100, y2: 60 });
    }

    #[test]
    fn crop_matches_requested_size_and_pixels() {
        let mut img = RgbImage::new(40, 30);
        img.put_pixel(12, 7, Rgb([255, 0, 0]));
        let img = DynamicImage::ImageRgb8(img);
        for (x1, y1, x2, y2) in [(10, 5, 20, 15), (0, 0, 40, 30), (-3, -3, 999, 999)] {
            let c = clamp_box(x1, y1, x2, y2, 40, 30);
            let out = crop_rect(&img, c);
            assert_eq!((out.width(), out.height()), (c.width(), c.height()));
        }
        let out = crop_rect(&img, FaceCoordinates { x1: 10, y1: 5, x2: 20, y2: 15 });
        assert_eq!(out.to_rgb8().get_pixel(2, 2), &Rgb([255, 0, 0]));
    }
}

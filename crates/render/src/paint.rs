//! Destructive painting on raster buffers.

use image::{Rgba, RgbaImage};
use imageproc::drawing::draw_filled_rect_mut;

use crate::geometry::Rect;

pub const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// Pixel box `(x, y, w, h)` fully covering `rect`, clipped to the image.
pub fn pixel_box(rect: &Rect, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
    let x0 = rect.x0.floor().max(0.0) as u32;
    let y0 = rect.y0.floor().max(0.0) as u32;
    let x1 = (rect.x1.ceil().max(0.0) as u32).min(width);
    let y1 = (rect.y1.ceil().max(0.0) as u32).min(height);
    if x1 > x0 && y1 > y0 {
        Some((x0, y0, x1 - x0, y1 - y0))
    } else {
        None
    }
}

/// Overwrites every pixel under `rects` with opaque black. Returns the
/// number of rectangles that touched the image.
pub fn paint_regions(img: &mut RgbaImage, rects: &[Rect]) -> usize {
    let (width, height) = img.dimensions();
    let mut painted = 0;
    for rect in rects {
        if let Some((x, y, w, h)) = pixel_box(rect, width, height) {
            let area = imageproc::rect::Rect::at(x as i32, y as i32).of_size(w, h);
            draw_filled_rect_mut(img, area, BLACK);
            log::debug!("[Paint] filled ({}, {}, {}, {})", x, y, w, h);
            painted += 1;
        }
    }
    painted
}

/// Counts pixels under `rects` that are not opaque black.
pub fn uncovered_pixels(img: &RgbaImage, rects: &[Rect]) -> u64 {
    let (width, height) = img.dimensions();
    let mut uncovered = 0u64;
    for rect in rects {
        let Some((x, y, w, h)) = pixel_box(rect, width, height) else {
            continue;
        };
        for py in y..y + h {
            for px in x..x + w {
                if *img.get_pixel(px, py) != BLACK {
                    uncovered += 1;
                }
            }
        }
    }
    uncovered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paint_covers_fractional_rects() {
        let mut img = RgbaImage::from_pixel(20, 20, Rgba([255, 255, 255, 255]));
        let rect = Rect::new(2.4, 3.6, 7.2, 9.1);
        assert_eq!(paint_regions(&mut img, &[rect]), 1);
        assert_eq!(uncovered_pixels(&img, &[rect]), 0);
        assert_eq!(*img.get_pixel(2, 3), BLACK);
        assert_eq!(*img.get_pixel(7, 9), BLACK);
        assert_ne!(*img.get_pixel(8, 10), BLACK);
    }

    #[test]
    fn test_rect_outside_image_is_skipped() {
        let mut img = RgbaImage::new(10, 10);
        assert_eq!(paint_regions(&mut img, &[Rect::new(20.0, 20.0, 30.0, 30.0)]), 0);
    }

    #[test]
    fn test_uncovered_reports_gaps() {
        let img = RgbaImage::from_pixel(4, 4, Rgba([255, 255, 255, 255]));
        assert_eq!(uncovered_pixels(&img, &[Rect::new(0.0, 0.0, 2.0, 2.0)]), 4);
    }
}

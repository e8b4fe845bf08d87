//! Destructive application of planned regions.

use safedoc_pdf::{
    flatten_page, page_rect_to_pixels, replace_image, replace_page_with_raster, rewrite_page,
    sanitize_document, PageRedaction, PlaceholderText,
};
use safedoc_render::{paint_regions, Rect};

use crate::classify::PageRoute;
use crate::context::{RasterSurface, RequestContext, SurfaceKind};
use crate::error::{RedactError, Result};
use crate::model::{RedactionRegion, Surface};

/// Paints raster regions onto their surfaces at native resolution.
pub(crate) fn paint_raster_regions(surfaces: &mut [RasterSurface], regions: &[RedactionRegion]) {
    for region in regions {
        let Surface::Raster(index) = region.surface else {
            continue;
        };
        if let Some(surface) = surfaces.get_mut(index) {
            paint_regions(&mut surface.image, &region.rects);
            surface.painted.extend_from_slice(&region.rects);
        }
    }
}

/// Burns native boxes into the images they overlap, so the pixels under a
/// removed value are gone as well as the glyphs.
fn paint_native_over_images(surfaces: &mut [RasterSurface], regions: &[RedactionRegion]) {
    for surface in surfaces.iter_mut() {
        let SurfaceKind::Embedded { placements, .. } = &surface.kind else {
            continue;
        };
        let (width, height) = surface.image.dimensions();
        let bounds = surface.bounds();
        let mut boxes: Vec<Rect> = Vec::new();
        for region in regions.iter().filter(|r| r.surface == Surface::Native) {
            for (_, ctm) in placements.iter().filter(|(p, _)| *p == region.page) {
                for rect in &region.rects {
                    if let Some(px) = page_rect_to_pixels(ctm, width, height, rect) {
                        let px = px.clamp_to(&bounds);
                        if !px.is_empty() {
                            boxes.push(px);
                        }
                    }
                }
            }
        }
        if !boxes.is_empty() {
            paint_regions(&mut surface.image, &boxes);
            surface.painted.extend(boxes);
        }
    }
}

fn widest(rects: &[Rect]) -> Option<Rect> {
    rects
        .iter()
        .copied()
        .max_by(|a, b| a.width().total_cmp(&b.width()))
}

fn page_redaction(page: usize, regions: &[RedactionRegion]) -> PageRedaction {
    let mut redaction = PageRedaction::default();
    for region in regions
        .iter()
        .filter(|r| r.page == page && r.surface == Surface::Native)
    {
        redaction.glyphs.extend_from_slice(&region.glyphs);
        redaction.boxes.extend_from_slice(&region.rects);
        if let (Some(text), Some(rect)) = (&region.replacement, widest(&region.rects)) {
            redaction.placeholders.push(PlaceholderText {
                rect,
                text: text.clone(),
            });
        }
    }
    redaction.glyphs.sort_unstable();
    redaction.glyphs.dedup();
    redaction
}

/// Applies every region to the document, then strips document-level extras.
pub(crate) fn apply_pdf(ctx: &mut RequestContext, regions: &[RedactionRegion]) -> Result<usize> {
    paint_raster_regions(&mut ctx.surfaces, regions);
    paint_native_over_images(&mut ctx.surfaces, regions);

    let doc = ctx
        .doc
        .as_mut()
        .ok_or_else(|| RedactError::CorruptDocument("document not loaded".to_string()))?;

    for surface in ctx.surfaces.iter().filter(|s| !s.painted.is_empty()) {
        if let SurfaceKind::Embedded { object_id, .. } = surface.kind {
            replace_image(doc, object_id, &surface.image)?;
        }
    }

    let mut rewritten = 0;
    for page in &mut ctx.pages {
        ctx.cancel.check()?;
        let Some(content) = page.content.take() else {
            continue;
        };
        if page.route == PageRoute::Rasterize {
            let rendered = ctx.surfaces.iter().find_map(|s| match s.kind {
                SurfaceKind::Rendered { page: p, dpi } if p == page.index && !s.painted.is_empty() => {
                    Some((s, dpi))
                }
                _ => None,
            });
            if let Some((surface, dpi)) = rendered {
                replace_page_with_raster(doc, page.page_id, &surface.image, dpi)?;
                log::info!("[Applier] page {} replaced by redacted raster", page.index + 1);
                rewritten += 1;
                continue;
            }
            flatten_page(doc, page.page_id, content)?;
            continue;
        }

        let redaction = page_redaction(page.index, regions);
        if !redaction.glyphs.is_empty() || !redaction.boxes.is_empty() {
            log::info!(
                "[Applier] page {}: {} glyph(s) removed, {} box(es)",
                page.index + 1,
                redaction.glyphs.len(),
                redaction.boxes.len()
            );
            rewritten += 1;
        }
        rewrite_page(doc, page.page_id, content, &redaction)?;
    }

    let cleaned = sanitize_document(doc)?;
    log::info!("[Applier] removed {} document-level item(s)", cleaned.items_removed);
    Ok(rewritten)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FillStyle;
    use image::{Rgba, RgbaImage};
    use safedoc_pdf::Matrix;

    fn region(surface: Surface, page: usize, rects: Vec<Rect>) -> RedactionRegion {
        RedactionRegion {
            page,
            surface,
            rects,
            fill: FillStyle::OpaqueBlack,
            replacement: None,
            glyphs: vec![3, 1, 3],
        }
    }

    #[test]
    fn test_paint_raster_regions() {
        let mut surfaces = vec![RasterSurface::new(
            SurfaceKind::Standalone { dpi: None },
            0,
            RgbaImage::from_pixel(10, 10, Rgba([255, 255, 255, 255])),
        )];
        let rect = Rect::new(2.0, 2.0, 5.0, 5.0);
        paint_raster_regions(&mut surfaces, &[region(Surface::Raster(0), 0, vec![rect])]);
        assert_eq!(surfaces[0].painted, vec![rect]);
        assert_eq!(surfaces[0].image.get_pixel(3, 3), &Rgba([0, 0, 0, 255]));
        assert_eq!(surfaces[0].image.get_pixel(8, 8), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn test_native_boxes_burned_into_images() {
        // 128x128 px image placed at the origin, 128 pt wide.
        let mut surfaces = vec![RasterSurface::new(
            SurfaceKind::Embedded {
                object_id: (7, 0),
                placements: vec![(0, Matrix([128.0, 0.0, 0.0, 128.0, 0.0, 0.0]))],
            },
            0,
            RgbaImage::from_pixel(128, 128, Rgba([255, 255, 255, 255])),
        )];
        let native = region(Surface::Native, 0, vec![Rect::new(16.0, 96.0, 48.0, 112.0)]);
        let other_page = region(Surface::Native, 1, vec![Rect::new(64.0, 64.0, 80.0, 80.0)]);
        paint_native_over_images(&mut surfaces, &[native, other_page]);
        // y flips: user 96..112 is rows 16..32.
        assert_eq!(surfaces[0].painted, vec![Rect::new(16.0, 16.0, 48.0, 32.0)]);
        assert_eq!(surfaces[0].image.get_pixel(20, 20), &Rgba([0, 0, 0, 255]));
        assert_eq!(surfaces[0].image.get_pixel(70, 58), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn test_page_redaction_merges_regions() {
        let mut partial = region(Surface::Native, 0, vec![Rect::new(0.0, 0.0, 10.0, 5.0), Rect::new(0.0, 10.0, 30.0, 15.0)]);
        partial.replacement = Some("XXXX".to_string());
        let redaction = page_redaction(0, &[partial, region(Surface::Raster(0), 0, vec![])]);
        assert_eq!(redaction.glyphs, vec![1, 3]);
        assert_eq!(redaction.boxes.len(), 2);
        assert_eq!(redaction.placeholders.len(), 1);
        assert_eq!(redaction.placeholders[0].rect.width(), 30.0);
    }
}

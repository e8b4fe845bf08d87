//! Native and optical text extraction.

use image::imageops::{self, FilterType};
use image::DynamicImage;
use lopdf::Document;
use safedoc_ocr::{OcrError, OcrPool, OcrWord, WordBox};
use safedoc_pdf::{decode_image, extract_page, get_page_box};
use safedoc_render::PageRasterizer;
use std::thread;
use std::time::{Duration, Instant};
use zeroize::Zeroizing;

use crate::classify::{is_scanned_page, route_page, PageRoute, RouteParams};
use crate::config::OcrSettings;
use crate::context::{CancelFlag, PageState, RasterSurface, RequestContext, SurfaceKind};
use crate::error::{RedactError, Result};
use crate::layout::TextLayout;

/// Upper bound on the upscale applied to low-resolution images before OCR.
const MAX_UPSCALE: f32 = 4.0;

/// Parses every page, routes it and lays out its native text.
pub(crate) fn load_pages(ctx: &mut RequestContext, params: RouteParams) -> Result<()> {
    let doc = ctx
        .doc
        .as_ref()
        .ok_or_else(|| RedactError::CorruptDocument("document not loaded".to_string()))?;

    let mut pages = Vec::new();
    for (index, (_, page_id)) in doc.get_pages().into_iter().enumerate() {
        ctx.cancel.check()?;
        let content = extract_page(doc, page_id)?;
        let route = route_page(doc, &content, params);
        let scanned = is_scanned_page(&content, params.scanned_text_threshold);
        let layout = match route {
            PageRoute::Rasterize => TextLayout::default(),
            _ => TextLayout::from_glyphs(&content.glyphs),
        };
        log::debug!(
            "[Extract] page {}: {:?}, {} glyph(s), {} image(s)",
            index + 1,
            route,
            content.glyphs.len(),
            content.images.len()
        );
        pages.push(PageState {
            index,
            page_id,
            route,
            scanned,
            bounds: get_page_box(doc, page_id),
            content: Some(content),
            layout,
        });
    }
    ctx.pages = pages;
    Ok(())
}

/// In-memory serialization of the decrypted document for the rasterizer.
pub(crate) fn decrypted_copy(doc: &Document) -> Result<Zeroizing<Vec<u8>>> {
    let mut copy = doc.clone();
    let mut out = Zeroizing::new(Vec::new());
    let saved = copy.save_to(&mut *out);
    safedoc_pdf::wipe_document(&mut copy);
    saved.map_err(|e| RedactError::CorruptDocument(format!("re-serialize: {}", e)))?;
    Ok(out)
}

/// Decodes the images worth OCR'ing; each XObject becomes one surface however
/// many times it is painted.
pub(crate) fn collect_embedded(ctx: &mut RequestContext, settings: &OcrSettings) -> Result<()> {
    let doc = ctx
        .doc
        .as_ref()
        .ok_or_else(|| RedactError::CorruptDocument("document not loaded".to_string()))?;

    for page in &ctx.pages {
        let wanted = match page.route {
            PageRoute::Scanned => true,
            PageRoute::Native => settings.embedded_images,
            PageRoute::Rasterize => false,
        };
        let Some(content) = page.content.as_ref().filter(|_| wanted) else {
            continue;
        };
        for placement in &content.images {
            let Some(object_id) = placement.object_id else {
                continue;
            };
            let existing = ctx.surfaces.iter_mut().find(|s| s.object_id() == Some(object_id));
            if let Some(surface) = existing {
                if let SurfaceKind::Embedded { placements, .. } = &mut surface.kind {
                    placements.push((page.index, placement.ctm));
                }
                continue;
            }
            let Some(image) = decode_image(doc, object_id) else {
                continue;
            };
            if image.width() < settings.min_image_px || image.height() < settings.min_image_px {
                continue;
            }
            ctx.surfaces.push(RasterSurface::new(
                SurfaceKind::Embedded {
                    object_id,
                    placements: vec![(page.index, placement.ctm)],
                },
                page.index,
                image.to_rgba8(),
            ));
        }
    }
    log::info!("[Extract] {} embedded image surface(s)", ctx.surfaces.len());
    Ok(())
}

/// Renders every page routed to the fallback.
pub(crate) fn render_fallback_pages(
    ctx: &mut RequestContext,
    rasterizer: &dyn PageRasterizer,
    dpi: u32,
) -> Result<()> {
    let indices: Vec<usize> = ctx
        .pages
        .iter()
        .filter(|p| p.route == PageRoute::Rasterize)
        .map(|p| p.index)
        .collect();
    for index in indices {
        ctx.cancel.check()?;
        let start = Instant::now();
        let image = rasterizer.render_page(ctx.render_bytes(), index, dpi)?;
        log::info!(
            "[Extract] rendered page {} in {}ms",
            index + 1,
            start.elapsed().as_millis()
        );
        ctx.surfaces.push(RasterSurface::new(
            SurfaceKind::Rendered { page: index, dpi },
            index,
            image,
        ));
    }
    Ok(())
}

/// Width in inches of an ID-1 card, the smallest document a standalone
/// image is assumed to show.
const CARD_WIDTH_IN: f32 = 3.375;

/// Resolution OCR sees on a surface, `None` when it is already known to be
/// adequate.
fn effective_dpi(surface: &RasterSurface) -> Option<f32> {
    let width_px = surface.image.width() as f32;
    match &surface.kind {
        // Smallest placement wins.
        SurfaceKind::Embedded { placements, .. } => {
            let dpi = placements
                .iter()
                .map(|(_, ctm)| ctm.x_scale() / 72.0)
                .filter(|inches| *inches > 0.0)
                .map(|inches| width_px / inches)
                .fold(f32::INFINITY, f32::min);
            dpi.is_finite().then_some(dpi)
        }
        SurfaceKind::Standalone { dpi } => Some(dpi.unwrap_or(width_px / CARD_WIDTH_IN)),
        SurfaceKind::Rendered { .. } => None,
    }
}

/// Upscale factor bringing a surface to `min_dpi`, capped at `MAX_UPSCALE`.
fn upscale_factor(surface: &RasterSurface, min_dpi: u32) -> f32 {
    match effective_dpi(surface) {
        Some(dpi) if dpi > 0.0 && dpi < min_dpi as f32 => (min_dpi as f32 / dpi).min(MAX_UPSCALE),
        _ => 1.0,
    }
}

fn ocr_input(surface: &RasterSurface, min_dpi: u32) -> (DynamicImage, f32) {
    let factor = upscale_factor(surface, min_dpi);
    if factor <= 1.0 {
        return (DynamicImage::ImageRgba8(surface.image.clone()), 1.0);
    }
    let width = (surface.image.width() as f32 * factor).round() as u32;
    let height = (surface.image.height() as f32 * factor).round() as u32;
    let scaled = imageops::resize(&surface.image, width, height, FilterType::CatmullRom);
    (DynamicImage::ImageRgba8(scaled), factor)
}

/// Maps word boxes of an upscaled image back to the source pixel grid.
pub(crate) fn scale_words(words: Vec<OcrWord>, factor: f32) -> Vec<OcrWord> {
    if factor == 1.0 {
        return words;
    }
    words
        .into_iter()
        .map(|mut word| {
            let left = (word.bbox.left as f32 / factor).floor();
            let top = (word.bbox.top as f32 / factor).floor();
            let right = ((word.bbox.left + word.bbox.width) as f32 / factor).ceil();
            let bottom = ((word.bbox.top + word.bbox.height) as f32 / factor).ceil();
            word.bbox = WordBox {
                left: left as u32,
                top: top as u32,
                width: (right - left) as u32,
                height: (bottom - top) as u32,
            };
            word
        })
        .collect()
}

/// Runs OCR on one image through the pool.
pub(crate) fn recognize(
    pool: &OcrPool,
    image: DynamicImage,
    timeout: Duration,
    cancel: &CancelFlag,
    page: usize,
) -> Result<Vec<OcrWord>> {
    pool.recognize(image, timeout, cancel.shared())
        .map_err(|e| RedactError::from_ocr(e, page + 1))
}

/// OCRs every surface of the request and fills in their layouts.
///
/// Surfaces are submitted in batches sized to the pool so the workers stay
/// busy without decoding every page up front.
pub(crate) fn ocr_surfaces(
    ctx: &mut RequestContext,
    pool: Option<&OcrPool>,
    unavailable: Option<&str>,
    settings: &OcrSettings,
) -> Result<()> {
    if ctx.surfaces.is_empty() {
        return Ok(());
    }
    let Some(pool) = pool else {
        return Err(RedactError::OcrEngineUnavailable(
            unavailable.unwrap_or("no OCR engine configured").to_string(),
        ));
    };
    let timeout = Duration::from_secs(settings.timeout_secs);
    let batch = pool.size().max(1);
    let cancel = ctx.cancel.clone();

    let mut start = 0;
    while start < ctx.surfaces.len() {
        cancel.check()?;
        let end = (start + batch).min(ctx.surfaces.len());
        let inputs: Vec<(DynamicImage, f32)> = ctx.surfaces[start..end]
            .iter()
            .map(|s| ocr_input(s, settings.min_dpi))
            .collect();

        let results: Vec<(f32, std::result::Result<Vec<OcrWord>, OcrError>)> = thread::scope(|scope| {
            let handles: Vec<_> = inputs
                .into_iter()
                .map(|(image, factor)| {
                    let cancel = cancel.shared();
                    scope.spawn(move || (factor, pool.recognize(image, timeout, cancel)))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| {
                    h.join().unwrap_or_else(|_| {
                        (1.0, Err(OcrError::Engine("OCR thread panicked".to_string())))
                    })
                })
                .collect()
        });

        for (offset, (factor, result)) in results.into_iter().enumerate() {
            let surface = &mut ctx.surfaces[start + offset];
            let words = result.map_err(|e| RedactError::from_ocr(e, surface.page + 1))?;
            log::info!(
                "[OCR] surface {} ({}x{}): {} word(s)",
                start + offset,
                surface.image.width(),
                surface.image.height(),
                words.len()
            );
            surface.layout = TextLayout::from_ocr_words(&scale_words(words, factor));
        }
        start = end;
    }
    Ok(())
}

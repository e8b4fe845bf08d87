//! Container sniffing and per-page routing.

use image::codecs::gif::GifDecoder;
use image::codecs::webp::WebPDecoder;
use image::{AnimationDecoder, ImageFormat};
use lopdf::{Document, Object};
use safedoc_pdf::{decode_image, looks_like_pdf, page_content_type, PageContentType, PageText};
use serde::Serialize;
use std::io::Cursor;
use std::path::Path;

use crate::error::{RedactError, Result};

/// Extensions accepted for upload.
pub const SUPPORTED_EXTENSIONS: [&str; 9] =
    ["pdf", "png", "jpg", "jpeg", "bmp", "tif", "tiff", "webp", "gif"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    Pdf,
    Image(ImageFormat),
}

impl Container {
    pub fn mime_type(self) -> &'static str {
        match self {
            Container::Pdf => "application/pdf",
            // Redacted images are always written as PNG.
            Container::Image(_) => "image/png",
        }
    }

    pub fn output_extension(self) -> &'static str {
        match self {
            Container::Pdf => "pdf",
            Container::Image(_) => "png",
        }
    }
}

fn image_format(format: ImageFormat) -> Option<ImageFormat> {
    matches!(
        format,
        ImageFormat::Png
            | ImageFormat::Jpeg
            | ImageFormat::Bmp
            | ImageFormat::Tiff
            | ImageFormat::WebP
            | ImageFormat::Gif
    )
    .then_some(format)
}

/// Decides the container from magic bytes; the filename is only a hint.
pub fn sniff_container(bytes: &[u8], filename: &str) -> Result<Container> {
    let declared = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    let container = if looks_like_pdf(bytes) {
        Container::Pdf
    } else if let Some(format) = image::guess_format(bytes).ok().and_then(image_format) {
        Container::Image(format)
    } else {
        log::warn!("[Classifier] unrecognized content ({} bytes)", bytes.len());
        return Err(RedactError::UnsupportedFormat(match declared {
            Some(ext) => format!("content is not a supported document (declared .{})", ext),
            None => "content is not a supported document".to_string(),
        }));
    };

    if let Some(ext) = declared.as_deref() {
        let agrees = match container {
            Container::Pdf => ext == "pdf",
            Container::Image(format) => format.extensions_str().contains(&ext),
        };
        if !agrees {
            log::warn!("[Classifier] declared .{} but content is {:?}", ext, container);
        }
    }
    Ok(container)
}

/// How a PDF page is processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PageRoute {
    /// Text layer is complete; glyphs are removed from the content stream.
    Native,
    /// Little or no text and at least one image: OCR its images.
    Scanned,
    /// Removal cannot be guaranteed in the content stream; render, OCR and
    /// replace the page by a redacted bitmap.
    Rasterize,
}

/// More than one page or frame in an image container.
pub(crate) fn is_multi_frame(bytes: &[u8], format: ImageFormat) -> bool {
    match format {
        ImageFormat::Gif => GifDecoder::new(Cursor::new(bytes))
            .map(|decoder| decoder.into_frames().take(2).count() > 1)
            .unwrap_or(false),
        ImageFormat::WebP => WebPDecoder::new(Cursor::new(bytes))
            .map(|decoder| decoder.has_animation())
            .unwrap_or(false),
        ImageFormat::Tiff => tiff::decoder::Decoder::new(Cursor::new(bytes))
            .map(|decoder| decoder.more_images())
            .unwrap_or(false),
        _ => false,
    }
}

/// Resolution declared in a PNG `pHYs` chunk.
pub(crate) fn declared_dpi(bytes: &[u8], format: ImageFormat) -> Option<f32> {
    if format != ImageFormat::Png {
        return None;
    }
    let reader = png::Decoder::new(Cursor::new(bytes)).read_info().ok()?;
    let dims = reader.info().pixel_dims?;
    if !matches!(dims.unit, png::Unit::Meter) {
        return None;
    }
    let dpi = dims.xppu.min(dims.yppu) as f32 * 0.0254;
    (dpi >= 1.0).then_some(dpi)
}

#[derive(Debug, Clone, Copy)]
pub struct RouteParams {
    pub scanned_text_threshold: usize,
    pub min_image_px: u32,
}

fn image_size(doc: &Document, id: lopdf::ObjectId) -> Option<(u32, u32)> {
    let Ok(Object::Stream(stream)) = doc.get_object(id) else {
        return None;
    };
    let dim = |key: &[u8]| match stream.dict.get(key) {
        Ok(Object::Integer(v)) if *v > 0 => Some(*v as u32),
        Ok(Object::Real(v)) if *v > 0.0 => Some(*v as u32),
        _ => None,
    };
    Some((dim(b"Width")?, dim(b"Height")?))
}

/// An image large enough to carry text that we cannot decode.
fn has_undecodable_image(doc: &Document, page: &PageText, min_px: u32) -> bool {
    page.images.iter().any(|placement| {
        let Some(id) = placement.object_id else {
            return false;
        };
        match image_size(doc, id) {
            Some((w, h)) if w >= min_px && h >= min_px => decode_image(doc, id).is_none(),
            _ => false,
        }
    })
}

/// Routes one page from its parsed content.
pub fn route_page(doc: &Document, page: &PageText, params: RouteParams) -> PageRoute {
    let content_type = page_content_type(page);
    let reason = if page.unmapped_glyphs() > 0 {
        Some("glyphs without unicode mapping")
    } else if page.opaque_forms > 0 {
        Some("form xobject with text or images")
    } else if page.inline_images > 0 {
        Some("inline images")
    } else if content_type == PageContentType::PathDrawn {
        Some("text drawn as paths")
    } else if has_undecodable_image(doc, page, params.min_image_px) {
        Some("undecodable image")
    } else {
        None
    };
    if let Some(reason) = reason {
        log::info!("[Classifier] rasterize fallback: {}", reason);
        return PageRoute::Rasterize;
    }

    if is_scanned_page(page, params.scanned_text_threshold) {
        PageRoute::Scanned
    } else {
        PageRoute::Native
    }
}

/// Little native text and at least one painted image.
pub fn is_scanned_page(page: &PageText, threshold: usize) -> bool {
    page.native_chars() < threshold && (!page.images.is_empty() || page.inline_images > 0)
}

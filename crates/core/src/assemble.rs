//! Output serialization and the fail-closed post-condition checks.

use image::{ImageFormat, RgbaImage};
use lopdf::Document;
use safedoc_ocr::OcrPool;
use safedoc_pdf::{decode_image, extract_page, open_pdf};
use safedoc_rules::PiiDetector;
use safedoc_verify::{
    check_coverage, check_ocr_text, check_text_layer, normalize, residual_keys, Finding,
    FindingKind, VerifyOptions, VerifyReport,
};
use std::io::Cursor;
use std::path::Path;
use std::time::Duration;
use zeroize::Zeroizing;

use crate::context::{CancelFlag, RasterSurface, RequestContext, SurfaceKind};
use crate::error::{RedactError, Result};
use crate::extract::recognize;
use crate::layout::TextLayout;

/// `<stem>_redacted.<ext>`
pub fn output_filename(filename: &str, extension: &str) -> String {
    let stem = Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("document");
    format!("{}_redacted.{}", stem, extension)
}

pub(crate) fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|e| RedactError::CorruptDocument(format!("png encode: {}", e)))?;
    Ok(out.into_inner())
}

/// What verification needs to know about the request.
pub(crate) struct VerifyInput<'a> {
    pub detector: &'a PiiDetector,
    /// Every value the request removed, as matched.
    pub removed: &'a [String],
    pub options: VerifyOptions,
    pub pool: Option<&'a OcrPool>,
    pub timeout: Duration,
    pub cancel: &'a CancelFlag,
}

impl VerifyInput<'_> {
    fn normalized_removed(&self) -> Zeroizing<Vec<String>> {
        Zeroizing::new(self.removed.iter().map(|v| normalize(v)).collect())
    }

    fn ocr_recheck(&self, page: usize, image: RgbaImage, report: &mut VerifyReport) -> Result<()> {
        let Some(pool) = self.pool.filter(|_| self.options.ocr_recheck) else {
            return Ok(());
        };
        let words = recognize(
            pool,
            image::DynamicImage::ImageRgba8(image),
            self.timeout,
            self.cancel,
            page,
        )?;
        let layout = TextLayout::from_ocr_words(&words);
        let removed = self.normalized_removed();
        report.record(check_ocr_text(page, &layout.text, self.detector, &removed));
        Ok(())
    }
}

fn undecodable(page: usize) -> Finding {
    Finding {
        page,
        kind: FindingKind::UncoveredPixels,
        detail: "redacted image could not be decoded for checking".to_string(),
    }
}

/// The painted bitmap of `surface` as stored in the output document.
fn output_image(doc: &Document, surface: &RasterSurface) -> Option<RgbaImage> {
    let object_id = match &surface.kind {
        SurfaceKind::Embedded { object_id, .. } => *object_id,
        SurfaceKind::Rendered { page, .. } => {
            let page_id = doc.get_pages().into_values().nth(*page)?;
            let content = extract_page(doc, page_id).ok()?;
            content.images.first()?.object_id?
        }
        SurfaceKind::Standalone { .. } => return None,
    };
    decode_image(doc, object_id).map(|img| img.to_rgba8())
}

/// Re-opens the saved output and checks it. Any finding fails the request.
pub(crate) fn verify_pdf(bytes: &[u8], ctx: &RequestContext, input: &VerifyInput) -> Result<VerifyReport> {
    let mut opened = open_pdf(bytes, None).map_err(|e| {
        log::error!("[Verify] output does not re-open: {}", e);
        RedactError::RedactionIntegrityFailure { findings: 1 }
    })?;
    let doc = &opened.doc;
    let mut report = VerifyReport::new();

    if input.options.text_search {
        let residual = Zeroizing::new(residual_keys(input.removed.iter().map(String::as_str)));
        for (index, (_, page_id)) in doc.get_pages().into_iter().enumerate() {
            input.cancel.check()?;
            let content = extract_page(doc, page_id)
                .map_err(|_| RedactError::RedactionIntegrityFailure { findings: 1 })?;
            let layout = TextLayout::from_glyphs(&content.glyphs);
            report.record(check_text_layer(index, &layout.text, input.detector, &residual));
        }
    }

    for surface in ctx.surfaces.iter().filter(|s| !s.painted.is_empty()) {
        input.cancel.check()?;
        let Some(image) = output_image(doc, surface) else {
            report.record(vec![undecodable(surface.page)]);
            continue;
        };
        report.record(check_coverage(surface.page, &image, &surface.painted));
        input.ocr_recheck(surface.page, image, &mut report)?;
    }

    safedoc_pdf::wipe_document(&mut opened.doc);
    log::info!(
        "[Verify] {} check(s), {} finding(s)",
        report.checks,
        report.findings.len()
    );
    Ok(report)
}

/// Decodes the encoded output image and checks it.
pub(crate) fn verify_image(bytes: &[u8], surface: &RasterSurface, input: &VerifyInput) -> Result<VerifyReport> {
    let mut report = VerifyReport::new();
    let image = match image::load_from_memory_with_format(bytes, ImageFormat::Png) {
        Ok(img) => img.to_rgba8(),
        Err(e) => {
            log::error!("[Verify] output image does not decode: {}", e);
            report.record(vec![undecodable(surface.page)]);
            return Ok(report);
        }
    };
    report.record(check_coverage(surface.page, &image, &surface.painted));
    if !surface.painted.is_empty() {
        input.ocr_recheck(surface.page, image, &mut report)?;
    }
    log::info!(
        "[Verify] {} check(s), {} finding(s)",
        report.checks,
        report.findings.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use safedoc_render::Rect;
    use safedoc_rules::SensitivityLevel;

    #[test]
    fn test_output_filename() {
        assert_eq!(output_filename("aadhaar card.pdf", "pdf"), "aadhaar card_redacted.pdf");
        assert_eq!(output_filename("scan.JPG", "png"), "scan_redacted.png");
        assert_eq!(output_filename("", "pdf"), "document_redacted.pdf");
        assert_eq!(output_filename("dir/id.tiff", "png"), "id_redacted.png");
    }

    #[test]
    fn test_verify_image_coverage() {
        let mut surface = RasterSurface::new(
            SurfaceKind::Standalone { dpi: None },
            0,
            RgbaImage::from_pixel(20, 20, Rgba([255, 255, 255, 255])),
        );
        surface.painted.push(Rect::new(2.0, 2.0, 8.0, 8.0));
        let detector = PiiDetector::new(SensitivityLevel::Low);
        let cancel = CancelFlag::new();
        let input = VerifyInput {
            detector: &detector,
            removed: &[],
            options: VerifyOptions::default(),
            pool: None,
            timeout: Duration::from_secs(1),
            cancel: &cancel,
        };

        // Nothing painted yet: the check must fail.
        let bytes = encode_png(&surface.image).unwrap();
        assert!(!verify_image(&bytes, &surface, &input).unwrap().is_clean());

        safedoc_render::paint_regions(&mut surface.image, &[Rect::new(2.0, 2.0, 8.0, 8.0)]);
        let bytes = encode_png(&surface.image).unwrap();
        assert!(verify_image(&bytes, &surface, &input).unwrap().is_clean());
    }
}

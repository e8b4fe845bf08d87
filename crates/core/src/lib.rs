//! Core orchestration for redaction requests.
//!
//! bytes → classify → (decrypt) → extract → detect → plan → apply → verify →
//! assemble. A [`RedactionEngine`] is shared across requests and holds no
//! request data; each request lives in its own context that is wiped on
//! every exit path.

mod apply;
mod assemble;
pub mod classify;
pub mod config;
mod context;
mod detect;
pub mod error;
mod extract;
pub mod layout;
pub mod model;
pub mod plan;
pub mod response;

pub use assemble::output_filename;
pub use classify::{sniff_container, Container, PageRoute, SUPPORTED_EXTENSIONS};
pub use config::{ConfigError, EngineConfig};
pub use context::CancelFlag;
pub use error::{ErrorKind, RedactError, Result};
pub use model::{
    Entity, EngineStatus, FillStyle, PiiMatch, PreviewOutput, RedactionOutput, RedactionRegion,
    RedactionRequest, ScanType, Surface, TextSpan, TypeCount,
};
pub use response::ErrorResponse;
pub use safedoc_rules::{level_catalog, PiiType, SensitivityLevel};

use image::ImageFormat;
use safedoc_ocr::{OcrEngine, OcrPool, TesseractEngine};
use safedoc_pdf::{flatten_annotations, is_sanitized, open_pdf, save_document};
use safedoc_render::{PageRasterizer, PdfiumRasterizer};
use safedoc_rules::PiiDetector;
use std::sync::Arc;
use std::time::{Duration, Instant};
use zeroize::{Zeroize, Zeroizing};

use crate::assemble::{encode_png, verify_image, verify_pdf, VerifyInput};
use crate::classify::RouteParams;
use crate::context::{RasterSurface, RequestContext, SurfaceKind};
use crate::model::count_by_type;
use crate::plan::PlanParams;

/// Extensions accepted for upload.
pub fn supported_extensions() -> &'static [&'static str] {
    &SUPPORTED_EXTENSIONS
}

/// Everything the detection stage produced for one request.
struct Analysis {
    ctx: RequestContext,
    container: Container,
    detector: PiiDetector,
    matches: Vec<PiiMatch>,
    scan_type: ScanType,
    page_count: usize,
}

pub struct RedactionEngine {
    config: EngineConfig,
    ocr: Option<OcrPool>,
    ocr_error: Option<String>,
    ocr_languages: Vec<String>,
    rasterizer: Arc<dyn PageRasterizer>,
}

impl RedactionEngine {
    /// Builds the engine with the Tesseract CLI and pdfium.
    ///
    /// A missing Tesseract is not fatal here: native PDFs still work and
    /// requests that need OCR fail with `OcrEngineUnavailable`.
    pub fn new(config: EngineConfig) -> Self {
        let rasterizer: Arc<dyn PageRasterizer> = Arc::new(PdfiumRasterizer::new(config.pdfium_dir()));
        match TesseractEngine::new(config.ocr.tesseract.clone()) {
            Ok(engine) => {
                log::info!("[Engine] tesseract {}", engine.version());
                let languages = engine.languages();
                let mut this = Self::with_components(config, Some(Arc::new(engine)), rasterizer);
                this.ocr_languages = languages;
                this
            }
            Err(e) => {
                log::warn!("[Engine] OCR unavailable: {}", e);
                let mut this = Self::with_components(config, None, rasterizer);
                this.ocr_error = Some(e.to_string());
                this
            }
        }
    }

    /// Builds the engine around caller-supplied OCR and rasterization.
    pub fn with_components(
        config: EngineConfig,
        ocr: Option<Arc<dyn OcrEngine>>,
        rasterizer: Arc<dyn PageRasterizer>,
    ) -> Self {
        let workers = config.ocr.worker_count();
        let ocr = ocr.map(|engine| OcrPool::new(engine, workers));
        Self {
            config,
            ocr,
            ocr_error: None,
            ocr_languages: Vec::new(),
            rasterizer,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            ocr: self.ocr.as_ref().map(|pool| pool.engine().info()),
            ocr_languages: self.ocr_languages.clone(),
            ocr_workers: self.ocr.as_ref().map(OcrPool::size).unwrap_or(0),
            ocr_error: self.ocr_error.clone(),
            rasterizer_available: self.rasterizer.is_available(),
            levels: level_catalog(),
            extensions: SUPPORTED_EXTENSIONS.to_vec(),
        }
    }

    fn route_params(&self) -> RouteParams {
        RouteParams {
            scanned_text_threshold: self.config.redaction.scanned_text_threshold,
            min_image_px: self.config.ocr.min_image_px,
        }
    }

    fn ocr_timeout(&self) -> Duration {
        Duration::from_secs(self.config.ocr.timeout_secs)
    }

    /// Classifies, extracts and detects. Nothing is modified yet.
    fn analyze(&self, request: RedactionRequest, cancel: &CancelFlag) -> Result<Analysis> {
        cancel.check()?;
        let RedactionRequest {
            bytes,
            filename,
            level,
            password,
        } = request;
        let container = sniff_container(&bytes, &filename)?;
        log::info!(
            "[Request] {:?}, {} bytes, level {}",
            container,
            bytes.len(),
            level
        );

        let mut ctx = RequestContext::new(bytes, password, cancel.clone());
        let (scan_type, page_count) = match container {
            Container::Pdf => self.extract_pdf(&mut ctx)?,
            Container::Image(format) => self.extract_image(&mut ctx, format)?,
        };
        ctx.cancel.check()?;

        let detector = PiiDetector::new(level);
        let matches = detect::detect_matches(&ctx, &detector);
        Ok(Analysis {
            ctx,
            container,
            detector,
            matches,
            scan_type,
            page_count,
        })
    }

    fn extract_pdf(&self, ctx: &mut RequestContext) -> Result<(ScanType, usize)> {
        let mut opened = {
            let password = ctx.password.as_ref().map(|p| p.as_str());
            open_pdf(&ctx.input, password)?
        };
        flatten_annotations(&mut opened.doc)?;
        ctx.password = None;
        ctx.encrypted = opened.encrypted;
        ctx.doc = Some(opened.doc);

        extract::load_pages(ctx, self.route_params())?;
        if ctx.encrypted && ctx.pages.iter().any(|p| p.route == PageRoute::Rasterize) {
            ctx.render_source = Some(extract::decrypted_copy(ctx.doc()?)?);
        }
        extract::collect_embedded(ctx, &self.config.ocr)?;
        extract::render_fallback_pages(ctx, self.rasterizer.as_ref(), self.config.ocr.min_dpi)?;
        extract::ocr_surfaces(ctx, self.ocr.as_ref(), self.ocr_error.as_deref(), &self.config.ocr)?;

        let scan_type = ScanType::from_flags(ctx.pages.iter().map(|p| p.scanned));
        Ok((scan_type, ctx.pages.len()))
    }

    fn extract_image(&self, ctx: &mut RequestContext, format: ImageFormat) -> Result<(ScanType, usize)> {
        if classify::is_multi_frame(&ctx.input, format) {
            log::warn!("[Classifier] {:?} input holds more than one frame", format);
            return Err(RedactError::UnsupportedFormat(format!(
                "multi-frame {:?} images are not supported; upload each page separately",
                format
            )));
        }
        let image = image::load_from_memory_with_format(&ctx.input, format)
            .map_err(|e| RedactError::CorruptDocument(format!("image decode: {}", e)))?;
        let dpi = classify::declared_dpi(&ctx.input, format);
        ctx.surfaces.push(RasterSurface::new(
            SurfaceKind::Standalone { dpi },
            0,
            image.to_rgba8(),
        ));
        extract::ocr_surfaces(ctx, self.ocr.as_ref(), self.ocr_error.as_deref(), &self.config.ocr)?;
        Ok((ScanType::Optical, 1))
    }

    /// Detected entities without producing output.
    pub fn preview(&self, request: RedactionRequest, cancel: &CancelFlag) -> Result<PreviewOutput> {
        let level = request.level;
        let analysis = self.analyze(request, cancel)?;
        Ok(PreviewOutput {
            level,
            scan_type: analysis.scan_type,
            page_count: analysis.page_count,
            entities: analysis.matches.iter().map(Entity::from).collect(),
        })
    }

    /// Redacts one document. Output is only returned once verification on
    /// the serialized bytes comes back clean.
    pub fn redact(&self, request: RedactionRequest, cancel: &CancelFlag) -> Result<RedactionOutput> {
        let started = Instant::now();
        let level = request.level;
        let filename = request.filename.clone();
        let Analysis {
            mut ctx,
            container,
            detector,
            matches,
            scan_type,
            page_count,
        } = self.analyze(request, cancel)?;

        let regions = plan::plan_regions(
            &ctx,
            &matches,
            PlanParams {
                margin_pt: self.config.redaction.margin_pt,
                margin_px: self.config.redaction.margin_px,
            },
        )?;
        ctx.cancel.check()?;

        let removed: Zeroizing<Vec<String>> =
            Zeroizing::new(matches.iter().map(|m| m.span.text.clone()).collect());
        let verify_input = VerifyInput {
            detector: &detector,
            removed: &removed,
            options: self.config.verify,
            pool: self.ocr.as_ref(),
            timeout: self.ocr_timeout(),
            cancel,
        };

        let mut unchanged = false;
        let (mut bytes, report) = match container {
            Container::Pdf => {
                if regions.is_empty() && !ctx.encrypted && is_sanitized(ctx.doc()?) {
                    log::info!("[Assemble] nothing to redact in a clean document, returning input");
                    unchanged = true;
                    (ctx.input.to_vec(), safedoc_verify::VerifyReport::new())
                } else {
                    apply::apply_pdf(&mut ctx, &regions)?;
                    let bytes = save_document(ctx.doc_mut()?)?;
                    ctx.cancel.check()?;
                    let report = verify_pdf(&bytes, &ctx, &verify_input)?;
                    (bytes, report)
                }
            }
            Container::Image(_) => {
                apply::paint_raster_regions(&mut ctx.surfaces, &regions);
                let surface = ctx
                    .surfaces
                    .first()
                    .ok_or_else(|| RedactError::CorruptDocument("image not loaded".to_string()))?;
                let bytes = encode_png(&surface.image)?;
                let report = verify_image(&bytes, surface, &verify_input)?;
                (bytes, report)
            }
        };

        if !report.is_clean() {
            bytes.zeroize();
            log::error!(
                "[Verify] {} finding(s), refusing output",
                report.findings.len()
            );
            return Err(RedactError::RedactionIntegrityFailure {
                findings: report.findings.len(),
            });
        }

        log::info!(
            "[Request] done: {} region(s), {} page(s), {}ms",
            regions.len(),
            page_count,
            started.elapsed().as_millis()
        );
        Ok(RedactionOutput {
            bytes,
            filename: output_filename(&filename, container.output_extension()),
            mime_type: container.mime_type(),
            level,
            scan_type,
            page_count,
            regions: regions.len(),
            by_type: count_by_type(matches.iter().map(|m| m.pii_type)),
            verify: report,
            unchanged,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use safedoc_render::NoRasterizer;

    fn engine() -> RedactionEngine {
        RedactionEngine::with_components(EngineConfig::default(), None, Arc::new(NoRasterizer))
    }

    #[test]
    fn test_engine_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RedactionEngine>();
    }

    #[test]
    fn test_status_without_ocr() {
        let status = engine().status();
        assert!(status.ocr.is_none());
        assert_eq!(status.ocr_workers, 0);
        assert!(!status.rasterizer_available);
        assert_eq!(status.levels.len(), 3);
        assert!(status.extensions.contains(&"pdf"));
    }

    #[test]
    fn test_unsupported_upload() {
        let request = RedactionRequest::new(b"hello world".to_vec(), "notes.txt");
        let err = engine().redact(request, &CancelFlag::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
    }

    #[test]
    fn test_cancelled_before_start() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let request = RedactionRequest::new(b"%PDF-1.4".to_vec(), "a.pdf");
        let err = engine().redact(request, &cancel).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn test_supported_extensions() {
        assert!(supported_extensions().contains(&"tiff"));
        assert!(!supported_extensions().contains(&"docx"));
    }
}

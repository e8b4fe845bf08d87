//! Page rasterization through pdfium.
//!
//! Used for pages whose text cannot be removed structurally: the page is
//! rendered, OCR'd and replaced by the painted bitmap.

use image::RgbaImage;
use pdfium_render::prelude::*;
use std::path::PathBuf;

use crate::RenderError;

/// Renders a single page of an in-memory PDF.
pub trait PageRasterizer: Send + Sync {
    fn render_page(&self, pdf: &[u8], page_index: usize, dpi: u32)
        -> Result<RgbaImage, RenderError>;

    fn is_available(&self) -> bool;
}

/// pdfium-backed rasterizer. The library is bound per call so no pdfium
/// state outlives a request.
#[derive(Debug, Clone, Default)]
pub struct PdfiumRasterizer {
    library_dir: Option<PathBuf>,
}

impl PdfiumRasterizer {
    pub fn new(library_dir: Option<PathBuf>) -> Self {
        Self { library_dir }
    }

    fn search_paths(&self) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(dir) = &self.library_dir {
            paths.push(dir.clone());
        }
        if let Ok(exe_path) = std::env::current_exe() {
            if let Some(exe_dir) = exe_path.parent() {
                paths.push(exe_dir.join("libs"));
                paths.push(exe_dir.to_path_buf());
            }
        }
        paths.push(PathBuf::from("libs"));
        paths.push(PathBuf::from("./"));
        paths
    }

    fn bind(&self) -> Result<Pdfium, RenderError> {
        for path in self.search_paths() {
            let lib_path = Pdfium::pdfium_platform_library_name_at_path(&path);
            log::debug!("[Rasterize] trying pdfium at {:?}", lib_path);
            if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
                log::info!("[Rasterize] pdfium loaded from {:?}", path);
                return Ok(Pdfium::new(bindings));
            }
        }
        Pdfium::bind_to_system_library()
            .map(Pdfium::new)
            .map_err(|e| RenderError::Unavailable(e.to_string()))
    }
}

impl PageRasterizer for PdfiumRasterizer {
    fn render_page(
        &self,
        pdf: &[u8],
        page_index: usize,
        dpi: u32,
    ) -> Result<RgbaImage, RenderError> {
        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf, None)
            .map_err(|e| RenderError::Render(format!("load failed: {}", e)))?;
        let index = u16::try_from(page_index)
            .map_err(|_| RenderError::Render(format!("page index {} out of range", page_index)))?;
        let page = document
            .pages()
            .get(index)
            .map_err(|e| RenderError::Render(format!("page {}: {}", page_index, e)))?;

        // PDF user space is 72 units per inch.
        let scale = dpi as f32 / 72.0;
        let target_width = (page.width().value * scale).round() as i32;
        let target_height = (page.height().value * scale).round() as i32;

        log::info!(
            "[Rasterize] page {}: {}x{} px at {} dpi",
            page_index,
            target_width,
            target_height,
            dpi
        );

        let render_config = PdfRenderConfig::new()
            .set_target_width(target_width)
            .set_target_height(target_height);

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| RenderError::Render(format!("render failed: {}", e)))?;

        Ok(bitmap.as_image().to_rgba8())
    }

    fn is_available(&self) -> bool {
        self.bind().is_ok()
    }
}

/// Rasterizer for deployments without pdfium; every call fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRasterizer;

impl PageRasterizer for NoRasterizer {
    fn render_page(&self, _pdf: &[u8], _page: usize, _dpi: u32) -> Result<RgbaImage, RenderError> {
        Err(RenderError::Unavailable("no page rasterizer configured".to_string()))
    }

    fn is_available(&self) -> bool {
        false
    }
}

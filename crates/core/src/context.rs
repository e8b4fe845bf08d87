//! Per-request state. Everything a request touches hangs off one
//! [`RequestContext`] and is wiped when it drops, whatever the outcome.

use image::RgbaImage;
use lopdf::{Document, ObjectId};
use safedoc_pdf::{wipe_document, Matrix, PageText};
use safedoc_render::Rect;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use zeroize::{Zeroize, Zeroizing};

use crate::classify::PageRoute;
use crate::error::{RedactError, Result};
use crate::layout::TextLayout;

/// Shared cancellation signal, checked between stages and while waiting on OCR.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            log::info!("[Request] cancelled");
            return Err(RedactError::Cancelled);
        }
        Ok(())
    }

    pub(crate) fn shared(&self) -> &Arc<AtomicBool> {
        &self.0
    }
}

/// A PDF page as the pipeline sees it.
pub(crate) struct PageState {
    pub index: usize,
    pub page_id: ObjectId,
    pub route: PageRoute,
    pub scanned: bool,
    /// Visible page area in user space.
    pub bounds: Rect,
    /// Parsed content, consumed when the page is rewritten.
    pub content: Option<PageText>,
    pub layout: TextLayout,
}

#[derive(Debug, Clone)]
pub(crate) enum SurfaceKind {
    /// Image XObject painted on one or more pages.
    Embedded {
        object_id: ObjectId,
        /// (page index, image-to-user-space matrix)
        placements: Vec<(usize, Matrix)>,
    },
    /// A page rendered by the rasterizer because its text cannot be trusted.
    Rendered { page: usize, dpi: u32 },
    /// The uploaded file itself, with the resolution it declares, if any.
    Standalone { dpi: Option<f32> },
}

/// A bitmap that is OCR'd and painted at its own resolution.
pub(crate) struct RasterSurface {
    pub kind: SurfaceKind,
    /// Page the surface is reported against.
    pub page: usize,
    pub image: RgbaImage,
    /// OCR layout in the pixel space of `image`.
    pub layout: TextLayout,
    /// Pixel boxes painted so far.
    pub painted: Vec<Rect>,
}

impl RasterSurface {
    pub fn new(kind: SurfaceKind, page: usize, image: RgbaImage) -> Self {
        Self {
            kind,
            page,
            image,
            layout: TextLayout::default(),
            painted: Vec::new(),
        }
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(0.0, 0.0, self.image.width() as f32, self.image.height() as f32)
    }

    pub fn object_id(&self) -> Option<ObjectId> {
        match self.kind {
            SurfaceKind::Embedded { object_id, .. } => Some(object_id),
            _ => None,
        }
    }
}

impl Drop for RasterSurface {
    fn drop(&mut self) {
        let pixels: &mut [u8] = &mut self.image;
        pixels.zeroize();
        self.layout.zeroize();
    }
}

pub(crate) struct RequestContext {
    pub input: Zeroizing<Vec<u8>>,
    pub password: Option<Zeroizing<String>>,
    pub doc: Option<Document>,
    /// Decrypted serialization handed to the rasterizer for encrypted inputs.
    pub render_source: Option<Zeroizing<Vec<u8>>>,
    pub encrypted: bool,
    pub pages: Vec<PageState>,
    pub surfaces: Vec<RasterSurface>,
    pub cancel: CancelFlag,
}

impl RequestContext {
    pub fn new(
        input: Zeroizing<Vec<u8>>,
        password: Option<Zeroizing<String>>,
        cancel: CancelFlag,
    ) -> Self {
        Self {
            input,
            password,
            doc: None,
            render_source: None,
            encrypted: false,
            pages: Vec::new(),
            surfaces: Vec::new(),
            cancel,
        }
    }

    pub fn doc(&self) -> Result<&Document> {
        self.doc
            .as_ref()
            .ok_or_else(|| RedactError::CorruptDocument("document not loaded".to_string()))
    }

    pub fn doc_mut(&mut self) -> Result<&mut Document> {
        self.doc
            .as_mut()
            .ok_or_else(|| RedactError::CorruptDocument("document not loaded".to_string()))
    }

    /// Bytes the rasterizer should open: decrypted if the input was encrypted.
    pub fn render_bytes(&self) -> &[u8] {
        match &self.render_source {
            Some(bytes) => bytes.as_slice(),
            None => self.input.as_slice(),
        }
    }
}

impl Drop for RequestContext {
    fn drop(&mut self) {
        if let Some(doc) = self.doc.as_mut() {
            wipe_document(doc);
        }
        for page in &mut self.pages {
            page.layout.zeroize();
        }
        self.surfaces.clear();
        log::debug!("[Request] context released");
    }
}

//! PDF structure handling: glyph extraction, content-stream rewriting,
//! image re-embedding, sanitization and in-memory load/save.

pub mod annots;
pub mod classify;
pub mod clean;
pub mod error;
pub mod filters;
pub mod fonts;
pub mod images;
pub mod io;
pub mod matrix;
pub mod redact;
pub mod text;
pub mod utils;

pub use annots::flatten_annotations;
pub use classify::{page_content_type, PageContentType};
pub use clean::{is_sanitized, sanitize_document, CleanResult};
pub use error::{PdfError, Result};
pub use images::{
    decode_image, page_rect_to_pixels, replace_image, replace_page_with_raster, to_opaque_rgb,
};
pub use io::{declares_encryption, looks_like_pdf, open_pdf, save_document, wipe_document, OpenedPdf};
pub use matrix::Matrix;
pub use redact::{flatten_page, rewrite_page, PageRedaction, PlaceholderText};
pub use text::{extract_page, Glyph, ImagePlacement, PageText};
pub use utils::{get_page_box, get_page_rotation};

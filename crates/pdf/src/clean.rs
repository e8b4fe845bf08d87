//! Document and page level sanitization.
//!
//! Removes everything that can carry text outside the page content:
//! document info, XMP, forms, annotations, attachments, scripts, outlines,
//! structure trees and optional-content configuration.

use lopdf::content::Content;
use lopdf::{Document, Object, ObjectId};

use crate::error::{PdfError, Result};
use crate::redact::content_stream_count;
use crate::utils::get_page_content;

const CATALOG_KEYS: &[&[u8]] = &[
    b"Metadata",
    b"AcroForm",
    b"OCProperties",
    b"Names",
    b"Dests",
    b"OpenAction",
    b"AA",
    b"Outlines",
    b"Threads",
    b"StructTreeRoot",
    b"MarkInfo",
    b"PieceInfo",
    b"LastModified",
    b"SpiderInfo",
    b"Perms",
    b"Collection",
];

const PAGE_KEYS: &[&[u8]] = &[
    b"Metadata",
    b"Thumb",
    b"PieceInfo",
    b"LastModified",
    b"Annots",
    b"AA",
    b"StructParents",
    b"B",
];

/// Cleaning summary
#[derive(Debug, Clone, Default)]
pub struct CleanResult {
    pub items_removed: usize,
    pub details: Vec<String>,
}

impl CleanResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, detail: String) {
        self.items_removed += 1;
        self.details.push(detail);
    }

    pub fn merge(&mut self, other: CleanResult) {
        self.items_removed += other.items_removed;
        self.details.extend(other.details);
    }
}

fn get_catalog_id(doc: &Document) -> Result<ObjectId> {
    match doc.trailer.get(b"Root") {
        Ok(Object::Reference(id)) => Ok(*id),
        _ => Err(PdfError::Parse("trailer has no /Root".to_string())),
    }
}

/// Removes the Info dictionary from the trailer.
pub fn clean_info_dict(doc: &mut Document) -> CleanResult {
    let mut result = CleanResult::new();
    if doc.trailer.remove(b"Info").is_some() {
        result.add("trailer/Info".to_string());
    }
    result
}

pub fn clean_catalog(doc: &mut Document) -> Result<CleanResult> {
    let mut result = CleanResult::new();
    let catalog_id = get_catalog_id(doc)?;
    let catalog = doc.get_dictionary_mut(catalog_id)?;
    for key in CATALOG_KEYS {
        if catalog.remove(key).is_some() {
            result.add(format!("Catalog/{}", String::from_utf8_lossy(key)));
        }
    }
    Ok(result)
}

pub fn clean_pages(doc: &mut Document) -> CleanResult {
    let mut result = CleanResult::new();
    let page_ids: Vec<ObjectId> = doc.page_iter().collect();
    for (index, page_id) in page_ids.into_iter().enumerate() {
        if let Ok(page) = doc.get_dictionary_mut(page_id) {
            for key in PAGE_KEYS {
                if page.remove(key).is_some() {
                    result.add(format!("page {}/{}", index + 1, String::from_utf8_lossy(key)));
                }
            }
        }
    }
    result
}

/// Runs every cleaning step.
pub fn sanitize_document(doc: &mut Document) -> Result<CleanResult> {
    let mut result = clean_info_dict(doc);
    result.merge(clean_catalog(doc)?);
    result.merge(clean_pages(doc));
    log::info!("[Clean] removed {} item(s)", result.items_removed);
    for detail in &result.details {
        log::debug!("[Clean] {}", detail);
    }
    Ok(result)
}

/// True when the document already looks like engine output: nothing the
/// cleaner would remove, one content stream per page and no marked-content
/// property lists.
pub fn is_sanitized(doc: &Document) -> bool {
    if doc.trailer.has(b"Info") || doc.trailer.has(b"Encrypt") {
        return false;
    }
    let Ok(catalog) = get_catalog_id(doc).and_then(|id| Ok(doc.get_dictionary(id)?)) else {
        return false;
    };
    if CATALOG_KEYS.iter().any(|k| catalog.has(k)) {
        return false;
    }
    doc.page_iter().all(|page_id| {
        let Ok(page) = doc.get_dictionary(page_id) else {
            return false;
        };
        if PAGE_KEYS.iter().any(|k| page.has(k)) || content_stream_count(doc, page_id) > 1 {
            return false;
        }
        match get_page_content(doc, page_id).map(|data| Content::decode(&data)) {
            Ok(Ok(content)) => content.operations.iter().all(|op| op.operator != "BDC"),
            _ => false,
        }
    })
}

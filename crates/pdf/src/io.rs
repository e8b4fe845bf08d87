//! Loading, decrypting, saving and wiping documents. Everything stays in
//! memory.

use lopdf::{Document, Object, ObjectId};
use std::collections::BTreeSet;
use zeroize::Zeroize;

use crate::error::{PdfError, Result};

/// A loaded document with encryption already removed.
pub struct OpenedPdf {
    pub doc: Document,
    /// The file carried an encryption dictionary.
    pub encrypted: bool,
}

/// Cheap check on the raw bytes.
pub fn declares_encryption(bytes: &[u8]) -> bool {
    bytes.windows(8).any(|w| w == b"/Encrypt")
}

pub fn looks_like_pdf(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(1024)];
    head.windows(5).any(|w| w == b"%PDF-")
}

fn load(bytes: &[u8]) -> Result<Document> {
    Document::load_mem(bytes).map_err(|e| PdfError::Parse(e.to_string()))
}

/// Loads `bytes`, decrypting with the empty user password or `password`.
pub fn open_pdf(bytes: &[u8], password: Option<&str>) -> Result<OpenedPdf> {
    let declared = declares_encryption(bytes);
    let mut doc = match load(bytes) {
        Ok(doc) => doc,
        Err(e) if declared => {
            log::warn!("[Open] encrypted document failed to load: {}", e);
            return Err(match password {
                None => PdfError::PasswordRequired,
                Some(_) => PdfError::InvalidPassword,
            });
        }
        Err(e) => return Err(e),
    };

    let encrypted = declared || doc.is_encrypted();
    if doc.is_encrypted() {
        if doc.decrypt("").is_ok() {
            log::info!("[Open] opened with empty user password");
        } else {
            let Some(password) = password else {
                return Err(PdfError::PasswordRequired);
            };
            let mut retry = load(bytes)?;
            if let Err(e) = retry.decrypt(password) {
                log::info!("[Open] password rejected: {}", e);
                wipe_document(&mut retry);
                return Err(PdfError::InvalidPassword);
            }
            wipe_document(&mut doc);
            doc = retry;
        }
    }
    drop_encryption_dictionary(&mut doc);

    if doc.get_pages().is_empty() {
        return Err(PdfError::Parse("document has no pages".to_string()));
    }
    Ok(OpenedPdf { doc, encrypted })
}

fn drop_encryption_dictionary(doc: &mut Document) {
    if let Ok(Object::Reference(id)) = doc.trailer.get(b"Encrypt") {
        let id = *id;
        if let Some(mut obj) = doc.objects.remove(&id) {
            wipe_object(&mut obj);
        }
    }
    doc.trailer.remove(b"Encrypt");
}

/// Every object reachable from the trailer.
fn reachable(doc: &Document) -> BTreeSet<ObjectId> {
    let mut seen = BTreeSet::new();
    let mut pending: Vec<ObjectId> = Vec::new();
    for (_, value) in doc.trailer.iter() {
        collect_refs(value, &mut pending);
    }
    while let Some(id) = pending.pop() {
        if !seen.insert(id) {
            continue;
        }
        if let Some(obj) = doc.objects.get(&id) {
            collect_refs(obj, &mut pending);
        }
    }
    seen
}

fn collect_refs(obj: &Object, out: &mut Vec<ObjectId>) {
    match obj {
        Object::Reference(id) => out.push(*id),
        Object::Array(arr) => arr.iter().for_each(|o| collect_refs(o, out)),
        Object::Dictionary(dict) => dict.iter().for_each(|(_, o)| collect_refs(o, out)),
        Object::Stream(stream) => stream.dict.iter().for_each(|(_, o)| collect_refs(o, out)),
        _ => {}
    }
}

/// Drops unreachable objects, wiping them first.
pub fn prune_unreachable(doc: &mut Document) -> usize {
    let keep = reachable(doc);
    let orphans: Vec<ObjectId> = doc
        .objects
        .keys()
        .filter(|id| !keep.contains(id))
        .copied()
        .collect();
    for id in &orphans {
        if let Some(mut obj) = doc.objects.remove(id) {
            wipe_object(&mut obj);
        }
    }
    orphans.len()
}

/// Serializes the document after pruning orphans.
pub fn save_document(doc: &mut Document) -> Result<Vec<u8>> {
    let pruned = prune_unreachable(doc);
    log::debug!("[Save] pruned {} unreachable object(s)", pruned);
    doc.compress();
    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|e| PdfError::Write(e.to_string()))?;
    Ok(out)
}

pub fn wipe_object(obj: &mut Object) {
    match obj {
        Object::String(bytes, _) => bytes.zeroize(),
        Object::Array(arr) => arr.iter_mut().for_each(wipe_object),
        Object::Dictionary(dict) => dict.iter_mut().for_each(|(_, o)| wipe_object(o)),
        Object::Stream(stream) => {
            stream.content.zeroize();
            stream.dict.iter_mut().for_each(|(_, o)| wipe_object(o));
        }
        _ => {}
    }
}

/// Zeroes every string and stream payload held by the document.
pub fn wipe_document(doc: &mut Document) {
    for obj in doc.objects.values_mut() {
        wipe_object(obj);
    }
    doc.objects.clear();
    doc.trailer.iter_mut().for_each(|(_, o)| wipe_object(o));
}

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use safedoc_render::Rect;

use crate::error::{PdfError, Result};

/// Maximum Parent hops when resolving inherited page attributes.
const MAX_INHERIT_DEPTH: usize = 32;

/// Reads a number operand.
pub fn get_number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

pub fn get_numbers<const N: usize>(operands: &[Object]) -> Option<[f32; N]> {
    if operands.len() < N {
        return None;
    }
    let mut out = [0.0; N];
    for (slot, obj) in out.iter_mut().zip(operands) {
        *slot = get_number(obj)?;
    }
    Some(out)
}

/// Follows a reference, returning the object itself otherwise.
pub fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        _ => obj,
    }
}

pub fn resolve_dict<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    match resolve(doc, obj) {
        Object::Dictionary(dict) => Some(dict),
        Object::Stream(stream) => Some(&stream.dict),
        _ => None,
    }
}

pub fn name_of(obj: &Object) -> Option<&[u8]> {
    match obj {
        Object::Name(n) => Some(n.as_slice()),
        _ => None,
    }
}

/// Looks up a page attribute, walking up the page tree for inheritable keys.
pub fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_INHERIT_DEPTH {
        if let Ok(value) = current.get(key) {
            return Some(value);
        }
        let parent = match current.get(b"Parent") {
            Ok(Object::Reference(id)) => *id,
            _ => return None,
        };
        current = doc.get_dictionary(parent).ok()?;
    }
    None
}

pub(crate) fn box_values(doc: &Document, obj: &Object) -> Option<Rect> {
    let Object::Array(arr) = resolve(doc, obj) else {
        return None;
    };
    let values: Vec<f32> = arr
        .iter()
        .filter_map(|o| get_number(resolve(doc, o)))
        .collect();
    if values.len() == 4 {
        Some(Rect::new(values[0], values[1], values[2], values[3]))
    } else {
        None
    }
}

/// Visible page area: CropBox if present, else MediaBox, else US Letter.
pub fn get_page_box(doc: &Document, page_id: ObjectId) -> Rect {
    let media = inherited(doc, page_id, b"MediaBox").and_then(|o| box_values(doc, o));
    let crop = inherited(doc, page_id, b"CropBox").and_then(|o| box_values(doc, o));
    match (crop, media) {
        (Some(crop), Some(media)) => crop.clamp_to(&media),
        (Some(b), None) | (None, Some(b)) => b,
        (None, None) => {
            log::warn!("[PageBox] no MediaBox, assuming Letter");
            Rect::new(0.0, 0.0, 612.0, 792.0)
        }
    }
}

pub fn get_page_rotation(doc: &Document, page_id: ObjectId) -> i64 {
    match inherited(doc, page_id, b"Rotate").map(|o| resolve(doc, o)) {
        Some(Object::Integer(r)) => r.rem_euclid(360),
        _ => 0,
    }
}

/// Decoded stream bytes; undecodable streams yield their raw content.
pub fn get_stream_content(stream: &Stream) -> Vec<u8> {
    stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone())
}

/// Concatenated content streams of a page.
pub fn get_page_content(doc: &Document, page_id: ObjectId) -> Result<Vec<u8>> {
    let page = doc.get_dictionary(page_id)?;
    let contents = match page.get(b"Contents") {
        Ok(contents) => contents,
        Err(_) => return Ok(Vec::new()),
    };

    match resolve(doc, contents) {
        Object::Stream(stream) => Ok(get_stream_content(stream)),
        Object::Array(arr) => {
            let mut all_content = Vec::new();
            for item in arr {
                match resolve(doc, item) {
                    Object::Stream(stream) => {
                        all_content.extend(get_stream_content(stream));
                        all_content.push(b'\n');
                    }
                    _ => {
                        return Err(PdfError::Parse(
                            "content array holds a non-stream".to_string(),
                        ))
                    }
                }
            }
            Ok(all_content)
        }
        Object::Null => Ok(Vec::new()),
        _ => Err(PdfError::Parse("unexpected /Contents type".to_string())),
    }
}

/// The page's (possibly inherited) resource dictionary.
pub fn page_resources(doc: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    inherited(doc, page_id, b"Resources").and_then(|o| resolve_dict(doc, o))
}

/// Named entry of a resource category (`Font`, `XObject`, ...).
pub fn resource_entry<'a>(
    doc: &'a Document,
    resources: Option<&'a Dictionary>,
    category: &[u8],
    name: &[u8],
) -> Option<(Option<ObjectId>, &'a Object)> {
    let category = resources?.get(category).ok()?;
    let dict = resolve_dict(doc, category)?;
    let entry = dict.get(name).ok()?;
    match entry {
        Object::Reference(id) => doc.get_object(*id).ok().map(|o| (Some(*id), o)),
        other => Some((None, other)),
    }
}

//! Annotation and form-widget flattening.
//!
//! The normal appearance of every visible annotation is painted into the
//! page content as a Form XObject, so removing `/Annots` and `/AcroForm`
//! afterwards keeps what a reader saw on the page.

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use crate::error::{PdfError, Result};
use crate::matrix::Matrix;
use crate::redact::replace_contents;
use crate::utils::{box_values, get_number, get_page_content, inherited, name_of, resolve, resolve_dict};

const FLAG_HIDDEN: i64 = 1 << 1;
const FLAG_NO_VIEW: i64 = 1 << 5;

/// Prefix of the XObject names given to flattened appearances.
const APPEARANCE_PREFIX: &str = "SdAp";

#[derive(Debug, Clone, Copy)]
struct Appearance {
    stream_id: ObjectId,
    placement: Matrix,
}

fn annotation_flags(doc: &Document, annot: &Dictionary) -> i64 {
    annot
        .get(b"F")
        .ok()
        .and_then(|o| get_number(resolve(doc, o)))
        .map_or(0, |v| v as i64)
}

/// `/AP /N`, picking the `/AS` state when the entry is a state dictionary.
fn normal_appearance(doc: &Document, annot: &Dictionary) -> Option<ObjectId> {
    let ap = resolve_dict(doc, annot.get(b"AP").ok()?)?;
    let entry = ap.get(b"N").ok()?;
    let state_entry = |states: &Dictionary| {
        let state = annot.get(b"AS").ok().and_then(name_of)?;
        states.get(state).ok()?.as_reference().ok()
    };
    match entry {
        Object::Reference(id) => match doc.get_object(*id).ok()? {
            Object::Stream(_) => Some(*id),
            Object::Dictionary(states) => state_entry(states),
            _ => None,
        },
        Object::Dictionary(states) => state_entry(states),
        _ => None,
    }
}

/// Matrix that maps the appearance's transformed `/BBox` onto `rect`.
fn placement(doc: &Document, form: &Stream, rect: &safedoc_render::Rect) -> Option<Matrix> {
    let bbox = box_values(doc, form.dict.get(b"BBox").ok()?)?;
    let form_matrix = match form.dict.get(b"Matrix").map(|o| resolve(doc, o)) {
        Ok(Object::Array(values)) if values.len() == 6 => {
            let v: Vec<f32> = values.iter().filter_map(|o| get_number(resolve(doc, o))).collect();
            if v.len() != 6 {
                return None;
            }
            Matrix([v[0], v[1], v[2], v[3], v[4], v[5]])
        }
        _ => Matrix::IDENTITY,
    };
    let corners = [
        form_matrix.apply(bbox.x0, bbox.y0),
        form_matrix.apply(bbox.x1, bbox.y0),
        form_matrix.apply(bbox.x0, bbox.y1),
        form_matrix.apply(bbox.x1, bbox.y1),
    ];
    let shown = safedoc_render::Rect::from_points(&corners)?;
    if shown.width() <= 0.0 || shown.height() <= 0.0 {
        return None;
    }
    let sx = rect.width() / shown.width();
    let sy = rect.height() / shown.height();
    Some(Matrix([sx, 0.0, 0.0, sy, rect.x0 - shown.x0 * sx, rect.y0 - shown.y0 * sy]))
}

fn page_appearances(doc: &Document, page_id: ObjectId) -> Vec<Appearance> {
    let Some(annots) = doc.get_dictionary(page_id).ok().and_then(|p| p.get(b"Annots").ok()) else {
        return Vec::new();
    };
    let Object::Array(items) = resolve(doc, annots) else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for item in items {
        let Some(annot) = resolve_dict(doc, item) else {
            continue;
        };
        let subtype = annot.get(b"Subtype").ok().and_then(name_of).unwrap_or(&b"Unknown"[..]);
        if subtype == b"Popup" || annotation_flags(doc, annot) & (FLAG_HIDDEN | FLAG_NO_VIEW) != 0 {
            continue;
        }
        let Some(rect) = annot.get(b"Rect").ok().and_then(|o| box_values(doc, o)) else {
            continue;
        };
        let Some(stream_id) = normal_appearance(doc, annot) else {
            log::debug!(
                "[Annots] {} annotation without appearance dropped",
                String::from_utf8_lossy(subtype)
            );
            continue;
        };
        let Ok(Object::Stream(form)) = doc.get_object(stream_id) else {
            continue;
        };
        if let Some(placement) = placement(doc, form, &rect) {
            out.push(Appearance { stream_id, placement });
        }
    }
    out
}

/// Appends the appearances to the page content under fresh XObject names.
fn stamp_page(doc: &mut Document, page_id: ObjectId, appearances: &[Appearance]) -> Result<()> {
    for appearance in appearances {
        if let Ok(Object::Stream(form)) = doc.get_object_mut(appearance.stream_id) {
            form.dict.set("Type", "XObject");
            form.dict.set("Subtype", "Form");
        }
    }

    let mut resources = inherited(doc, page_id, b"Resources")
        .and_then(|o| resolve_dict(doc, o))
        .cloned()
        .unwrap_or_else(Dictionary::new);
    let mut xobjects = resources
        .get(b"XObject")
        .ok()
        .and_then(|o| resolve_dict(doc, o))
        .cloned()
        .unwrap_or_else(Dictionary::new);

    let mut operations = Vec::new();
    let mut next = 0;
    for appearance in appearances {
        let name = loop {
            let candidate = format!("{}{}", APPEARANCE_PREFIX, next);
            next += 1;
            if !xobjects.has(candidate.as_bytes()) {
                break candidate;
            }
        };
        xobjects.set(name.clone(), Object::Reference(appearance.stream_id));
        operations.push(Operation::new("q", vec![]));
        operations.push(Operation::new(
            "cm",
            appearance.placement.0.iter().map(|v| Object::Real(*v)).collect(),
        ));
        operations.push(Operation::new("Do", vec![Object::Name(name.into_bytes())]));
        operations.push(Operation::new("Q", vec![]));
    }
    let stamped = Content { operations }
        .encode()
        .map_err(|e| PdfError::Write(format!("encode content: {}", e)))?;

    // The page's own content may leave the graphics state changed.
    let mut data = b"q\n".to_vec();
    data.extend(get_page_content(doc, page_id)?);
    data.extend_from_slice(b"\nQ\n");
    data.extend(stamped);
    let content_id = doc.add_object(Stream::new(Dictionary::new(), data));
    replace_contents(doc, page_id, content_id)?;

    resources.set("XObject", xobjects);
    doc.get_dictionary_mut(page_id)?.set("Resources", resources);
    Ok(())
}

/// Paints the normal appearance of every visible annotation into its page.
///
/// Hidden annotations and popups are skipped. `/Annots` itself is left for
/// the sanitizer to remove. Returns the number of appearances painted.
pub fn flatten_annotations(doc: &mut Document) -> Result<usize> {
    let mut total = 0;
    let page_ids: Vec<ObjectId> = doc.page_iter().collect();
    for (index, page_id) in page_ids.into_iter().enumerate() {
        let appearances = page_appearances(doc, page_id);
        if appearances.is_empty() {
            continue;
        }
        stamp_page(doc, page_id, &appearances)?;
        log::debug!("[Annots] page {}: {} appearance(s) flattened", index + 1, appearances.len());
        total += appearances.len();
    }
    if total > 0 {
        log::info!("[Annots] flattened {} annotation appearance(s)", total);
    }
    Ok(total)
}

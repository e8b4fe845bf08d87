//! Content-stream rewriting for native pages.
//!
//! Glyphs inside a redaction are cut out of their show operations and
//! replaced by an equivalent positioning adjustment, so the remaining text
//! keeps its layout. The opaque boxes and placeholder runs are then painted
//! on top, and the page ends up with a single content stream.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use safedoc_render::Rect;
use std::collections::HashMap;
use zeroize::Zeroize;

use crate::error::{PdfError, Result};
use crate::fonts::helvetica_width;
use crate::text::{Glyph, PageText};
use crate::utils::{page_resources, resolve, resolve_dict};

/// Resource name of the font used for placeholder runs.
pub const PLACEHOLDER_FONT: &[u8] = b"SdHelv";

/// Placeholder glyph run drawn over the hidden part of a partial mask.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceholderText {
    pub rect: Rect,
    pub text: String,
}

/// Everything to change on one native page.
#[derive(Debug, Clone, Default)]
pub struct PageRedaction {
    /// Indices into `PageText::glyphs`.
    pub glyphs: Vec<usize>,
    /// Opaque boxes in default user space.
    pub boxes: Vec<Rect>,
    pub placeholders: Vec<PlaceholderText>,
}

/// A glyph slated for removal: byte range and advance to preserve.
#[derive(Debug, Clone, Copy)]
struct Cut {
    start: usize,
    end: usize,
    adjust: f32,
}

/// Replaces the page content with the rewritten, flattened stream.
pub fn rewrite_page(
    doc: &mut Document,
    page_id: ObjectId,
    page: PageText,
    redaction: &PageRedaction,
) -> Result<()> {
    let cuts = collect_cuts(&page.glyphs, &redaction.glyphs);
    let removed = cuts.values().map(Vec::len).sum::<usize>();

    let mut operations = vec![Operation::new("q", vec![])];
    let mut depth = 0usize;
    for (index, op) in page.content.operations.into_iter().enumerate() {
        match op.operator.as_str() {
            "q" => depth += 1,
            "Q" if depth == 0 => {
                log::debug!("[Redact] dropping unbalanced Q at {}", index);
                continue;
            }
            "Q" => depth -= 1,
            _ => {}
        }
        rewrite_operation(index, op, &cuts, &mut operations);
    }
    operations.extend((0..depth).map(|_| Operation::new("Q", vec![])));
    operations.push(Operation::new("Q", vec![]));

    operations.extend(overlay_operations(&redaction.boxes));
    for placeholder in &redaction.placeholders {
        operations.extend(placeholder_operations(placeholder));
    }

    let mut data = Content { operations }
        .encode()
        .map_err(|e| PdfError::Write(format!("encode content: {}", e)))?;
    let mut stream = Stream::new(dictionary! {}, data.clone());
    data.zeroize();
    if let Err(e) = stream.compress() {
        log::warn!("[Redact] content left uncompressed: {}", e);
    }
    let stream_id = doc.add_object(stream);

    if !redaction.placeholders.is_empty() {
        install_placeholder_font(doc, page_id)?;
    }
    replace_contents(doc, page_id, stream_id)?;

    log::info!(
        "[Redact] page {:?}: removed {} glyph(s), {} box(es), {} placeholder(s)",
        page_id,
        removed,
        redaction.boxes.len(),
        redaction.placeholders.len()
    );
    Ok(())
}

fn collect_cuts(glyphs: &[Glyph], selected: &[usize]) -> HashMap<(usize, usize), Vec<Cut>> {
    let mut cuts: HashMap<(usize, usize), Vec<Cut>> = HashMap::new();
    for glyph in selected.iter().filter_map(|i| glyphs.get(*i)) {
        cuts.entry((glyph.op_index, glyph.item_index))
            .or_default()
            .push(Cut {
                start: glyph.byte_start,
                end: glyph.byte_end,
                adjust: glyph.adjust,
            });
    }
    for list in cuts.values_mut() {
        list.sort_by_key(|c| c.start);
        list.dedup_by_key(|c| c.start);
    }
    cuts
}

fn rewrite_operation(
    index: usize,
    op: Operation,
    cuts: &HashMap<(usize, usize), Vec<Cut>>,
    out: &mut Vec<Operation>,
) {
    let Operation { operator, mut operands } = op;
    let has_cuts = |item: usize| cuts.contains_key(&(index, item));

    match operator.as_str() {
        "BDC" => {
            // Property lists may carry ActualText or Alt copies of the text.
            operands.truncate(1);
            out.push(Operation::new("BMC", operands));
        }
        "Tj" if has_cuts(0) => {
            let items = operands.into_iter().take(1).collect();
            out.push(Operation::new("TJ", vec![Object::Array(cut_items(index, items, cuts))]));
        }
        "'" if has_cuts(0) => {
            out.push(Operation::new("T*", vec![]));
            let items = operands.into_iter().take(1).collect();
            out.push(Operation::new("TJ", vec![Object::Array(cut_items(index, items, cuts))]));
        }
        "\"" if has_cuts(0) && operands.len() >= 3 => {
            let string = operands.pop().into_iter().collect();
            let ac = operands.pop().unwrap_or(Object::Integer(0));
            let aw = operands.pop().unwrap_or(Object::Integer(0));
            out.push(Operation::new("Tw", vec![aw]));
            out.push(Operation::new("Tc", vec![ac]));
            out.push(Operation::new("T*", vec![]));
            // The string was operand 2 but maps to glyph item 0.
            out.push(Operation::new("TJ", vec![Object::Array(cut_items(index, string, cuts))]));
        }
        "TJ" if cuts.keys().any(|(op, _)| *op == index) => {
            let items = match operands.into_iter().next() {
                Some(Object::Array(items)) => items,
                _ => Vec::new(),
            };
            out.push(Operation::new("TJ", vec![Object::Array(cut_items(index, items, cuts))]));
        }
        _ => out.push(Operation { operator, operands }),
    }
}

/// Rebuilds TJ items with every cut glyph replaced by its advance.
fn cut_items(
    index: usize,
    items: Vec<Object>,
    cuts: &HashMap<(usize, usize), Vec<Cut>>,
) -> Vec<Object> {
    let mut out = Vec::with_capacity(items.len());
    for (item_index, item) in items.into_iter().enumerate() {
        let Some(list) = cuts.get(&(index, item_index)) else {
            out.push(item);
            continue;
        };
        let Object::String(mut bytes, format) = item else {
            out.push(item);
            continue;
        };
        let mut cursor = 0;
        for cut in list {
            if cut.start > cursor {
                out.push(Object::String(bytes[cursor..cut.start].to_vec(), format));
            }
            push_adjust(&mut out, -cut.adjust);
            cursor = cut.end.min(bytes.len());
        }
        if cursor < bytes.len() {
            out.push(Object::String(bytes[cursor..].to_vec(), format));
        }
        bytes.zeroize();
    }
    out
}

fn push_adjust(out: &mut Vec<Object>, value: f32) {
    if let Some(Object::Real(prev)) = out.last_mut() {
        *prev += value;
        return;
    }
    out.push(Object::Real(value));
}

fn overlay_operations(boxes: &[Rect]) -> Vec<Operation> {
    if boxes.is_empty() {
        return Vec::new();
    }
    let mut ops = vec![
        Operation::new("q", vec![]),
        Operation::new("rg", vec![0.into(), 0.into(), 0.into()]),
        Operation::new("RG", vec![0.into(), 0.into(), 0.into()]),
    ];
    for rect in boxes {
        ops.push(Operation::new(
            "re",
            vec![
                Object::Real(rect.x0),
                Object::Real(rect.y0),
                Object::Real(rect.width()),
                Object::Real(rect.height()),
            ],
        ));
    }
    ops.push(Operation::new("f", vec![]));
    ops.push(Operation::new("Q", vec![]));
    ops
}

fn placeholder_operations(placeholder: &PlaceholderText) -> Vec<Operation> {
    let rect = placeholder.rect;
    let units: f32 = placeholder.text.bytes().map(helvetica_width).sum();
    if units <= 0.0 || rect.is_empty() {
        return Vec::new();
    }
    let size = (rect.height() * 0.7).min(rect.width() * 1000.0 / units);
    if size <= 0.5 {
        return Vec::new();
    }
    let text_width = units * size / 1000.0;
    let x = rect.x0 + (rect.width() - text_width) / 2.0;
    let y = rect.y0 + (rect.height() - size * 0.7) / 2.0;

    vec![
        Operation::new("q", vec![]),
        Operation::new("BT", vec![]),
        Operation::new("rg", vec![1.into(), 1.into(), 1.into()]),
        Operation::new(
            "Tf",
            vec![Object::Name(PLACEHOLDER_FONT.to_vec()), Object::Real(size)],
        ),
        Operation::new("Td", vec![Object::Real(x), Object::Real(y)]),
        Operation::new(
            "Tj",
            vec![Object::String(placeholder.text.as_bytes().to_vec(), StringFormat::Literal)],
        ),
        Operation::new("ET", vec![]),
        Operation::new("Q", vec![]),
    ]
}

/// Gives the page its own resource dictionary with the placeholder font.
fn install_placeholder_font(doc: &mut Document, page_id: ObjectId) -> Result<()> {
    let mut resources = page_resources(doc, page_id)
        .cloned()
        .unwrap_or_else(Dictionary::new);
    let mut fonts: Dictionary = resources
        .get(b"Font")
        .ok()
        .and_then(|f| resolve_dict(doc, f))
        .cloned()
        .unwrap_or_else(Dictionary::new);
    if !fonts.has(PLACEHOLDER_FONT) {
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        fonts.set(PLACEHOLDER_FONT.to_vec(), Object::Reference(font_id));
    }
    resources.set("Font", Object::Dictionary(fonts));
    let page = doc.get_dictionary_mut(page_id)?;
    page.set("Resources", Object::Dictionary(resources));
    Ok(())
}

/// Points the page at `stream_id` and wipes the streams it replaces.
pub(crate) fn replace_contents(doc: &mut Document, page_id: ObjectId, stream_id: ObjectId) -> Result<()> {
    let old = match doc.get_dictionary(page_id)?.get(b"Contents") {
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(arr)) => {
                let mut ids: Vec<ObjectId> = arr.iter().filter_map(|o| o.as_reference().ok()).collect();
                ids.push(*id);
                ids
            }
            _ => vec![*id],
        },
        Ok(Object::Array(arr)) => arr.iter().filter_map(|o| o.as_reference().ok()).collect(),
        _ => Vec::new(),
    };

    doc.get_dictionary_mut(page_id)?
        .set("Contents", Object::Reference(stream_id));

    for id in old {
        if let Ok(Object::Stream(stream)) = doc.get_object_mut(id) {
            stream.content.zeroize();
            stream.dict.remove(b"Filter");
            stream.dict.remove(b"DecodeParms");
            stream.dict.set("Length", 0);
        }
    }
    Ok(())
}

/// Rewrites the content of every page with no redactions of its own so
/// marked-content properties and multi-stream contents are flattened too.
pub fn flatten_page(doc: &mut Document, page_id: ObjectId, page: PageText) -> Result<()> {
    rewrite_page(doc, page_id, page, &PageRedaction::default())
}

/// Number of content streams behind a page's `/Contents`.
pub fn content_stream_count(doc: &Document, page_id: ObjectId) -> usize {
    let Ok(page) = doc.get_dictionary(page_id) else {
        return 0;
    };
    match page.get(b"Contents").map(|c| resolve(doc, c)) {
        Ok(Object::Stream(_)) => 1,
        Ok(Object::Array(arr)) => arr.len(),
        _ => 0,
    }
}

//! Glyph-level text extraction from page content streams.
//!
//! Every shown character code becomes a [`Glyph`] carrying its position in
//! the operation list, so the same decoded [`Content`] can later be
//! rewritten glyph by glyph.

use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId};
use safedoc_render::Rect;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{PdfError, Result};
use crate::fonts::FontInfo;
use crate::matrix::Matrix;
use crate::utils::{
    get_number, get_numbers, get_page_content, get_stream_content, name_of, page_resources,
    resolve_dict, resource_entry,
};

/// Glyph box in em units, relative to the baseline origin.
const DESCENT: f32 = -0.2;
const ASCENT: f32 = 0.8;

/// One shown character code.
#[derive(Debug, Clone, PartialEq)]
pub struct Glyph {
    /// Index of the showing operation in `PageText::content`.
    pub op_index: usize,
    /// Element index inside a TJ array, 0 for the other operators.
    pub item_index: usize,
    pub byte_start: usize,
    pub byte_end: usize,
    pub text: Option<String>,
    /// Bounding box in default user space.
    pub rect: Rect,
    pub origin: (f32, f32),
    /// Rendered font size in user space units.
    pub size: f32,
    /// Horizontal advance expressed as a TJ adjustment (thousandths of text space).
    pub adjust: f32,
}

/// An image XObject painted by a `Do` operation.
#[derive(Debug, Clone)]
pub struct ImagePlacement {
    pub name: Vec<u8>,
    pub object_id: Option<ObjectId>,
    /// Maps the unit square of the image to user space.
    pub ctm: Matrix,
    pub op_index: usize,
}

#[derive(Debug)]
pub struct PageText {
    pub content: Content,
    pub glyphs: Vec<Glyph>,
    pub images: Vec<ImagePlacement>,
    /// Form XObjects that draw text or images of their own.
    pub opaque_forms: usize,
    pub inline_images: usize,
    pub path_ops: usize,
}

impl PageText {
    pub fn unmapped_glyphs(&self) -> usize {
        self.glyphs.iter().filter(|g| g.text.is_none()).count()
    }

    /// Count of non-whitespace characters in the text layer.
    pub fn native_chars(&self) -> usize {
        self.glyphs
            .iter()
            .filter_map(|g| g.text.as_deref())
            .flat_map(str::chars)
            .filter(|c| !c.is_whitespace())
            .count()
    }
}

#[derive(Clone)]
struct GraphicsState {
    ctm: Matrix,
    char_spacing: f32,
    word_spacing: f32,
    h_scale: f32,
    leading: f32,
    rise: f32,
    font: Rc<FontInfo>,
    font_size: f32,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            ctm: Matrix::IDENTITY,
            char_spacing: 0.0,
            word_spacing: 0.0,
            h_scale: 1.0,
            leading: 0.0,
            rise: 0.0,
            font: Rc::new(FontInfo::fallback()),
            font_size: 0.0,
        }
    }
}

struct Extractor<'a> {
    doc: &'a Document,
    resources: Option<&'a Dictionary>,
    fonts: HashMap<Vec<u8>, Rc<FontInfo>>,
    gs: GraphicsState,
    stack: Vec<GraphicsState>,
    tm: Matrix,
    tlm: Matrix,
    out: PageText,
}

/// Decodes a page's content and walks it, collecting glyphs and images.
pub fn extract_page(doc: &Document, page_id: ObjectId) -> Result<PageText> {
    let data = get_page_content(doc, page_id)?;
    let content = Content::decode(&data)
        .map_err(|e| PdfError::Parse(format!("content stream: {}", e)))?;
    Ok(extract_content(doc, page_resources(doc, page_id), content))
}

pub fn extract_content(doc: &Document, resources: Option<&Dictionary>, content: Content) -> PageText {
    let mut extractor = Extractor {
        doc,
        resources,
        fonts: HashMap::new(),
        gs: GraphicsState::default(),
        stack: Vec::new(),
        tm: Matrix::IDENTITY,
        tlm: Matrix::IDENTITY,
        out: PageText {
            content: Content { operations: Vec::new() },
            glyphs: Vec::new(),
            images: Vec::new(),
            opaque_forms: 0,
            inline_images: 0,
            path_ops: 0,
        },
    };
    for (index, op) in content.operations.iter().enumerate() {
        extractor.step(index, &op.operator, &op.operands);
    }
    let mut out = extractor.out;
    out.content = content;
    out
}

impl<'a> Extractor<'a> {
    fn step(&mut self, index: usize, operator: &str, operands: &[Object]) {
        match operator {
            "q" => self.stack.push(self.gs.clone()),
            "Q" => {
                if let Some(saved) = self.stack.pop() {
                    self.gs = saved;
                }
            }
            "cm" => {
                if let Some(m) = get_numbers::<6>(operands) {
                    self.gs.ctm = Matrix(m).then(&self.gs.ctm);
                }
            }
            "BT" => {
                self.tm = Matrix::IDENTITY;
                self.tlm = Matrix::IDENTITY;
            }
            "Tc" => self.set_number(operands, |gs, v| gs.char_spacing = v),
            "Tw" => self.set_number(operands, |gs, v| gs.word_spacing = v),
            "Tz" => self.set_number(operands, |gs, v| gs.h_scale = v / 100.0),
            "TL" => self.set_number(operands, |gs, v| gs.leading = v),
            "Ts" => self.set_number(operands, |gs, v| gs.rise = v),
            "Tf" => {
                if let (Some(name), Some(size)) = (
                    operands.first().and_then(name_of),
                    operands.get(1).and_then(get_number),
                ) {
                    self.gs.font = self.font(name);
                    self.gs.font_size = size;
                }
            }
            "Td" => {
                if let Some([tx, ty]) = get_numbers::<2>(operands) {
                    self.next_line(tx, ty);
                }
            }
            "TD" => {
                if let Some([tx, ty]) = get_numbers::<2>(operands) {
                    self.gs.leading = -ty;
                    self.next_line(tx, ty);
                }
            }
            "Tm" => {
                if let Some(m) = get_numbers::<6>(operands) {
                    self.tm = Matrix(m);
                    self.tlm = self.tm;
                }
            }
            "T*" => self.next_line(0.0, -self.gs.leading),
            "Tj" => {
                if let Some(Object::String(bytes, _)) = operands.first() {
                    self.show(index, 0, bytes);
                }
            }
            "'" => {
                self.next_line(0.0, -self.gs.leading);
                if let Some(Object::String(bytes, _)) = operands.first() {
                    self.show(index, 0, bytes);
                }
            }
            "\"" => {
                if let Some([aw, ac]) = get_numbers::<2>(operands) {
                    self.gs.word_spacing = aw;
                    self.gs.char_spacing = ac;
                }
                self.next_line(0.0, -self.gs.leading);
                if let Some(Object::String(bytes, _)) = operands.get(2) {
                    self.show(index, 0, bytes);
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = operands.first() {
                    for (item_index, item) in items.iter().enumerate() {
                        match item {
                            Object::String(bytes, _) => self.show(index, item_index, bytes),
                            other => {
                                if let Some(n) = get_number(other) {
                                    let tx = -n / 1000.0 * self.gs.font_size * self.gs.h_scale;
                                    self.tm = Matrix::translate(tx, 0.0).then(&self.tm);
                                }
                            }
                        }
                    }
                }
            }
            "Do" => {
                if let Some(name) = operands.first().and_then(name_of) {
                    self.paint_xobject(index, name);
                }
            }
            "BI" => self.out.inline_images += 1,
            "m" | "l" | "c" | "v" | "y" | "h" | "re" => self.out.path_ops += 1,
            _ => {}
        }
    }

    fn set_number(&mut self, operands: &[Object], apply: impl FnOnce(&mut GraphicsState, f32)) {
        if let Some(v) = operands.first().and_then(get_number) {
            apply(&mut self.gs, v);
        }
    }

    fn next_line(&mut self, tx: f32, ty: f32) {
        self.tlm = Matrix::translate(tx, ty).then(&self.tlm);
        self.tm = self.tlm;
    }

    fn font(&mut self, name: &[u8]) -> Rc<FontInfo> {
        if let Some(font) = self.fonts.get(name) {
            return Rc::clone(font);
        }
        let info = match resource_entry(self.doc, self.resources, b"Font", name)
            .and_then(|(_, obj)| resolve_dict(self.doc, obj))
        {
            Some(dict) => FontInfo::load(self.doc, dict),
            None => {
                log::warn!(
                    "[TextExtract] font /{} not in resources, using fallback metrics",
                    String::from_utf8_lossy(name)
                );
                FontInfo::fallback()
            }
        };
        let info = Rc::new(info);
        self.fonts.insert(name.to_vec(), Rc::clone(&info));
        info
    }

    fn show(&mut self, op_index: usize, item_index: usize, bytes: &[u8]) {
        let gs = self.gs.clone();
        let tfs = gs.font_size;
        let font = Rc::clone(&gs.font);
        for decoded in font.decode(bytes) {
            let trm = Matrix([tfs * gs.h_scale, 0.0, 0.0, tfs, 0.0, gs.rise])
                .then(&self.tm)
                .then(&gs.ctm);
            let w0 = decoded.width;
            let corners = [
                trm.apply(0.0, DESCENT),
                trm.apply(w0, DESCENT),
                trm.apply(0.0, ASCENT),
                trm.apply(w0, ASCENT),
            ];
            let word_spacing = if !font.two_byte && decoded.code == 32 {
                gs.word_spacing
            } else {
                0.0
            };
            let advance = w0 * tfs + gs.char_spacing + word_spacing;
            let adjust = if tfs.abs() > f32::EPSILON {
                advance * 1000.0 / tfs
            } else {
                w0 * 1000.0
            };
            if let Some(rect) = Rect::from_points(&corners) {
                self.out.glyphs.push(Glyph {
                    op_index,
                    item_index,
                    byte_start: decoded.byte_start,
                    byte_end: decoded.byte_end,
                    text: decoded.text,
                    rect,
                    origin: trm.apply(0.0, 0.0),
                    size: trm.y_scale(),
                    adjust,
                });
            }
            self.tm = Matrix::translate(advance * gs.h_scale, 0.0).then(&self.tm);
        }
    }

    fn paint_xobject(&mut self, op_index: usize, name: &[u8]) {
        let Some((object_id, obj)) = resource_entry(self.doc, self.resources, b"XObject", name)
        else {
            return;
        };
        let Object::Stream(stream) = obj else {
            return;
        };
        match stream.dict.get(b"Subtype").ok().and_then(name_of) {
            Some(b"Image") => self.out.images.push(ImagePlacement {
                name: name.to_vec(),
                object_id,
                ctm: self.gs.ctm,
                op_index,
            }),
            Some(b"Form") => {
                if form_draws_content(&get_stream_content(stream)) {
                    self.out.opaque_forms += 1;
                }
            }
            _ => {}
        }
    }
}

/// Whether a form's content shows text or paints images.
fn form_draws_content(data: &[u8]) -> bool {
    match Content::decode(data) {
        Ok(content) => content
            .operations
            .iter()
            .any(|op| matches!(op.operator.as_str(), "BT" | "Do" | "BI")),
        Err(_) => true,
    }
}

#![allow(dead_code)]

use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use lopdf::{dictionary, Document, Object, Stream, StringFormat};
use rc4::consts::{U10, U5};
use rc4::{KeyInit, Rc4, StreamCipher};
use safedoc_core::layout::TextLayout;
use safedoc_core::{EngineConfig, RedactionEngine};
use safedoc_ocr::{OcrEngine, OcrError, OcrWord, WordBox};
use safedoc_render::{NoRasterizer, PageRasterizer, RenderError};
use std::io::{Cursor, Write};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

pub const PAGE_WIDTH: i64 = 612;
pub const PAGE_HEIGHT: i64 = 792;

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('(', "\\(").replace(')', "\\)")
}

/// One Letter page of Helvetica text, one line per entry starting at (72, 700).
pub fn text_document(lines: &[&str]) -> Document {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });

    let mut ops = String::from("BT /F1 12 Tf 14 TL 72 700 Td\n");
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            ops.push_str("T*\n");
        }
        ops.push_str(&format!("({}) Tj\n", escape(line)));
    }
    ops.push_str("ET\n");
    let content_id = doc.add_object(Stream::new(dictionary! {}, ops.into_bytes()));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
        "Resources" => dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        },
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    let info_id = doc.add_object(dictionary! {
        "Title" => Object::string_literal("Applicant record"),
        "Author" => Object::string_literal("Registrar"),
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);
    doc
}

pub fn save(mut doc: Document) -> Vec<u8> {
    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

pub fn text_pdf(lines: &[&str]) -> Vec<u8> {
    save(text_document(lines))
}

/// A page whose only font is a Type0 font without a ToUnicode map.
pub fn unmapped_font_pdf() -> Vec<u8> {
    let mut doc = text_document(&[]);
    let descendant = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "CIDFontType2",
        "BaseFont" => "NotoSansDevanagari",
        "DW" => 1000,
    });
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type0",
        "BaseFont" => "NotoSansDevanagari",
        "Encoding" => "Identity-H",
        "DescendantFonts" => vec![descendant.into()],
    });
    let content_id = doc.add_object(Stream::new(
        dictionary! {},
        b"BT /F2 12 Tf 72 700 Td <00410042004300440045> Tj ET".to_vec(),
    ));
    let page_id = *doc.get_pages().values().next().unwrap();
    let page = doc.get_dictionary_mut(page_id).unwrap();
    page.set("Contents", content_id);
    page.set(
        "Resources",
        dictionary! { "Font" => dictionary! { "F2" => font_id } },
    );
    save(doc)
}

/// A text page carrying a FreeText annotation whose appearance shows `note`.
pub fn annotated_pdf(lines: &[&str], note: &str) -> Vec<u8> {
    let mut doc = text_document(lines);
    let appearance = doc.add_object(Stream::new(
        dictionary! {
            "BBox" => vec![0.into(), 0.into(), 200.into(), 20.into()],
            "Resources" => dictionary! {
                "Font" => dictionary! {
                    "Helv" => dictionary! {
                        "Type" => "Font",
                        "Subtype" => "Type1",
                        "BaseFont" => "Helvetica",
                    },
                },
            },
        },
        format!("BT /Helv 10 Tf 2 6 Td ({}) Tj ET", escape(note)).into_bytes(),
    ));
    let annot = doc.add_object(dictionary! {
        "Type" => "Annot",
        "Subtype" => "FreeText",
        "Rect" => vec![72.into(), 600.into(), 272.into(), 620.into()],
        "F" => 4,
        "Contents" => Object::string_literal(note),
        "AP" => dictionary! { "N" => appearance },
    });
    let page_id = *doc.get_pages().values().next().unwrap();
    doc.get_dictionary_mut(page_id)
        .unwrap()
        .set("Annots", vec![Object::Reference(annot)]);
    save(doc)
}

/// A page that is one full-bleed RGB image, one image pixel per point.
fn scanned_document(image_stream: Stream, width: u32, height: u32) -> Document {
    let (w, h) = (width as i64, height as i64);
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let image_id = doc.add_object(image_stream);
    let content = format!("q {} 0 0 {} 0 0 cm /Im0 Do Q", w, h);
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "MediaBox" => vec![0.into(), 0.into(), w.into(), h.into()],
        "Resources" => dictionary! {
            "XObject" => dictionary! { "Im0" => image_id },
        },
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc
}

fn image_dict(image: &RgbImage) -> lopdf::Dictionary {
    dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => image.width() as i64,
        "Height" => image.height() as i64,
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8,
    }
}

/// Scanned page with raw, unfiltered samples.
pub fn scanned_pdf(image: &RgbImage) -> Vec<u8> {
    let stream = Stream::new(image_dict(image), image.as_raw().clone());
    save(scanned_document(stream, image.width(), image.height()))
}

/// Scanned page whose samples are Flate-compressed with PNG row predictors,
/// the way scanner drivers usually write them.
pub fn flate_scanned_pdf(image: &RgbImage) -> Vec<u8> {
    let row = image.width() as usize * 3;
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    for line in image.as_raw().chunks(row) {
        // PNG "Sub" filter on every row.
        let mut encoded = vec![1u8];
        for (i, byte) in line.iter().enumerate() {
            let left = if i >= 3 { line[i - 3] } else { 0 };
            encoded.push(byte.wrapping_sub(left));
        }
        encoder.write_all(&encoded).unwrap();
    }
    let mut dict = image_dict(image);
    dict.set("Filter", "FlateDecode");
    dict.set(
        "DecodeParms",
        dictionary! { "Predictor" => 11, "Colors" => 3, "Columns" => image.width() as i64 },
    );
    let stream = Stream::new(dict, encoder.finish().unwrap());
    save(scanned_document(stream, image.width(), image.height()))
}

pub fn white_image(width: u32, height: u32) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb([255, 255, 255]))
}

pub fn png(image: &RgbImage) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

// Standard security handler, revision 2 (40-bit RC4).

const PAD: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08,
    0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

fn padded(password: &str) -> Vec<u8> {
    let mut out: Vec<u8> = password.bytes().take(32).collect();
    let missing = 32 - out.len();
    out.extend_from_slice(&PAD[..missing]);
    out
}

fn rc4_40(key: &[u8], data: &mut [u8]) {
    let mut cipher = Rc4::<U5>::new_from_slice(key).unwrap();
    cipher.apply_keystream(data);
}

fn rc4_80(key: &[u8], data: &mut [u8]) {
    let mut cipher = Rc4::<U10>::new_from_slice(key).unwrap();
    cipher.apply_keystream(data);
}

fn owner_entry(owner: &str, user: &str) -> Vec<u8> {
    let digest = md5::compute(padded(owner));
    let mut o = padded(user);
    rc4_40(&digest.0[..5], &mut o);
    o
}

fn file_key(user: &str, o: &[u8], p: i32, id: &[u8]) -> Vec<u8> {
    let mut ctx = md5::Context::new();
    ctx.consume(padded(user));
    ctx.consume(o);
    ctx.consume(p.to_le_bytes());
    ctx.consume(id);
    ctx.compute().0[..5].to_vec()
}

fn object_key(key: &[u8], num: u32, gen: u16) -> Vec<u8> {
    let mut ctx = md5::Context::new();
    ctx.consume(key);
    ctx.consume(&num.to_le_bytes()[..3]);
    ctx.consume(gen.to_le_bytes());
    ctx.compute().0[..10].to_vec()
}

fn encrypt_object(obj: &mut Object, key: &[u8]) {
    match obj {
        Object::String(bytes, _) => rc4_80(key, bytes),
        Object::Array(items) => items.iter_mut().for_each(|o| encrypt_object(o, key)),
        Object::Dictionary(dict) => dict.iter_mut().for_each(|(_, o)| encrypt_object(o, key)),
        Object::Stream(stream) => {
            stream.dict.iter_mut().for_each(|(_, o)| encrypt_object(o, key));
            rc4_80(key, &mut stream.content);
        }
        _ => {}
    }
}

/// Encrypts every string and stream with `user` as the open password.
pub fn encrypt_rc4(mut doc: Document, user: &str, owner: &str) -> Vec<u8> {
    let id = b"safedoc-fixture!".to_vec();
    let p: i32 = -4;
    let o = owner_entry(owner, user);
    let key = file_key(user, &o, p, &id);
    let mut u = PAD.to_vec();
    rc4_40(&key, &mut u);

    for (&(num, gen), obj) in doc.objects.iter_mut() {
        encrypt_object(obj, &object_key(&key, num, gen));
    }
    let encrypt_id = doc.add_object(dictionary! {
        "Filter" => "Standard",
        "V" => 1,
        "R" => 2,
        "Length" => 40,
        "O" => Object::String(o, StringFormat::Hexadecimal),
        "U" => Object::String(u, StringFormat::Hexadecimal),
        "P" => p as i64,
    });
    doc.trailer.set("Encrypt", encrypt_id);
    doc.trailer.set(
        "ID",
        vec![
            Object::String(id.clone(), StringFormat::Hexadecimal),
            Object::String(id, StringFormat::Hexadecimal),
        ],
    );
    save(doc)
}

/// Returns scripted words, leaving out any whose box center has been painted black.
///
/// Word boxes are given for an image `base_width` pixels wide and follow the
/// image when the engine hands over an upscaled copy.
pub struct ScriptedOcr {
    words: Vec<OcrWord>,
    base_width: Option<u32>,
}

impl ScriptedOcr {
    pub fn new(words: Vec<OcrWord>) -> Self {
        Self {
            words,
            base_width: None,
        }
    }

    pub fn scaled(words: Vec<OcrWord>, base_width: u32) -> Self {
        Self {
            words,
            base_width: Some(base_width),
        }
    }
}

impl OcrEngine for ScriptedOcr {
    fn name(&self) -> &str {
        "scripted"
    }

    fn recognize(
        &self,
        image: &DynamicImage,
        _deadline: Instant,
        _cancel: &AtomicBool,
    ) -> Result<Vec<OcrWord>, OcrError> {
        let rgba = image.to_rgba8();
        let factor = self
            .base_width
            .map_or(1.0, |base| rgba.width() as f32 / base as f32);
        Ok(self
            .words
            .iter()
            .cloned()
            .map(|mut w| {
                let scale = |v: u32| (v as f32 * factor).round() as u32;
                w.bbox = WordBox {
                    left: scale(w.bbox.left),
                    top: scale(w.bbox.top),
                    width: scale(w.bbox.width),
                    height: scale(w.bbox.height),
                };
                w
            })
            .filter(|w| {
                let cx = w.bbox.left + w.bbox.width / 2;
                let cy = w.bbox.top + w.bbox.height / 2;
                cx >= rgba.width()
                    || cy >= rgba.height()
                    || *rgba.get_pixel(cx, cy) != Rgba([0, 0, 0, 255])
            })
            .collect())
    }
}

pub fn word(text: &str, left: u32, top: u32, width: u32) -> OcrWord {
    OcrWord {
        text: text.to_string(),
        confidence: 0.92,
        bbox: WordBox {
            left,
            top,
            width,
            height: 20,
        },
        line: (1, 1, 1),
    }
}

/// "Aadhaar 1234 5678 9012" on one line of a 400x100 image.
pub fn aadhaar_words() -> Vec<OcrWord> {
    vec![
        word("Aadhaar", 10, 40, 70),
        word("1234", 100, 40, 40),
        word("5678", 150, 40, 40),
        word("9012", 200, 40, 40),
    ]
}

pub fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    // Fixture images sit at one pixel per point (72 dpi); keep them unscaled.
    config.ocr.min_dpi = 60;
    config.ocr.workers = 2;
    config.ocr.timeout_secs = 10;
    config
}

pub fn engine_with_ocr(words: Vec<OcrWord>) -> RedactionEngine {
    let ocr: Arc<dyn OcrEngine> = Arc::new(ScriptedOcr::new(words));
    RedactionEngine::with_components(test_config(), Some(ocr), Arc::new(NoRasterizer))
}

/// Renders every page as the same bitmap.
pub struct FixedRasterizer {
    image: RgbaImage,
}

impl FixedRasterizer {
    pub fn new(image: RgbaImage) -> Self {
        Self { image }
    }
}

impl PageRasterizer for FixedRasterizer {
    fn render_page(&self, _pdf: &[u8], _page_index: usize, _dpi: u32) -> Result<RgbaImage, RenderError> {
        Ok(self.image.clone())
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// OCR engine whose word boxes belong to an image `base_width` pixels wide.
pub fn engine_with_scaled_ocr(words: Vec<OcrWord>, base_width: u32) -> RedactionEngine {
    let ocr: Arc<dyn OcrEngine> = Arc::new(ScriptedOcr::scaled(words, base_width));
    RedactionEngine::with_components(test_config(), Some(ocr), Arc::new(NoRasterizer))
}

pub fn engine_with_rasterizer(words: Vec<OcrWord>, page: RgbaImage) -> RedactionEngine {
    let ocr: Arc<dyn OcrEngine> = Arc::new(ScriptedOcr::new(words));
    RedactionEngine::with_components(test_config(), Some(ocr), Arc::new(FixedRasterizer::new(page)))
}

pub fn engine_without_ocr() -> RedactionEngine {
    RedactionEngine::with_components(test_config(), None, Arc::new(NoRasterizer))
}

/// Logical text of every page of `bytes`, pages separated by form feeds.
pub fn pdf_text(bytes: &[u8]) -> String {
    let opened = safedoc_pdf::open_pdf(bytes, None).unwrap();
    let mut out = String::new();
    for (_, page_id) in opened.doc.get_pages() {
        let page = safedoc_pdf::extract_page(&opened.doc, page_id).unwrap();
        out.push_str(&TextLayout::from_glyphs(&page.glyphs).text);
        out.push('\x0c');
    }
    out
}

/// First image painted on the first page of `bytes`.
pub fn first_page_image(bytes: &[u8]) -> image::RgbaImage {
    let opened = safedoc_pdf::open_pdf(bytes, None).unwrap();
    let page_id = *opened.doc.get_pages().values().next().unwrap();
    let page = safedoc_pdf::extract_page(&opened.doc, page_id).unwrap();
    let id = page.images[0].object_id.unwrap();
    safedoc_pdf::decode_image(&opened.doc, id).unwrap().to_rgba8()
}

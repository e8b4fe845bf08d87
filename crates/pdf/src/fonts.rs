//! Font metrics and code-to-Unicode mapping for glyph extraction.

use lopdf::{Dictionary, Document, Object};
use std::collections::HashMap;

use crate::utils::{get_number, get_stream_content, name_of, resolve, resolve_dict};

/// Helvetica advance widths for codes 32..=126, in 1/1000 em.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // 32-47
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // 48-63
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // 64-79
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // 80-95
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // 96-111
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, // 112-126
];

pub fn helvetica_width(code: u8) -> f32 {
    match code {
        32..=126 => HELVETICA_WIDTHS[(code - 32) as usize] as f32,
        _ => 556.0,
    }
}

/// One decoded character code of a shown string.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedGlyph {
    pub code: u32,
    pub byte_start: usize,
    pub byte_end: usize,
    /// Horizontal displacement in text space units (w0).
    pub width: f32,
    /// Unicode text, `None` when the code cannot be mapped.
    pub text: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Metrics {
    Explicit,
    Helvetica,
    Monospace,
}

#[derive(Debug, Clone)]
pub struct FontInfo {
    pub two_byte: bool,
    widths: HashMap<u32, f32>,
    default_width: f32,
    metrics: Metrics,
    /// Glyph-space to text-space factor (FontMatrix[0] for Type3).
    width_scale: f32,
    to_unicode: Option<HashMap<u32, String>>,
    differences: HashMap<u32, String>,
}

impl FontInfo {
    /// Metrics used when a font resource cannot be found.
    pub fn fallback() -> Self {
        Self {
            two_byte: false,
            widths: HashMap::new(),
            default_width: 556.0,
            metrics: Metrics::Helvetica,
            width_scale: 0.001,
            to_unicode: None,
            differences: HashMap::new(),
        }
    }

    pub fn load(doc: &Document, font: &Dictionary) -> Self {
        let subtype = font.get(b"Subtype").ok().and_then(name_of).unwrap_or(b"");
        let base_font = font
            .get(b"BaseFont")
            .ok()
            .and_then(name_of)
            .map(|n| String::from_utf8_lossy(n).to_string())
            .unwrap_or_default();

        let to_unicode = font
            .get(b"ToUnicode")
            .ok()
            .and_then(|o| match resolve(doc, o) {
                Object::Stream(s) => Some(parse_to_unicode(&get_stream_content(s))),
                _ => None,
            });

        let mut info = FontInfo {
            to_unicode,
            ..FontInfo::fallback()
        };

        if subtype == b"Type0" {
            info.two_byte = true;
            info.metrics = Metrics::Explicit;
            info.default_width = 1000.0;
            if let Some(descendant) = descendant_font(doc, font) {
                if let Some(dw) = descendant.get(b"DW").ok().and_then(|o| get_number(resolve(doc, o))) {
                    info.default_width = dw;
                }
                if let Ok(w) = descendant.get(b"W") {
                    if let Object::Array(arr) = resolve(doc, w) {
                        info.widths = parse_cid_widths(doc, arr);
                    }
                }
            }
            return info;
        }

        if subtype == b"Type3" {
            if let Ok(Object::Array(m)) = font.get(b"FontMatrix").map(|o| resolve(doc, o)) {
                if let Some(scale) = m.first().and_then(get_number) {
                    info.width_scale = scale;
                }
            }
        }

        if let Ok(Object::Array(widths)) = font.get(b"Widths").map(|o| resolve(doc, o)) {
            let first_char = font
                .get(b"FirstChar")
                .ok()
                .and_then(|o| get_number(resolve(doc, o)))
                .unwrap_or(0.0) as u32;
            for (i, w) in widths.iter().enumerate() {
                if let Some(w) = get_number(resolve(doc, w)) {
                    info.widths.insert(first_char + i as u32, w);
                }
            }
            info.metrics = Metrics::Explicit;
            info.default_width = missing_width(doc, font).unwrap_or(0.0);
        } else if base_font.contains("Courier") {
            info.metrics = Metrics::Monospace;
            info.default_width = 600.0;
        }

        if let Ok(encoding) = font.get(b"Encoding") {
            if let Some(enc) = resolve_dict(doc, encoding) {
                if let Ok(Object::Array(diffs)) = enc.get(b"Differences").map(|o| resolve(doc, o)) {
                    info.differences = parse_differences(diffs);
                }
            }
        }

        info
    }

    /// Splits a shown string into character codes.
    pub fn decode(&self, bytes: &[u8]) -> Vec<DecodedGlyph> {
        let step = if self.two_byte { 2 } else { 1 };
        bytes
            .chunks(step)
            .enumerate()
            .map(|(i, chunk)| {
                let code = chunk.iter().fold(0u32, |acc, b| (acc << 8) | *b as u32);
                DecodedGlyph {
                    code,
                    byte_start: i * step,
                    byte_end: i * step + chunk.len(),
                    width: self.glyph_width(code) * self.width_scale,
                    text: self.unicode(code),
                }
            })
            .collect()
    }

    fn glyph_width(&self, code: u32) -> f32 {
        if let Some(w) = self.widths.get(&code) {
            return *w;
        }
        match self.metrics {
            Metrics::Explicit => self.default_width,
            Metrics::Monospace => 600.0,
            Metrics::Helvetica => helvetica_width(code.min(255) as u8),
        }
    }

    fn unicode(&self, code: u32) -> Option<String> {
        if let Some(map) = &self.to_unicode {
            if let Some(s) = map.get(&code) {
                return Some(s.clone());
            }
        }
        if self.two_byte {
            return None;
        }
        if let Some(name) = self.differences.get(&code) {
            return glyph_name_to_unicode(name);
        }
        match code {
            0x20..=0x7e => char::from_u32(code).map(String::from),
            0xa0..=0xff => char::from_u32(code).map(String::from),
            _ => None,
        }
    }
}

fn descendant_font<'a>(doc: &'a Document, font: &'a Dictionary) -> Option<&'a Dictionary> {
    let descendants = font.get(b"DescendantFonts").ok()?;
    match resolve(doc, descendants) {
        Object::Array(arr) => arr.first().and_then(|o| resolve_dict(doc, o)),
        _ => None,
    }
}

fn missing_width(doc: &Document, font: &Dictionary) -> Option<f32> {
    let descriptor = resolve_dict(doc, font.get(b"FontDescriptor").ok()?)?;
    get_number(resolve(doc, descriptor.get(b"MissingWidth").ok()?))
}

/// `/W` array: `c [w1 w2 ...]` or `c_first c_last w`.
fn parse_cid_widths(doc: &Document, arr: &[Object]) -> HashMap<u32, f32> {
    let mut widths = HashMap::new();
    let mut i = 0;
    while i < arr.len() {
        let Some(first) = get_number(resolve(doc, &arr[i])) else {
            break;
        };
        let first = first as u32;
        match arr.get(i + 1).map(|o| resolve(doc, o)) {
            Some(Object::Array(list)) => {
                for (k, w) in list.iter().enumerate() {
                    if let Some(w) = get_number(resolve(doc, w)) {
                        widths.insert(first + k as u32, w);
                    }
                }
                i += 2;
            }
            Some(last) => {
                let (Some(last), Some(w)) = (
                    get_number(last),
                    arr.get(i + 2).and_then(|o| get_number(resolve(doc, o))),
                ) else {
                    break;
                };
                for code in first..=(last as u32).min(first + 0xffff) {
                    widths.insert(code, w);
                }
                i += 3;
            }
            None => break,
        }
    }
    widths
}

fn parse_differences(diffs: &[Object]) -> HashMap<u32, String> {
    let mut map = HashMap::new();
    let mut code = 0u32;
    for item in diffs {
        match item {
            Object::Integer(n) => code = (*n).max(0) as u32,
            Object::Name(name) => {
                map.insert(code, String::from_utf8_lossy(name).to_string());
                code += 1;
            }
            _ => {}
        }
    }
    map
}

fn glyph_name_to_unicode(name: &str) -> Option<String> {
    const DIGITS: [&str; 10] = [
        "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine",
    ];
    if name.len() == 1 && name.is_ascii() {
        return Some(name.to_string());
    }
    if let Some(d) = DIGITS.iter().position(|n| *n == name) {
        return Some(d.to_string());
    }
    if let Some(hex) = name.strip_prefix("uni") {
        if hex.len() == 4 {
            return u32::from_str_radix(hex, 16)
                .ok()
                .and_then(char::from_u32)
                .map(String::from);
        }
    }
    let c = match name {
        "space" => ' ',
        "hyphen" | "minus" => '-',
        "period" => '.',
        "comma" => ',',
        "slash" => '/',
        "colon" => ':',
        "semicolon" => ';',
        "at" => '@',
        "plus" => '+',
        "underscore" => '_',
        "parenleft" => '(',
        "parenright" => ')',
        "numbersign" => '#',
        "ampersand" => '&',
        _ => return None,
    };
    Some(c.to_string())
}

#[derive(Debug, PartialEq)]
enum Token {
    Hex(Vec<u8>),
    Open,
    Close,
    Word(String),
}

fn tokenize(data: &[u8]) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < data.len() {
        let b = data[i];
        if b.is_ascii_whitespace() {
            i += 1;
        } else if b == b'%' {
            while i < data.len() && data[i] != b'\n' && data[i] != b'\r' {
                i += 1;
            }
        } else if b == b'<' && data.get(i + 1) != Some(&b'<') {
            let end = data[i..]
                .iter()
                .position(|c| *c == b'>')
                .map(|p| i + p)
                .unwrap_or(data.len());
            let hex: Vec<u8> = data[i + 1..end]
                .iter()
                .copied()
                .filter(|c| c.is_ascii_hexdigit())
                .collect();
            tokens.push(Token::Hex(hex_bytes(&hex)));
            i = end + 1;
        } else if b == b'[' {
            tokens.push(Token::Open);
            i += 1;
        } else if b == b']' {
            tokens.push(Token::Close);
            i += 1;
        } else {
            let start = i;
            while i < data.len()
                && !data[i].is_ascii_whitespace()
                && !matches!(data[i], b'<' | b'[' | b']' | b'%')
            {
                i += 1;
            }
            if i == start {
                i += 1;
                continue;
            }
            tokens.push(Token::Word(String::from_utf8_lossy(&data[start..i]).to_string()));
        }
    }
    tokens
}

fn hex_bytes(hex: &[u8]) -> Vec<u8> {
    hex.chunks(2)
        .map(|pair| {
            let s = std::str::from_utf8(pair).unwrap_or("0");
            let v = u8::from_str_radix(s, 16).unwrap_or(0);
            if pair.len() == 1 {
                v << 4
            } else {
                v
            }
        })
        .collect()
}

fn code_of(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, b| (acc << 8) | *b as u32)
}

fn utf16_string(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks(2)
        .map(|p| if p.len() == 2 { u16::from_be_bytes([p[0], p[1]]) } else { p[0] as u16 })
        .collect();
    String::from_utf16_lossy(&units)
}

/// Parses the `bfchar` and `bfrange` sections of a ToUnicode CMap.
pub fn parse_to_unicode(data: &[u8]) -> HashMap<u32, String> {
    let tokens = tokenize(data);
    let mut map = HashMap::new();
    let mut i = 0;
    while i < tokens.len() {
        match &tokens[i] {
            Token::Word(w) if w == "beginbfchar" => {
                i += 1;
                while i + 1 < tokens.len() {
                    match (&tokens[i], &tokens[i + 1]) {
                        (Token::Hex(src), Token::Hex(dst)) => {
                            map.insert(code_of(src), utf16_string(dst));
                            i += 2;
                        }
                        _ => break,
                    }
                }
            }
            Token::Word(w) if w == "beginbfrange" => {
                i += 1;
                while i + 2 < tokens.len() {
                    let (Token::Hex(lo), Token::Hex(hi)) = (&tokens[i], &tokens[i + 1]) else {
                        break;
                    };
                    let (lo, hi) = (code_of(lo), code_of(hi));
                    match &tokens[i + 2] {
                        Token::Hex(dst) => {
                            let mut units: Vec<u16> = dst
                                .chunks(2)
                                .map(|p| if p.len() == 2 { u16::from_be_bytes([p[0], p[1]]) } else { p[0] as u16 })
                                .collect();
                            for code in lo..=hi.min(lo + 0xffff) {
                                map.insert(code, String::from_utf16_lossy(&units));
                                if let Some(last) = units.last_mut() {
                                    *last = last.wrapping_add(1);
                                }
                            }
                            i += 3;
                        }
                        Token::Open => {
                            let mut j = i + 3;
                            let mut code = lo;
                            while j < tokens.len() {
                                match &tokens[j] {
                                    Token::Hex(dst) => {
                                        if code <= hi {
                                            map.insert(code, utf16_string(dst));
                                        }
                                        code += 1;
                                        j += 1;
                                    }
                                    Token::Close => {
                                        j += 1;
                                        break;
                                    }
                                    _ => break,
                                }
                            }
                            i = j;
                        }
                        _ => break,
                    }
                }
            }
            _ => i += 1,
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    #[test]
    fn test_parse_bfchar_and_bfrange() {
        let cmap = b"/CIDInit /ProcSet findresource begin
            1 begincodespacerange <0000> <FFFF> endcodespacerange
            2 beginbfchar
            <0003> <0020>
            <0011> <0041>
            endbfchar
            2 beginbfrange
            <0013> <0015> <0031>
            <0020> <0021> [<0058> <0059>]
            endbfrange
            endcmap";
        let map = parse_to_unicode(cmap);
        assert_eq!(map.get(&0x03).map(String::as_str), Some(" "));
        assert_eq!(map.get(&0x11).map(String::as_str), Some("A"));
        assert_eq!(map.get(&0x13).map(String::as_str), Some("1"));
        assert_eq!(map.get(&0x15).map(String::as_str), Some("3"));
        assert_eq!(map.get(&0x21).map(String::as_str), Some("Y"));
    }

    #[test]
    fn test_type0_without_to_unicode_is_unmapped() {
        let doc = Document::with_version("1.5");
        let font = dictionary! {
            "Type" => "Font",
            "Subtype" => "Type0",
            "BaseFont" => "Foo",
        };
        let info = FontInfo::load(&doc, &font);
        let glyphs = info.decode(&[0x00, 0x11, 0x00, 0x12]);
        assert_eq!(glyphs.len(), 2);
        assert_eq!(glyphs[1].byte_start, 2);
        assert!(glyphs.iter().all(|g| g.text.is_none()));
        assert!((glyphs[0].width - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_simple_font_widths() {
        let doc = Document::with_version("1.5");
        let font = dictionary! {
            "Type" => "Font",
            "Subtype" => "TrueType",
            "FirstChar" => 65,
            "Widths" => vec![600.into(), 700.into()],
        };
        let info = FontInfo::load(&doc, &font);
        let glyphs = info.decode(b"AB");
        assert_eq!(glyphs[0].text.as_deref(), Some("A"));
        assert!((glyphs[1].width - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_standard_helvetica_metrics() {
        let doc = Document::with_version("1.5");
        let font = dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        };
        let info = FontInfo::load(&doc, &font);
        let glyphs = info.decode(b"1W");
        assert!((glyphs[0].width - 0.556).abs() < 1e-6);
        assert!((glyphs[1].width - 0.944).abs() < 1e-6);
    }

    #[test]
    fn test_differences_glyph_names() {
        let doc = Document::with_version("1.5");
        let font = dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "Encoding" => dictionary! {
                "Differences" => vec![1.into(), Object::Name(b"one".to_vec()), Object::Name(b"g77".to_vec())],
            },
        };
        let info = FontInfo::load(&doc, &font);
        let glyphs = info.decode(&[1, 2]);
        assert_eq!(glyphs[0].text.as_deref(), Some("1"));
        assert_eq!(glyphs[1].text, None);
    }
}

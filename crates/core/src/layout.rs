//! Logical page text with an offset-to-geometry map.
//!
//! Both extractors produce a [`TextLayout`]: a string the detector scans
//! and one cell per emitted character range. Separators the layout infers
//! (spaces between words, line breaks) have no geometry.

use safedoc_ocr::OcrWord;
use safedoc_pdf::Glyph;
use safedoc_render::Rect;
use zeroize::{Zeroize, Zeroizing};

/// Vertical baseline shift, relative to font size, that starts a new line.
const LINE_BREAK_RATIO: f32 = 0.5;
/// Horizontal gap, relative to font size, that reads as a word space.
const WORD_GAP_RATIO: f32 = 0.25;

#[derive(Debug, Clone, PartialEq)]
pub struct TextCell {
    pub start: usize,
    pub end: usize,
    pub rect: Option<Rect>,
    pub line: usize,
    /// Glyph or word index the cell was produced from.
    pub source: Option<usize>,
    pub confidence: f32,
}

#[derive(Debug, Default)]
pub struct TextLayout {
    pub text: Zeroizing<String>,
    pub cells: Vec<TextCell>,
}

impl TextLayout {
    fn push_cell(&mut self, s: &str, rect: Option<Rect>, line: usize, source: Option<usize>, confidence: f32) {
        let start = self.text.len();
        self.text.push_str(s);
        self.cells.push(TextCell {
            start,
            end: self.text.len(),
            rect,
            line,
            source,
            confidence,
        });
    }

    fn push_separator(&mut self, s: &str, line: usize) {
        self.push_cell(s, None, line, None, 1.0);
    }

    fn ends_with_space(&self) -> bool {
        self.text.chars().last().is_some_and(char::is_whitespace)
    }

    /// Lays out native glyphs in content-stream order.
    ///
    /// Glyphs without a Unicode mapping are skipped; pages that have any are
    /// never laid out natively.
    pub fn from_glyphs(glyphs: &[Glyph]) -> Self {
        let mut layout = TextLayout::default();
        let mut line = 0;
        let mut prev: Option<&Glyph> = None;

        for (index, glyph) in glyphs.iter().enumerate() {
            let Some(text) = glyph.text.as_deref() else {
                continue;
            };
            if text.is_empty() {
                continue;
            }
            if let Some(p) = prev {
                let size = p.size.max(glyph.size).max(1.0);
                let baseline_shift = (glyph.origin.1 - p.origin.1).abs();
                if baseline_shift > size * LINE_BREAK_RATIO {
                    line += 1;
                    layout.push_separator("\n", line);
                } else {
                    let gap = glyph.rect.x0 - p.rect.x1;
                    let went_back = glyph.origin.0 < p.origin.0 - size * WORD_GAP_RATIO;
                    let starts_with_space = text.starts_with(char::is_whitespace);
                    if (gap > size * WORD_GAP_RATIO || went_back)
                        && !layout.ends_with_space()
                        && !starts_with_space
                    {
                        layout.push_separator(" ", line);
                    }
                }
            }
            layout.push_cell(text, Some(glyph.rect), line, Some(index), 1.0);
            prev = Some(glyph);
        }
        layout
    }

    /// Lays out OCR words; boxes are in the pixel space of the OCR'd image.
    ///
    /// Words on one line are joined with a space unless their boxes touch,
    /// lines with a newline. Each character gets an equal slice of its word box.
    pub fn from_ocr_words(words: &[OcrWord]) -> Self {
        let mut layout = TextLayout::default();
        let mut line = 0;
        let mut prev: Option<&OcrWord> = None;

        for (index, word) in words.iter().enumerate() {
            let text = word.text.trim();
            if text.is_empty() {
                continue;
            }
            if let Some(p) = prev {
                if p.line != word.line {
                    line += 1;
                    layout.push_separator("\n", line);
                } else if word.bbox.left > p.bbox.left + p.bbox.width {
                    layout.push_separator(" ", line);
                }
            }

            let count = text.chars().count().max(1) as f32;
            let slice = word.bbox.width as f32 / count;
            let top = word.bbox.top as f32;
            let bottom = top + word.bbox.height as f32;
            let left = word.bbox.left as f32;
            let mut buf = [0u8; 4];
            for (i, c) in text.chars().enumerate() {
                let x0 = left + slice * i as f32;
                let rect = Rect::new(x0, top, x0 + slice, bottom);
                layout.push_cell(c.encode_utf8(&mut buf), Some(rect), line, Some(index), word.confidence);
            }
            buf.zeroize();
            prev = Some(word);
        }
        layout
    }

    fn overlapping(&self, start: usize, end: usize) -> impl Iterator<Item = &TextCell> {
        self.cells
            .iter()
            .filter(move |c| c.start < end && c.end > start)
    }

    /// Geometry of `start..end`, one rectangle per line the range touches.
    pub fn span_rects(&self, start: usize, end: usize) -> Vec<Rect> {
        let mut rects: Vec<(usize, Rect)> = Vec::new();
        for cell in self.overlapping(start, end) {
            let Some(rect) = cell.rect else {
                continue;
            };
            match rects.iter_mut().find(|(line, _)| *line == cell.line) {
                Some((_, acc)) => *acc = acc.union(&rect),
                None => rects.push((cell.line, rect)),
            }
        }
        rects.into_iter().map(|(_, r)| r).collect()
    }

    /// Distinct sources under `start..end`, in order.
    pub fn sources(&self, start: usize, end: usize) -> Vec<usize> {
        let mut out: Vec<usize> = self.overlapping(start, end).filter_map(|c| c.source).collect();
        out.dedup();
        out
    }

    /// Lowest recognition confidence under `start..end`.
    pub fn min_confidence(&self, start: usize, end: usize) -> f32 {
        self.overlapping(start, end)
            .filter(|c| c.source.is_some())
            .map(|c| c.confidence)
            .fold(1.0, f32::min)
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

impl Zeroize for TextLayout {
    fn zeroize(&mut self) {
        self.text.zeroize();
        self.cells.clear();
    }
}

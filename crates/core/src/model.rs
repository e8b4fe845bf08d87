//! Request, result and intermediate types of the redaction pipeline.

use safedoc_ocr::EngineInfo;
use safedoc_render::Rect;
use safedoc_rules::{masked_preview, LevelInfo, MaskPolicy, PiiType, SensitivityLevel};
use safedoc_verify::VerifyReport;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, Zeroizing};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScanType {
    /// Every page carries a usable text layer.
    Native,
    /// Every page needs OCR.
    Optical,
    Mixed,
}

impl ScanType {
    pub fn from_flags<I: IntoIterator<Item = bool>>(scanned: I) -> Self {
        let (mut any, mut all) = (false, true);
        for is_scanned in scanned {
            any |= is_scanned;
            all &= is_scanned;
        }
        match (any, all) {
            (false, _) => ScanType::Native,
            (true, true) => ScanType::Optical,
            (true, false) => ScanType::Mixed,
        }
    }
}

/// Where a span's text and geometry come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "index")]
pub enum Surface {
    /// The page's native text layer; rects are in PDF user space.
    Native,
    /// A raster surface of the request; rects are in its pixel space.
    Raster(usize),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextSpan {
    pub text: String,
    /// Byte offsets into the logical text of the page or surface.
    pub start: usize,
    pub end: usize,
    pub page: usize,
    pub surface: Surface,
    /// One rectangle per covered line.
    pub rects: Vec<Rect>,
}

impl Drop for TextSpan {
    fn drop(&mut self) {
        self.text.zeroize();
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PiiMatch {
    pub pii_type: PiiType,
    pub span: TextSpan,
    pub validated: bool,
    pub confidence: f32,
    pub policy: MaskPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FillStyle {
    OpaqueBlack,
    /// Opaque fill over the hidden part, placeholder glyphs on top, tail visible.
    OpaqueBlackWithPartialText,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedactionRegion {
    pub page: usize,
    pub surface: Surface,
    /// Never empty.
    pub rects: Vec<Rect>,
    pub fill: FillStyle,
    pub replacement: Option<String>,
    /// Native glyphs to delete, as indices into the page's glyph list.
    #[serde(skip)]
    pub glyphs: Vec<usize>,
}

/// One redaction request. The password never leaves this struct.
pub struct RedactionRequest {
    pub bytes: Zeroizing<Vec<u8>>,
    pub filename: String,
    pub level: SensitivityLevel,
    pub password: Option<Zeroizing<String>>,
}

impl RedactionRequest {
    pub fn new(bytes: Vec<u8>, filename: impl Into<String>) -> Self {
        Self {
            bytes: Zeroizing::new(bytes),
            filename: filename.into(),
            level: SensitivityLevel::default(),
            password: None,
        }
    }

    /// Unknown level names fall back to `low`.
    pub fn with_level(mut self, level: &str) -> Self {
        self.level = SensitivityLevel::parse_or_default(level);
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(Zeroizing::new(password.into()));
        self
    }
}

impl std::fmt::Debug for RedactionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedactionRequest")
            .field("bytes", &self.bytes.len())
            .field("filename", &self.filename)
            .field("level", &self.level)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// A detected value as shown by the preview interface.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub pii_type: PiiType,
    pub text: String,
    /// The value as it reads after redaction, e.g. `XXXX XXXX 9012`.
    pub masked: String,
    /// 0-based page index; 0 for standalone images.
    pub page: usize,
    pub start: usize,
    pub end: usize,
    pub confidence: f32,
    /// Found by OCR rather than in the text layer.
    pub optical: bool,
}

impl From<&PiiMatch> for Entity {
    fn from(m: &PiiMatch) -> Self {
        Entity {
            pii_type: m.pii_type,
            text: m.span.text.clone(),
            masked: masked_preview(&m.span.text, m.policy),
            page: m.span.page,
            start: m.span.start,
            end: m.span.end,
            confidence: m.confidence,
            optical: matches!(m.span.surface, Surface::Raster(_)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeCount {
    pub pii_type: PiiType,
    pub count: usize,
}

pub(crate) fn count_by_type<I>(types: I) -> Vec<TypeCount>
where
    I: IntoIterator<Item = PiiType>,
{
    let mut counts: Vec<TypeCount> = Vec::new();
    for pii_type in types {
        match counts.iter_mut().find(|c| c.pii_type == pii_type) {
            Some(c) => c.count += 1,
            None => counts.push(TypeCount { pii_type, count: 1 }),
        }
    }
    counts.sort_by_key(|c| c.pii_type);
    counts
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedactionOutput {
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub filename: String,
    pub mime_type: &'static str,
    pub level: SensitivityLevel,
    pub scan_type: ScanType,
    pub page_count: usize,
    pub regions: usize,
    pub by_type: Vec<TypeCount>,
    pub verify: VerifyReport,
    /// The input was already clean and is returned unchanged.
    pub unchanged: bool,
}

impl std::fmt::Debug for RedactionOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedactionOutput")
            .field("bytes", &self.bytes.len())
            .field("filename", &self.filename)
            .field("mime_type", &self.mime_type)
            .field("scan_type", &self.scan_type)
            .field("regions", &self.regions)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewOutput {
    pub level: SensitivityLevel,
    pub scan_type: ScanType,
    pub page_count: usize,
    pub entities: Vec<Entity>,
}

/// Readiness report for a health endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub ocr: Option<EngineInfo>,
    pub ocr_languages: Vec<String>,
    pub ocr_workers: usize,
    pub ocr_error: Option<String>,
    pub rasterizer_available: bool,
    pub levels: Vec<LevelInfo>,
    pub extensions: Vec<&'static str>,
}

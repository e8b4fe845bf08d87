//! Shared OCR types

use serde::{Deserialize, Serialize};

/// Word box in pixels of the image handed to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordBox {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

/// Identifies the text line a word belongs to: (block, paragraph, line).
pub type LineKey = (u32, u32, u32);

/// Word-level recognition result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrWord {
    pub text: String,
    /// 0.0 - 1.0
    pub confidence: f32,
    pub bbox: WordBox,
    pub line: LineKey,
}

/// Tesseract CLI settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct TesseractConfig {
    /// Path of the tesseract binary
    pub binary_path: Option<String>,
    /// tessdata directory
    pub tessdata_path: Option<String>,
    /// Language list such as "eng" or "eng+hin"
    pub lang: Option<String>,
    /// Page segmentation mode (0-13)
    pub psm: Option<u8>,
    /// OCR engine mode (0-3)
    pub oem: Option<u8>,
}

impl TesseractConfig {
    pub fn binary_or_default(&self) -> &str {
        self.binary_path.as_deref().unwrap_or("tesseract")
    }

    pub fn lang_or_default(&self) -> &str {
        self.lang.as_deref().unwrap_or("eng")
    }

    pub fn psm_or_default(&self) -> u8 {
        self.psm.unwrap_or(3)
    }

    pub fn oem_or_default(&self) -> u8 {
        self.oem.unwrap_or(1)
    }
}

/// Engine description for health reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineInfo {
    pub name: String,
    pub version: Option<String>,
    /// Engine parameters as JSON
    pub params: Option<String>,
}

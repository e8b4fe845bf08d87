use safedoc_ocr::{worker_count, TesseractConfig};
use safedoc_verify::VerifyOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub ocr: OcrSettings,
    pub render: RenderSettings,
    pub redaction: RedactionSettings,
    pub verify: VerifyOptions,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default, rename_all = "camelCase")]
pub struct OcrSettings {
    /// Minimum effective resolution handed to OCR
    pub min_dpi: u32,
    /// Worker pool size; 0 picks from available parallelism
    pub workers: usize,
    /// Per-job deadline
    pub timeout_secs: u64,
    pub tesseract: TesseractConfig,
    /// Also OCR images embedded in native pages
    pub embedded_images: bool,
    /// Images smaller than this on either side are ignored
    pub min_image_px: u32,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            min_dpi: 150,
            workers: 0,
            timeout_secs: 60,
            tesseract: TesseractConfig::default(),
            embedded_images: true,
            min_image_px: 32,
        }
    }
}

impl OcrSettings {
    pub fn worker_count(&self) -> usize {
        if self.workers == 0 {
            worker_count()
        } else {
            self.workers
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct RenderSettings {
    /// Directory holding the pdfium shared library
    pub pdfium_dir: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default, rename_all = "camelCase")]
pub struct RedactionSettings {
    /// Safety margin around native boxes, in points
    pub margin_pt: f32,
    /// Safety margin around raster boxes, in pixels
    pub margin_px: f32,
    /// Pages with fewer native characters that paint an image count as scanned
    pub scanned_text_threshold: usize,
}

impl Default for RedactionSettings {
    fn default() -> Self {
        Self {
            margin_pt: 1.5,
            margin_px: 3.0,
            scanned_text_threshold: 20,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid value for {key}: {value}")]
    InvalidEnv { key: &'static str, value: String },
}

pub const ENV_OCR_DPI: &str = "SAFEDOC_OCR_DPI";
pub const ENV_OCR_WORKERS: &str = "SAFEDOC_OCR_WORKERS";
pub const ENV_OCR_TIMEOUT_SECS: &str = "SAFEDOC_OCR_TIMEOUT_SECS";
pub const ENV_TESSERACT_BIN: &str = "SAFEDOC_TESSERACT_BIN";
pub const ENV_TESSDATA: &str = "SAFEDOC_TESSDATA";
pub const ENV_OCR_LANG: &str = "SAFEDOC_OCR_LANG";
pub const ENV_PDFIUM_DIR: &str = "SAFEDOC_PDFIUM_DIR";

impl EngineConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Reads `path` when given and present, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) if path.exists() => {
                let raw = fs::read_to_string(path)?;
                Self::from_json_str(&raw)?
            }
            Some(path) => {
                log::warn!("[Config] {:?} not found, using defaults", path);
                Self::default()
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Overrides fields from `lookup`, normally the process environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_OCR_DPI) {
            self.ocr.min_dpi = parse_env(ENV_OCR_DPI, value)?;
        }
        if let Some(value) = lookup(ENV_OCR_WORKERS) {
            self.ocr.workers = parse_env(ENV_OCR_WORKERS, value)?;
        }
        if let Some(value) = lookup(ENV_OCR_TIMEOUT_SECS) {
            self.ocr.timeout_secs = parse_env(ENV_OCR_TIMEOUT_SECS, value)?;
        }
        if let Some(value) = lookup(ENV_TESSERACT_BIN) {
            self.ocr.tesseract.binary_path = Some(value);
        }
        if let Some(value) = lookup(ENV_TESSDATA) {
            self.ocr.tesseract.tessdata_path = Some(value);
        }
        if let Some(value) = lookup(ENV_OCR_LANG) {
            self.ocr.tesseract.lang = Some(value);
        }
        if let Some(value) = lookup(ENV_PDFIUM_DIR) {
            self.render.pdfium_dir = Some(value);
        }
        Ok(())
    }

    pub fn pdfium_dir(&self) -> Option<PathBuf> {
        self.render.pdfium_dir.as_ref().map(PathBuf::from)
    }
}

fn parse_env<T: std::str::FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { key, value })
}

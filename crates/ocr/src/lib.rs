//! OCR for scanned pages and images.
//!
//! Engines implement [`OcrEngine`]; [`OcrPool`] runs them on a fixed set of
//! worker threads with per-job deadlines. The bundled engine drives the
//! Tesseract CLI.

mod engine;
mod error;
mod pool;
mod tesseract;
mod threading;
mod types;

pub use engine::OcrEngine;
pub use error::OcrError;
pub use pool::OcrPool;
pub use tesseract::{get_tesseract_langs, get_tesseract_version, TesseractEngine};
pub use threading::worker_count;
pub use types::{EngineInfo, LineKey, OcrWord, TesseractConfig, WordBox};

//! OCR engine abstraction

use image::DynamicImage;
use std::sync::atomic::AtomicBool;
use std::time::Instant;

use crate::types::{EngineInfo, OcrWord};
use crate::OcrError;

/// Word-level OCR.
///
/// Engines must give up at `deadline` with `OcrError::Timeout` and should
/// poll `cancel` while working. Implementations are shared between pool
/// workers, hence `Send + Sync`.
pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &str;

    fn recognize(
        &self,
        image: &DynamicImage,
        deadline: Instant,
        cancel: &AtomicBool,
    ) -> Result<Vec<OcrWord>, OcrError>;

    fn info(&self) -> EngineInfo {
        EngineInfo {
            name: self.name().to_string(),
            version: None,
            params: None,
        }
    }
}

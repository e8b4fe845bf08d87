//! OCR error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OcrError {
    #[error("OCR engine unavailable: {0}")]
    Unavailable(String),

    #[error("OCR timed out after {0} ms")]
    Timeout(u128),

    #[error("OCR cancelled")]
    Cancelled,

    #[error("image processing failed: {0}")]
    ImageProcess(String),

    #[error("OCR engine failed: {0}")]
    Engine(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

use safedoc_ocr::OcrError;
use safedoc_pdf::PdfError;
use safedoc_render::RenderError;
use serde::Serialize;
use thiserror::Error;

/// Request failure kinds. Messages never include matched values.
#[derive(Error, Debug)]
pub enum RedactError {
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("corrupt document: {0}")]
    CorruptDocument(String),

    #[error("document is password protected")]
    PasswordRequired,

    #[error("incorrect password")]
    InvalidPassword,

    #[error("OCR timed out on page {page}")]
    OcrTimeout { page: usize },

    #[error("OCR engine unavailable: {0}")]
    OcrEngineUnavailable(String),

    #[error("redaction could not be verified ({findings} finding(s))")]
    RedactionIntegrityFailure { findings: usize },

    #[error("request cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnsupportedFormat,
    CorruptDocument,
    PasswordRequired,
    InvalidPassword,
    OcrTimeout,
    OcrEngineUnavailable,
    RedactionIntegrityFailure,
    Cancelled,
}

impl RedactError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RedactError::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            RedactError::CorruptDocument(_) => ErrorKind::CorruptDocument,
            RedactError::PasswordRequired => ErrorKind::PasswordRequired,
            RedactError::InvalidPassword => ErrorKind::InvalidPassword,
            RedactError::OcrTimeout { .. } => ErrorKind::OcrTimeout,
            RedactError::OcrEngineUnavailable(_) => ErrorKind::OcrEngineUnavailable,
            RedactError::RedactionIntegrityFailure { .. } => ErrorKind::RedactionIntegrityFailure,
            RedactError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Maps an OCR failure on `page` (1-based) to a request failure.
    pub fn from_ocr(err: OcrError, page: usize) -> Self {
        match err {
            OcrError::Timeout(_) => RedactError::OcrTimeout { page },
            OcrError::Cancelled => RedactError::Cancelled,
            OcrError::Unavailable(msg) => RedactError::OcrEngineUnavailable(msg),
            other => RedactError::OcrEngineUnavailable(other.to_string()),
        }
    }
}

impl From<PdfError> for RedactError {
    fn from(err: PdfError) -> Self {
        match err {
            PdfError::PasswordRequired => RedactError::PasswordRequired,
            PdfError::InvalidPassword => RedactError::InvalidPassword,
            PdfError::Unsupported(msg) => RedactError::UnsupportedFormat(msg),
            other => RedactError::CorruptDocument(other.to_string()),
        }
    }
}

impl From<RenderError> for RedactError {
    fn from(err: RenderError) -> Self {
        match err {
            // Without a rasterizer the fallback pages cannot be OCR'd.
            RenderError::Unavailable(msg) => RedactError::OcrEngineUnavailable(msg),
            RenderError::Render(msg) => RedactError::CorruptDocument(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, RedactError>;

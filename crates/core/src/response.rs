//! Boundary mapping from engine errors to caller-visible codes.
//!
//! This is the only place that knows about status codes; the pipeline
//! itself only ever returns [`RedactError`].

use serde::Serialize;

use crate::error::{ErrorKind, RedactError};

pub const PASSWORD_REQUIRED_MESSAGE: &str =
    "This PDF is password-protected. Please provide the password.";
pub const INVALID_PASSWORD_MESSAGE: &str = "Incorrect password. Please try again.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// Suggested HTTP status.
    pub status: u16,
    pub code: &'static str,
    /// `missing` or `invalid` for password errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
    pub message: String,
}

impl From<&RedactError> for ErrorResponse {
    fn from(err: &RedactError) -> Self {
        let (status, code, reason, message) = match err.kind() {
            ErrorKind::PasswordRequired => (
                423,
                "password_required",
                Some("missing"),
                PASSWORD_REQUIRED_MESSAGE.to_string(),
            ),
            ErrorKind::InvalidPassword => (
                423,
                "password_required",
                Some("invalid"),
                INVALID_PASSWORD_MESSAGE.to_string(),
            ),
            ErrorKind::UnsupportedFormat => (415, "unsupported_format", None, err.to_string()),
            ErrorKind::CorruptDocument => (422, "corrupt_document", None, err.to_string()),
            ErrorKind::OcrTimeout => (504, "ocr_timeout", None, err.to_string()),
            ErrorKind::OcrEngineUnavailable => {
                (503, "ocr_engine_unavailable", None, err.to_string())
            }
            ErrorKind::RedactionIntegrityFailure => (
                500,
                "redaction_integrity_failure",
                None,
                "Redaction could not be verified; no output was produced.".to_string(),
            ),
            ErrorKind::Cancelled => (499, "cancelled", None, err.to_string()),
        };
        ErrorResponse {
            status,
            code,
            reason,
            message,
        }
    }
}

impl From<RedactError> for ErrorResponse {
    fn from(err: RedactError) -> Self {
        ErrorResponse::from(&err)
    }
}

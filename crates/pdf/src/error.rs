use thiserror::Error;

#[derive(Error, Debug)]
pub enum PdfError {
    #[error("failed to parse PDF: {0}")]
    Parse(String),

    #[error("document requires a password")]
    PasswordRequired,

    #[error("incorrect password")]
    InvalidPassword,

    #[error("unsupported content: {0}")]
    Unsupported(String),

    #[error("failed to write PDF: {0}")]
    Write(String),

    #[error("image error: {0}")]
    Image(String),
}

impl From<lopdf::Error> for PdfError {
    fn from(e: lopdf::Error) -> Self {
        PdfError::Parse(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PdfError>;

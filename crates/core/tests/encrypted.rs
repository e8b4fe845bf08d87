mod common;

use common::*;
use safedoc_core::{CancelFlag, ErrorKind, ErrorResponse, RedactionRequest};

const USER_PASSWORD: &str = "s3cret";

fn encrypted_input() -> Vec<u8> {
    encrypt_rc4(
        text_document(&["Aadhaar 1234 5678 9012"]),
        USER_PASSWORD,
        "owner-pass",
    )
}

fn request(password: Option<&str>) -> RedactionRequest {
    let request = RedactionRequest::new(encrypted_input(), "locked.pdf");
    match password {
        Some(p) => request.with_password(p),
        None => request,
    }
}

#[test]
fn test_missing_password() {
    let err = engine_without_ocr()
        .redact(request(None), &CancelFlag::new())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PasswordRequired);

    let response = ErrorResponse::from(&err);
    assert_eq!(response.status, 423);
    assert_eq!(response.code, "password_required");
    assert_eq!(response.reason, Some("missing"));
}

#[test]
fn test_wrong_password() {
    let err = engine_without_ocr()
        .redact(request(Some("guess")), &CancelFlag::new())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidPassword);

    let response = ErrorResponse::from(&err);
    assert_eq!(response.code, "password_required");
    assert_eq!(response.reason, Some("invalid"));
    assert!(!response.message.contains("guess"));
}

#[test]
fn test_correct_password_yields_unencrypted_output() {
    let out = engine_without_ocr()
        .redact(request(Some(USER_PASSWORD)), &CancelFlag::new())
        .unwrap();
    assert!(!out.unchanged);

    let raw = String::from_utf8_lossy(&out.bytes);
    assert!(!raw.contains("/Encrypt"));
    assert!(!raw.contains(USER_PASSWORD));

    // Opens without any password.
    let text = pdf_text(&out.bytes);
    assert!(!text.contains("5678"));
    assert!(text.contains("9012"));
}

mod common;

use common::*;
use safedoc_core::{CancelFlag, ErrorKind, PiiType, RedactionRequest, ScanType};

fn request(bytes: Vec<u8>, filename: &str) -> RedactionRequest {
    RedactionRequest::new(bytes, filename)
}

#[test]
fn test_native_pan_partially_masked() {
    let input = text_pdf(&["Applicant: R. Sharma", "PAN: ABCDE1234F"]);
    let engine = engine_without_ocr();

    let out = engine
        .redact(request(input, "form.pdf"), &CancelFlag::new())
        .unwrap();
    assert_eq!(out.filename, "form_redacted.pdf");
    assert_eq!(out.mime_type, "application/pdf");
    assert_eq!(out.scan_type, ScanType::Native);
    assert_eq!(out.regions, 1);
    assert!(!out.unchanged);
    assert!(out.verify.is_clean());

    let text = pdf_text(&out.bytes);
    assert!(!text.contains("ABCDE1234F"));
    assert!(!text.contains("ABCDE"));
    assert!(text.contains("234F"));
    assert!(text.contains("XXXXXX"));
    assert!(text.contains("Sharma"));
}

#[test]
fn test_native_output_drops_metadata() {
    let input = text_pdf(&["PAN: ABCDE1234F"]);
    let out = engine_without_ocr()
        .redact(request(input, "form.pdf"), &CancelFlag::new())
        .unwrap();
    let raw = String::from_utf8_lossy(&out.bytes);
    assert!(!raw.contains("Applicant record"));
    assert!(!raw.contains("/Info"));
}

#[test]
fn test_preview_reports_entities() {
    let input = text_pdf(&["PAN: ABCDE1234F"]);
    let preview = engine_without_ocr()
        .preview(request(input, "form.pdf"), &CancelFlag::new())
        .unwrap();
    assert_eq!(preview.page_count, 1);
    assert_eq!(preview.entities.len(), 1);
    let entity = &preview.entities[0];
    assert_eq!(entity.pii_type, PiiType::Pan);
    assert_eq!((entity.page, entity.start, entity.end), (0, 5, 15));
    assert_eq!(entity.masked, "XXXXXX234F");
    assert!(!entity.optical);
}

#[test]
fn test_png_aadhaar_painted() {
    let input = png(&white_image(400, 100));
    let engine = engine_with_ocr(aadhaar_words());

    let out = engine
        .redact(request(input, "card.png"), &CancelFlag::new())
        .unwrap();
    assert_eq!(out.filename, "card_redacted.png");
    assert_eq!(out.mime_type, "image/png");
    assert_eq!(out.scan_type, ScanType::Optical);
    assert_eq!(out.by_type.len(), 1);
    assert_eq!(out.by_type[0].pii_type, PiiType::Aadhaar);

    let img = image::load_from_memory(&out.bytes).unwrap().to_rgba8();
    // "1234" and "5678" are gone, "9012" stays readable.
    assert_eq!(img.get_pixel(120, 50).0, [0, 0, 0, 255]);
    assert_eq!(img.get_pixel(170, 50).0, [0, 0, 0, 255]);
    assert_eq!(img.get_pixel(220, 50).0, [255, 255, 255, 255]);
    assert_eq!(img.get_pixel(40, 50).0, [255, 255, 255, 255]);
}

#[test]
fn test_low_resolution_image_upscaled_for_ocr() {
    // 100 px across a card is about 30 dpi, so OCR sees a copy twice as wide.
    let input = png(&white_image(100, 40));
    let words = vec![word("1234", 20, 10, 20), word("5678", 45, 10, 20), word("9012", 70, 10, 20)];

    let out = engine_with_scaled_ocr(words, 100)
        .redact(request(input, "small.png"), &CancelFlag::new())
        .unwrap();
    assert_eq!(out.regions, 1);

    // Boxes land back on the original pixel grid.
    let img = image::load_from_memory(&out.bytes).unwrap().to_rgba8();
    assert_eq!(img.dimensions(), (100, 40));
    assert_eq!(img.get_pixel(30, 20).0, [0, 0, 0, 255]);
    assert_eq!(img.get_pixel(55, 20).0, [0, 0, 0, 255]);
    assert_eq!(img.get_pixel(80, 20).0, [255, 255, 255, 255]);
}

#[test]
fn test_multi_page_tiff_rejected() {
    use tiff::encoder::{colortype, TiffEncoder};

    let page = white_image(40, 40);
    let mut input = std::io::Cursor::new(Vec::new());
    {
        let mut encoder = TiffEncoder::new(&mut input).unwrap();
        encoder.write_image::<colortype::RGB8>(40, 40, page.as_raw()).unwrap();
        encoder.write_image::<colortype::RGB8>(40, 40, page.as_raw()).unwrap();
    }
    let err = engine_with_ocr(aadhaar_words())
        .redact(request(input.into_inner(), "scans.tiff"), &CancelFlag::new())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
}

#[test]
fn test_image_preview_is_optical() {
    let input = png(&white_image(400, 100));
    let preview = engine_with_ocr(aadhaar_words())
        .preview(request(input, "card.png"), &CancelFlag::new())
        .unwrap();
    assert_eq!(preview.entities.len(), 1);
    assert!(preview.entities[0].optical);
    assert_eq!(preview.entities[0].text, "1234 5678 9012");
    assert_eq!(preview.entities[0].masked, "XXXX XXXX 9012");
}

#[test]
fn test_scanned_pdf_aadhaar() {
    let input = scanned_pdf(&white_image(400, 100));
    let engine = engine_with_ocr(aadhaar_words());

    let out = engine
        .redact(request(input, "scan.pdf"), &CancelFlag::new())
        .unwrap();
    assert_eq!(out.scan_type, ScanType::Optical);
    assert_eq!(out.regions, 1);

    let img = first_page_image(&out.bytes);
    assert_eq!(img.get_pixel(120, 50).0, [0, 0, 0, 255]);
    assert_eq!(img.get_pixel(170, 50).0, [0, 0, 0, 255]);
    assert_eq!(img.get_pixel(220, 50).0, [255, 255, 255, 255]);

    // Running the output again finds nothing and hands it back untouched.
    let again = engine
        .redact(request(out.bytes.clone(), "scan_redacted.pdf"), &CancelFlag::new())
        .unwrap();
    assert!(again.unchanged);
    assert_eq!(again.regions, 0);
    assert_eq!(again.bytes, out.bytes);
}

#[test]
fn test_flate_scanned_pdf_aadhaar() {
    let input = flate_scanned_pdf(&white_image(400, 100));
    let engine = engine_with_ocr(aadhaar_words());

    let out = engine
        .redact(request(input, "scan.pdf"), &CancelFlag::new())
        .unwrap();
    assert_eq!(out.scan_type, ScanType::Optical);
    assert_eq!(out.regions, 1);
    assert!(out.verify.is_clean());

    let img = first_page_image(&out.bytes);
    assert_eq!(img.dimensions(), (400, 100));
    assert_eq!(img.get_pixel(120, 50).0, [0, 0, 0, 255]);
    assert_eq!(img.get_pixel(220, 50).0, [255, 255, 255, 255]);

    let again = engine
        .redact(request(out.bytes.clone(), "scan_redacted.pdf"), &CancelFlag::new())
        .unwrap();
    assert!(again.unchanged);
    assert_eq!(again.bytes, out.bytes);
}

#[test]
fn test_unmapped_font_rendered_and_painted() {
    let page = image::RgbaImage::from_pixel(400, 100, image::Rgba([255, 255, 255, 255]));
    let engine = engine_with_rasterizer(aadhaar_words(), page);

    let out = engine
        .redact(request(unmapped_font_pdf(), "hindi.pdf"), &CancelFlag::new())
        .unwrap();
    assert_eq!(out.regions, 1);
    assert!(out.verify.is_clean());
    assert_eq!(out.by_type[0].pii_type, PiiType::Aadhaar);

    // The page is now a single bitmap with the first eight digits blacked out.
    assert!(pdf_text(&out.bytes).trim_matches('\x0c').is_empty());
    let img = first_page_image(&out.bytes);
    assert_eq!(img.get_pixel(120, 50).0, [0, 0, 0, 255]);
    assert_eq!(img.get_pixel(170, 50).0, [0, 0, 0, 255]);
    assert_eq!(img.get_pixel(220, 50).0, [255, 255, 255, 255]);
}

#[test]
fn test_scanned_pdf_without_ocr() {
    let input = scanned_pdf(&white_image(400, 100));
    let err = engine_without_ocr()
        .redact(request(input, "scan.pdf"), &CancelFlag::new())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OcrEngineUnavailable);
}

#[test]
fn test_unmapped_font_needs_rasterizer() {
    let err = engine_with_ocr(Vec::new())
        .redact(request(unmapped_font_pdf(), "hindi.pdf"), &CancelFlag::new())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OcrEngineUnavailable);
}

#[test]
fn test_annotation_text_is_not_dropped_silently() {
    // The appearance is text inside a form, so it can only be checked after
    // rendering; without a renderer the request fails closed.
    let input = annotated_pdf(&["Applicant: R. Sharma"], "PAN ABCDE1234F");
    let err = engine_with_ocr(Vec::new())
        .redact(request(input, "annotated.pdf"), &CancelFlag::new())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OcrEngineUnavailable);
}

#[test]
fn test_annotation_appearance_flattened_and_redacted() {
    let input = annotated_pdf(&["Applicant: R. Sharma"], "PAN ABCDE1234F");
    let page = image::RgbaImage::from_pixel(400, 100, image::Rgba([255, 255, 255, 255]));
    let words = vec![word("PAN", 10, 40, 40), word("ABCDE1234F", 60, 40, 100)];

    let out = engine_with_rasterizer(words, page)
        .redact(request(input, "annotated.pdf"), &CancelFlag::new())
        .unwrap();
    assert_eq!(out.regions, 1);
    assert_eq!(out.by_type[0].pii_type, PiiType::Pan);
    assert!(out.verify.is_clean());

    let raw = String::from_utf8_lossy(&out.bytes);
    assert!(!raw.contains("/Annots"));
    assert!(!raw.contains("ABCDE1234F"));
    let img = first_page_image(&out.bytes);
    assert_eq!(img.get_pixel(80, 50).0, [0, 0, 0, 255]);
    assert_eq!(img.get_pixel(150, 50).0, [255, 255, 255, 255]);
}

#[test]
fn test_native_output_is_idempotent() {
    let engine = engine_without_ocr();
    let input = text_pdf(&["Aadhaar 1234 5678 9012"]);
    let first = engine
        .redact(request(input, "id.pdf"), &CancelFlag::new())
        .unwrap();
    assert!(!first.unchanged);
    assert!(pdf_text(&first.bytes).contains("9012"));
    assert!(!pdf_text(&first.bytes).contains("5678"));

    let second = engine
        .redact(request(first.bytes.clone(), "id_redacted.pdf"), &CancelFlag::new())
        .unwrap();
    assert!(second.unchanged);
    assert_eq!(second.bytes, first.bytes);
}

#[test]
fn test_sensitivity_levels() {
    let lines = ["Mobile +919876543210", "Mail a.b@example.in"];
    let engine = engine_without_ocr();

    let low = engine
        .preview(request(text_pdf(&lines), "c.pdf"), &CancelFlag::new())
        .unwrap();
    assert!(low.entities.is_empty());

    let medium = engine
        .redact(
            request(text_pdf(&lines), "c.pdf").with_level("medium"),
            &CancelFlag::new(),
        )
        .unwrap();
    assert_eq!(medium.by_type.len(), 1);
    assert_eq!(medium.by_type[0].pii_type, PiiType::Phone);
    let text = pdf_text(&medium.bytes);
    assert!(!text.contains("98765"));
    assert!(text.contains("3210"));
    assert!(text.contains("a.b@example.in"));

    let high = engine
        .redact(
            request(text_pdf(&lines), "c.pdf").with_level("high"),
            &CancelFlag::new(),
        )
        .unwrap();
    let types: Vec<PiiType> = high.by_type.iter().map(|c| c.pii_type).collect();
    assert!(types.contains(&PiiType::Phone));
    assert!(types.contains(&PiiType::Email));
    let text = pdf_text(&high.bytes);
    assert!(!text.contains("example"));
    assert!(text.contains("Mail"));
}

#[test]
fn test_corrupt_pdf() {
    let err = engine_without_ocr()
        .redact(
            request(b"%PDF-1.7\n1 0 obj <<".to_vec(), "broken.pdf"),
            &CancelFlag::new(),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CorruptDocument);
}

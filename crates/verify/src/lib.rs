//! Post-redaction checks. Every finding is a reason to refuse the output.

use image::RgbaImage;
use safedoc_render::{uncovered_pixels, Rect};
use safedoc_rules::PiiDetector;
use serde::{Deserialize, Serialize};

/// Removed values shorter than this are not searched for verbatim; short
/// runs occur naturally in unrelated text.
const MIN_RESIDUAL_LEN: usize = 8;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VerifyOptions {
    /// Re-extract the text layer and search it.
    pub text_search: bool,
    /// Re-run OCR on painted surfaces.
    pub ocr_recheck: bool,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            text_search: true,
            ocr_recheck: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    /// The output text layer still matches a PII rule.
    TextLayerMatch,
    /// A removed value is still present in the output text.
    ResidualValue,
    /// Pixels inside a painted region are not opaque black.
    UncoveredPixels,
    /// OCR on the painted surface still reads a removed value.
    OcrMatch,
}

/// Findings never carry the matched value itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub page: usize,
    pub kind: FindingKind,
    pub detail: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyReport {
    pub checks: usize,
    pub findings: Vec<Finding>,
}

impl VerifyReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn record(&mut self, findings: Vec<Finding>) {
        self.checks += 1;
        self.findings.extend(findings);
    }
}

/// Uppercased alphanumerics only, so spacing and punctuation changes do not
/// hide a surviving value.
pub fn normalize(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_uppercase)
        .collect()
}

/// Normalized forms of the values a request removed, worth searching for.
pub fn residual_keys<'a, I>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut keys: Vec<String> = values
        .into_iter()
        .map(normalize)
        .filter(|k| k.chars().count() >= MIN_RESIDUAL_LEN)
        .collect();
    keys.sort();
    keys.dedup();
    keys
}

/// Re-detection on a page's output text layer must come back empty.
pub fn check_text_layer(
    page: usize,
    text: &str,
    detector: &PiiDetector,
    residual: &[String],
) -> Vec<Finding> {
    let mut findings: Vec<Finding> = detector
        .detect(text)
        .into_iter()
        .map(|d| Finding {
            page,
            kind: FindingKind::TextLayerMatch,
            detail: format!("{} at {}..{}", d.pii_type.id(), d.start, d.end),
        })
        .collect();

    let normalized = normalize(text);
    for (index, key) in residual.iter().enumerate() {
        if normalized.contains(key.as_str()) {
            findings.push(Finding {
                page,
                kind: FindingKind::ResidualValue,
                detail: format!("removed value #{} still in text layer", index),
            });
        }
    }

    if !findings.is_empty() {
        log::error!("[Verify] page {}: {} text finding(s)", page + 1, findings.len());
    }
    findings
}

/// Every pixel of every painted rectangle must be opaque black.
pub fn check_coverage(page: usize, image: &RgbaImage, rects: &[Rect]) -> Vec<Finding> {
    let uncovered = uncovered_pixels(image, rects);
    if uncovered == 0 {
        return Vec::new();
    }
    log::error!("[Verify] page {}: {} uncovered pixel(s)", page + 1, uncovered);
    vec![Finding {
        page,
        kind: FindingKind::UncoveredPixels,
        detail: format!("{} pixel(s) inside redaction boxes are not black", uncovered),
    }]
}

/// OCR text of a painted surface must not yield any previously removed value.
pub fn check_ocr_text(
    page: usize,
    text: &str,
    detector: &PiiDetector,
    removed: &[String],
) -> Vec<Finding> {
    let findings: Vec<Finding> = detector
        .detect(text)
        .into_iter()
        .filter(|d| {
            let key = normalize(&d.text);
            removed.iter().any(|r| *r == key)
        })
        .map(|d| Finding {
            page,
            kind: FindingKind::OcrMatch,
            detail: format!("{} readable after painting", d.pii_type.id()),
        })
        .collect();
    if !findings.is_empty() {
        log::error!("[Verify] page {}: OCR still reads {} value(s)", page + 1, findings.len());
    }
    findings
}

//! Pattern scan over a page's logical text.

use serde::Serialize;

use crate::patterns::pattern;
use crate::types::{PiiType, SensitivityLevel};
use crate::validators::validate;

/// An accepted match. Offsets are byte offsets into the scanned text.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    pub pii_type: PiiType,
    pub start: usize,
    pub end: usize,
    pub text: String,
    pub confidence: f32,
    pub validated: bool,
}

/// Scans text for the PII types active at a sensitivity level.
#[derive(Debug, Clone)]
pub struct PiiDetector {
    types: Vec<PiiType>,
}

impl PiiDetector {
    pub fn new(level: SensitivityLevel) -> Self {
        Self {
            types: level.types().to_vec(),
        }
    }

    pub fn with_types(types: &[PiiType]) -> Self {
        Self {
            types: types.to_vec(),
        }
    }

    pub fn types(&self) -> &[PiiType] {
        &self.types
    }

    /// Returns validated, non-overlapping matches sorted by start offset.
    pub fn detect(&self, text: &str) -> Vec<Detection> {
        let mut candidates = Vec::new();
        for pii_type in &self.types {
            scan_type(*pii_type, text, &mut candidates);
        }
        let accepted = resolve_overlaps(candidates);
        log::debug!("[Detector] {} match(es) in {} chars", accepted.len(), text.len());
        accepted
    }
}

fn scan_type(pii_type: PiiType, text: &str, out: &mut Vec<Detection>) {
    let re = pattern(pii_type);
    let mut pos = 0;
    while pos <= text.len() {
        let Some(m) = re.find_at(text, pos) else {
            break;
        };
        let accepted = on_token_boundary(text, m.start(), m.end(), pii_type)
            && validate(pii_type, m.as_str());
        if accepted {
            out.push(Detection {
                pii_type,
                start: m.start(),
                end: m.end(),
                text: m.as_str().to_string(),
                confidence: pii_type.base_confidence(),
                validated: true,
            });
            pos = m.end();
        } else {
            // A rejected candidate may hide a valid one starting inside it.
            pos = m.start()
                + text[m.start()..]
                    .chars()
                    .next()
                    .map(char::len_utf8)
                    .unwrap_or(1);
        }
    }
}

/// Neighbouring characters must not continue the token.
pub(crate) fn on_token_boundary(text: &str, start: usize, end: usize, pii_type: PiiType) -> bool {
    let mut back = text[..start].chars().rev();
    let mut ahead = text[end..].chars();
    let before = back.next();
    let after = ahead.next();

    if before.is_some_and(char::is_alphanumeric) || after.is_some_and(char::is_alphanumeric) {
        return false;
    }

    if pii_type.is_numeric() {
        if before == Some('+') {
            return false;
        }
        let joins = |c: Option<char>| matches!(c, Some('-') | Some('/') | Some('.'));
        if joins(before) && back.next().is_some_and(|c| c.is_ascii_digit()) {
            return false;
        }
        if joins(after) && ahead.next().is_some_and(|c| c.is_ascii_digit()) {
            return false;
        }
    }

    if pii_type == PiiType::Email && (before == Some('.') || before == Some('@')) {
        return false;
    }

    true
}

/// Strictly longer span covering all of `inner`.
fn encloses(outer: &Detection, inner: &Detection) -> bool {
    outer.start <= inner.start
        && inner.end <= outer.end
        && outer.end - outer.start > inner.end - inner.start
}

/// Resolves overlapping candidates.
///
/// A candidate lying inside a longer one is part of that value and is
/// dropped, so the enclosing match masks the whole token. Remaining
/// overlaps keep the most specific type; ties go to the longer match,
/// then the earlier one.
fn resolve_overlaps(candidates: Vec<Detection>) -> Vec<Detection> {
    let inner: Vec<bool> = candidates
        .iter()
        .map(|c| candidates.iter().any(|o| encloses(o, c)))
        .collect();
    let mut candidates: Vec<Detection> = candidates
        .into_iter()
        .zip(inner)
        .filter_map(|(c, inside)| (!inside).then_some(c))
        .collect();
    candidates.sort_by(|a, b| {
        b.pii_type
            .specificity()
            .cmp(&a.pii_type.specificity())
            .then((b.end - b.start).cmp(&(a.end - a.start)))
            .then(a.start.cmp(&b.start))
    });

    let mut accepted: Vec<Detection> = Vec::new();
    for candidate in candidates {
        let overlaps = accepted
            .iter()
            .any(|d| candidate.start < d.end && d.start < candidate.end);
        if !overlaps {
            accepted.push(candidate);
        }
    }
    accepted.sort_by_key(|d| d.start);
    accepted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detect(level: SensitivityLevel, text: &str) -> Vec<(PiiType, String)> {
        PiiDetector::new(level)
            .detect(text)
            .into_iter()
            .map(|d| (d.pii_type, d.text))
            .collect()
    }

    #[test]
    fn test_pan_offsets() {
        let text = "PAN: ABCDE1234F";
        let found = PiiDetector::new(SensitivityLevel::Low).detect(text);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].pii_type, PiiType::Pan);
        assert_eq!((found[0].start, found[0].end), (5, 15));
        assert_eq!(&text[found[0].start..found[0].end], "ABCDE1234F");
    }

    #[test]
    fn test_every_type_at_high() {
        let text = "Aadhaar 2345 6789 0123, PAN ABCDE1234F, passport J8369854, \
                    DL MH12 20110012345, voter ABC1234567, phone +919876543210, \
                    mail ravi.kumar@example.co.in, born 15/08/1990, \
                    account 123456789012345, IFSC SBIN0001234";
        let found: Vec<PiiType> = detect(SensitivityLevel::High, text)
            .into_iter()
            .map(|(t, _)| t)
            .collect();
        for t in PiiType::ALL {
            assert!(found.contains(&t), "missing {t}");
        }
        assert_eq!(found.len(), 10);
    }

    #[test]
    fn test_level_gating() {
        let text = "phone 9876543210 mail a.b@example.com PAN ABCDE1234F";
        let low = detect(SensitivityLevel::Low, text);
        assert_eq!(low, vec![(PiiType::Pan, "ABCDE1234F".to_string())]);

        let medium = detect(SensitivityLevel::Medium, text);
        assert!(medium.iter().any(|(t, _)| *t == PiiType::Phone));
        assert!(!medium.iter().any(|(t, _)| *t == PiiType::Email));

        let high = detect(SensitivityLevel::High, text);
        assert!(high.iter().any(|(t, _)| *t == PiiType::Email));
    }

    #[test]
    fn test_email_wins_over_id_inside_it() {
        let found = detect(SensitivityLevel::High, "mail ABC1234567@gmail.com");
        assert_eq!(found, vec![(PiiType::Email, "ABC1234567@gmail.com".to_string())]);

        let found = detect(SensitivityLevel::High, "ABCDE1234F@x.com");
        assert_eq!(found, vec![(PiiType::Email, "ABCDE1234F@x.com".to_string())]);

        // Below High there is no email rule, so the id alone is masked.
        let found = detect(SensitivityLevel::Low, "ABCDE1234F@x.com");
        assert_eq!(found, vec![(PiiType::Pan, "ABCDE1234F".to_string())]);
    }

    #[test]
    fn test_partial_overlap_prefers_specific_type() {
        let a = Detection {
            pii_type: PiiType::BankAccount,
            start: 0,
            end: 12,
            text: String::new(),
            confidence: 0.5,
            validated: true,
        };
        let b = Detection {
            pii_type: PiiType::Aadhaar,
            start: 6,
            end: 20,
            ..a.clone()
        };
        let kept = resolve_overlaps(vec![a, b]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].pii_type, PiiType::Aadhaar);
    }

    #[test]
    fn test_embedded_tokens_rejected() {
        assert!(detect(SensitivityLevel::Low, "XABCDE1234F").is_empty());
        assert!(detect(SensitivityLevel::Low, "ABCDE1234FG").is_empty());
        assert!(detect(SensitivityLevel::Low, "card 1234-5678-9012-3456").is_empty());
    }

    #[test]
    fn test_aadhaar_preferred_over_bank_account() {
        let found = detect(SensitivityLevel::High, "id 234567890123 end");
        assert_eq!(found, vec![(PiiType::Aadhaar, "234567890123".to_string())]);
    }

    #[test]
    fn test_phone_preferred_over_bank_account() {
        let found = detect(SensitivityLevel::High, "tel 09876543210");
        assert_eq!(found, vec![(PiiType::Phone, "09876543210".to_string())]);
    }

    #[test]
    fn test_international_phone() {
        let found = detect(SensitivityLevel::Medium, "call +919876543210 now");
        assert_eq!(found, vec![(PiiType::Phone, "+919876543210".to_string())]);
    }

    #[test]
    fn test_rejected_candidate_does_not_hide_later_match() {
        // The first shape match fails its validator; the scan resumes inside it.
        let found = detect(SensitivityLevel::Low, "0000 0000 0000 and 2345 6789 0123");
        assert_eq!(found, vec![(PiiType::Aadhaar, "2345 6789 0123".to_string())]);
    }

    #[test]
    fn test_masked_placeholders_never_match() {
        let text = "XXXX XXXX 9012 XXXXXX234F +XXXXXXXX3210 XXXXXXXX9012";
        assert!(detect(SensitivityLevel::High, text).is_empty());
    }

    #[test]
    fn test_invalid_date_ignored() {
        assert!(detect(SensitivityLevel::High, "on 31/02/1990").is_empty());
    }
}

//! Shape patterns, one per PII type.
//!
//! The `regex` crate has no look-around, so token boundaries are enforced
//! after matching (see `detector::on_token_boundary`).

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::PiiType;

// 4-4-4 digits; separators are checked for consistency by the validator.
static AADHAAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{4}[ \t\n-]?\d{4}[ \t\n-]?\d{4}").unwrap());

static PAN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Z]{5}[0-9]{4}[A-Z]").unwrap());

static PASSPORT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Z][0-9]{7}").unwrap());

// SS RR YYYY NNNNNNN
static DRIVING_LICENSE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Z]{2}[ -]?[0-9]{2}[ -]?(?:19|20)[0-9]{2}[ -]?[0-9]{7}").unwrap()
});

static VOTER_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Z]{3}[0-9]{7}").unwrap());

static PHONE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\+91[ -]?|0)?[6-9][0-9]{4}[ -]?[0-9]{5}").unwrap()
});

static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(?:\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}").unwrap()
});

static DOB: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[0-9]{1,2}[/.-][0-9]{1,2}[/.-](?:[0-9]{4}|[0-9]{2})").unwrap()
});

static BANK_ACCOUNT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]{9,18}").unwrap());

static IFSC: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Z]{4}0[A-Z0-9]{6}").unwrap());

pub(crate) fn pattern(pii_type: PiiType) -> &'static Regex {
    match pii_type {
        PiiType::Aadhaar => &AADHAAR,
        PiiType::Pan => &PAN,
        PiiType::Passport => &PASSPORT,
        PiiType::DrivingLicense => &DRIVING_LICENSE,
        PiiType::VoterId => &VOTER_ID,
        PiiType::Phone => &PHONE,
        PiiType::Email => &EMAIL,
        PiiType::Dob => &DOB,
        PiiType::BankAccount => &BANK_ACCOUNT,
        PiiType::Ifsc => &IFSC,
    }
}

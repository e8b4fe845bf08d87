//! Structural validators that turn a shape match into an accepted match.

use chrono::{Datelike, Local, NaiveDate};

use crate::types::PiiType;

/// State and union territory codes used as the first two letters of an
/// Indian driving licence number.
const DL_STATE_CODES: &[&str] = &[
    "AN", "AP", "AR", "AS", "BR", "CG", "CH", "DD", "DL", "DN", "GA", "GJ", "HP", "HR", "JH",
    "JK", "KA", "KL", "LA", "LD", "MH", "ML", "MN", "MP", "MZ", "NL", "OD", "OR", "PB", "PY",
    "RJ", "SK", "TN", "TR", "TS", "UK", "UA", "UP", "WB",
];

pub(crate) fn validate(pii_type: PiiType, candidate: &str) -> bool {
    match pii_type {
        PiiType::Aadhaar => aadhaar(candidate),
        PiiType::Pan => pan(candidate),
        PiiType::Passport => passport(candidate),
        PiiType::DrivingLicense => driving_license(candidate),
        PiiType::VoterId => voter_id(candidate),
        PiiType::Phone => phone(candidate),
        PiiType::Email => email(candidate),
        PiiType::Dob => dob(candidate),
        PiiType::BankAccount => bank_account(candidate),
        PiiType::Ifsc => ifsc(candidate),
    }
}

fn digits(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_digit()).collect()
}

fn uniform(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => chars.all(|c| c == first),
        None => true,
    }
}

fn aadhaar(s: &str) -> bool {
    let d = digits(s);
    if d.len() != 12 || uniform(&d) {
        return false;
    }
    // Separators sit at fixed positions: either both absent or both present,
    // with whitespace counted as one class so wrapped lines still validate.
    let seps: Vec<char> = s.chars().filter(|c| !c.is_ascii_digit()).collect();
    match seps.as_slice() {
        [] => true,
        [a, b] => {
            let class = |c: &char| if *c == '-' { 1 } else { 0 };
            class(a) == class(b)
        }
        _ => false,
    }
}

fn pan(s: &str) -> bool {
    let (letters, rest) = s.split_at(5);
    !uniform(letters) && &rest[..4] != "0000"
}

fn passport(s: &str) -> bool {
    let mut chars = s.chars();
    let Some(letter) = chars.next() else {
        return false;
    };
    let number: String = chars.collect();
    !matches!(letter, 'Q' | 'X' | 'Z') && !number.starts_with('0') && !uniform(&number)
}

fn driving_license(s: &str) -> bool {
    let compact: String = s.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    if compact.len() != 15 {
        return false;
    }
    if !DL_STATE_CODES.contains(&&compact[..2]) {
        return false;
    }
    let year: i32 = match compact[4..8].parse() {
        Ok(year) => year,
        Err(_) => return false,
    };
    let current = Local::now().year();
    (1950..=current).contains(&year) && !uniform(&compact[8..])
}

fn voter_id(s: &str) -> bool {
    let (letters, number) = s.split_at(3);
    !uniform(letters) && !uniform(number)
}

fn phone(s: &str) -> bool {
    let d = digits(s);
    let national = if s.starts_with("+91") {
        d.strip_prefix("91").unwrap_or(&d).to_string()
    } else if d.len() == 11 {
        d.strip_prefix('0').unwrap_or(&d).to_string()
    } else {
        d
    };
    national.len() == 10
        && national.starts_with(&['6', '7', '8', '9'][..])
        && !uniform(&national)
}

fn email(s: &str) -> bool {
    let Some((local, domain)) = s.rsplit_once('@') else {
        return false;
    };
    if local.is_empty() || local.starts_with('.') || local.ends_with('.') || local.contains("..")
    {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2
        && labels
            .iter()
            .all(|l| !l.is_empty() && !l.starts_with('-') && !l.ends_with('-'))
}

fn dob(s: &str) -> bool {
    let seps: Vec<char> = s.chars().filter(|c| !c.is_ascii_digit()).collect();
    if seps.len() != 2 || seps[0] != seps[1] {
        return false;
    }
    let parts: Vec<&str> = s.split(seps[0]).collect();
    if parts.len() != 3 {
        return false;
    }
    let (Ok(day), Ok(month), Ok(year)) = (
        parts[0].parse::<u32>(),
        parts[1].parse::<u32>(),
        parts[2].parse::<i32>(),
    ) else {
        return false;
    };

    let today = Local::now().date_naive();
    let year = if parts[2].len() == 2 {
        // Two-digit years pivot on the current year.
        let century = if year > today.year() % 100 { 1900 } else { 2000 };
        century + year
    } else {
        year
    };

    match NaiveDate::from_ymd_opt(year, month, day) {
        Some(date) => year >= 1900 && date <= today,
        None => false,
    }
}

fn bank_account(s: &str) -> bool {
    s.len() >= 11 && s.len() <= 18 && !uniform(s)
}

fn ifsc(s: &str) -> bool {
    !uniform(&s[..4])
}

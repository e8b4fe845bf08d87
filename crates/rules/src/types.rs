//! PII types, sensitivity levels and mask policies.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of identifiers the detector knows about.
///
/// Each variant owns its pattern, validator and mask policy. New identifier
/// kinds are added here and nowhere else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiType {
    Aadhaar,
    Pan,
    Passport,
    DrivingLicense,
    VoterId,
    Phone,
    Email,
    Dob,
    BankAccount,
    Ifsc,
}

impl PiiType {
    pub const ALL: [PiiType; 10] = [
        PiiType::Aadhaar,
        PiiType::Pan,
        PiiType::Passport,
        PiiType::DrivingLicense,
        PiiType::VoterId,
        PiiType::Phone,
        PiiType::Email,
        PiiType::Dob,
        PiiType::BankAccount,
        PiiType::Ifsc,
    ];

    /// Stable machine identifier, used in responses.
    pub fn id(self) -> &'static str {
        match self {
            PiiType::Aadhaar => "aadhaar",
            PiiType::Pan => "pan",
            PiiType::Passport => "passport",
            PiiType::DrivingLicense => "driving_license",
            PiiType::VoterId => "voter_id",
            PiiType::Phone => "phone",
            PiiType::Email => "email",
            PiiType::Dob => "dob",
            PiiType::BankAccount => "bank_account",
            PiiType::Ifsc => "ifsc",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PiiType::Aadhaar => "Aadhaar Number",
            PiiType::Pan => "PAN Card",
            PiiType::Passport => "Passport Number",
            PiiType::DrivingLicense => "Driving License",
            PiiType::VoterId => "Voter ID",
            PiiType::Phone => "Phone Number",
            PiiType::Email => "Email Address",
            PiiType::Dob => "Date of Birth",
            PiiType::BankAccount => "Bank Account Number",
            PiiType::Ifsc => "IFSC Code",
        }
    }

    pub fn mask_policy(self) -> MaskPolicy {
        match self {
            PiiType::Aadhaar | PiiType::Pan | PiiType::Phone | PiiType::BankAccount => {
                MaskPolicy::KeepLast(4)
            }
            PiiType::Passport
            | PiiType::DrivingLicense
            | PiiType::VoterId
            | PiiType::Email
            | PiiType::Dob
            | PiiType::Ifsc => MaskPolicy::Full,
        }
    }

    /// Rank used when two candidates overlap; higher wins.
    pub(crate) fn specificity(self) -> u8 {
        match self {
            PiiType::Aadhaar => 10,
            PiiType::Pan => 9,
            PiiType::Passport => 8,
            PiiType::DrivingLicense => 7,
            PiiType::VoterId => 6,
            PiiType::Ifsc => 5,
            PiiType::Email => 4,
            PiiType::Phone => 3,
            PiiType::Dob => 2,
            PiiType::BankAccount => 1,
        }
    }

    pub(crate) fn base_confidence(self) -> f32 {
        match self {
            PiiType::Aadhaar => 0.9,
            PiiType::Pan => 0.95,
            PiiType::Passport => 0.8,
            PiiType::DrivingLicense => 0.85,
            PiiType::VoterId => 0.8,
            PiiType::Phone => 0.85,
            PiiType::Email => 0.95,
            PiiType::Dob => 0.7,
            PiiType::BankAccount => 0.6,
            PiiType::Ifsc => 0.9,
        }
    }

    /// Types whose pattern starts with a digit (or a `+` country prefix).
    pub(crate) fn is_numeric(self) -> bool {
        matches!(
            self,
            PiiType::Aadhaar | PiiType::Phone | PiiType::Dob | PiiType::BankAccount
        )
    }
}

impl fmt::Display for PiiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// How much of a matched value stays visible after redaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "visible")]
pub enum MaskPolicy {
    /// Nothing of the value survives.
    Full,
    /// The trailing N alphanumerics survive, the rest is filled.
    KeepLast(usize),
}

/// Named set of active PII types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensitivityLevel {
    #[default]
    Low,
    Medium,
    High,
}

impl SensitivityLevel {
    pub const ALL: [SensitivityLevel; 3] = [
        SensitivityLevel::Low,
        SensitivityLevel::Medium,
        SensitivityLevel::High,
    ];

    pub fn types(self) -> &'static [PiiType] {
        const LOW: &[PiiType] = &[PiiType::Aadhaar, PiiType::Pan];
        const MEDIUM: &[PiiType] = &[
            PiiType::Aadhaar,
            PiiType::Pan,
            PiiType::Passport,
            PiiType::DrivingLicense,
            PiiType::Phone,
        ];
        match self {
            SensitivityLevel::Low => LOW,
            SensitivityLevel::Medium => MEDIUM,
            SensitivityLevel::High => &PiiType::ALL,
        }
    }

    pub fn includes(self, pii_type: PiiType) -> bool {
        self.types().contains(&pii_type)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SensitivityLevel::Low => "low",
            SensitivityLevel::Medium => "medium",
            SensitivityLevel::High => "high",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            SensitivityLevel::Low => "Aadhaar and PAN numbers only",
            SensitivityLevel::Medium => {
                "Aadhaar, PAN, passport, driving license and phone numbers"
            }
            SensitivityLevel::High => {
                "All identifiers: Aadhaar, PAN, passport, driving license, voter ID, \
                 phone, email, date of birth, bank account and IFSC"
            }
        }
    }

    /// Lenient parse used at the request boundary: unknown values fall back
    /// to `Low`.
    pub fn parse_or_default(value: &str) -> Self {
        value.parse().unwrap_or_else(|_| {
            log::warn!("[Rules] unknown sensitivity level, falling back to low");
            SensitivityLevel::Low
        })
    }
}

impl FromStr for SensitivityLevel {
    type Err = UnknownLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(SensitivityLevel::Low),
            "medium" => Ok(SensitivityLevel::Medium),
            "high" => Ok(SensitivityLevel::High),
            _ => Err(UnknownLevel),
        }
    }
}

impl fmt::Display for SensitivityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownLevel;

impl fmt::Display for UnknownLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("unknown sensitivity level")
    }
}

impl std::error::Error for UnknownLevel {}

/// Entry of the level catalog exposed to callers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelInfo {
    pub level: SensitivityLevel,
    pub description: &'static str,
    pub types: Vec<PiiType>,
}

pub fn level_catalog() -> Vec<LevelInfo> {
    SensitivityLevel::ALL
        .iter()
        .map(|level| LevelInfo {
            level: *level,
            description: level.description(),
            types: level.types().to_vec(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_are_nested() {
        for t in SensitivityLevel::Low.types() {
            assert!(SensitivityLevel::Medium.includes(*t));
        }
        for t in SensitivityLevel::Medium.types() {
            assert!(SensitivityLevel::High.includes(*t));
        }
        assert_eq!(SensitivityLevel::High.types().len(), 10);
    }

    #[test]
    fn test_level_membership() {
        assert!(SensitivityLevel::Low.includes(PiiType::Pan));
        assert!(!SensitivityLevel::Low.includes(PiiType::Phone));
        assert!(SensitivityLevel::Medium.includes(PiiType::Phone));
        assert!(!SensitivityLevel::Medium.includes(PiiType::Email));
        assert!(SensitivityLevel::High.includes(PiiType::Email));
    }

    #[test]
    fn test_unknown_level_falls_back_to_low() {
        assert_eq!(SensitivityLevel::parse_or_default("HIGH"), SensitivityLevel::High);
        assert_eq!(SensitivityLevel::parse_or_default("extreme"), SensitivityLevel::Low);
    }

    #[test]
    fn test_mask_policies() {
        assert_eq!(PiiType::Aadhaar.mask_policy(), MaskPolicy::KeepLast(4));
        assert_eq!(PiiType::Phone.mask_policy(), MaskPolicy::KeepLast(4));
        assert_eq!(PiiType::Email.mask_policy(), MaskPolicy::Full);
        assert_eq!(PiiType::Ifsc.mask_policy(), MaskPolicy::Full);
    }

    #[test]
    fn test_catalog_serializes() {
        let json = serde_json::to_string(&level_catalog()).unwrap();
        assert!(json.contains("\"level\":\"medium\""));
        assert!(json.contains("\"driving_license\""));
    }
}

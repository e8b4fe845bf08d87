//! Indian PII rules: pattern, validator and mask policy per identifier type.
//!
//! ```
//! use safedoc_rules::{PiiDetector, PiiType, SensitivityLevel};
//!
//! let found = PiiDetector::new(SensitivityLevel::Low).detect("PAN: ABCDE1234F");
//! assert_eq!(found[0].pii_type, PiiType::Pan);
//! ```

mod detector;
mod mask;
mod patterns;
mod types;
mod validators;

pub use detector::{Detection, PiiDetector};
pub use mask::{masked_preview, placeholder, visible_tail_start, PLACEHOLDER_CHAR};
pub use types::{level_catalog, LevelInfo, MaskPolicy, PiiType, SensitivityLevel, UnknownLevel};

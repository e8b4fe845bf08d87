use crate::types::MaskPolicy;

/// Placeholder glyph drawn over hidden alphanumerics.
pub const PLACEHOLDER_CHAR: char = 'X';

/// Byte offset in `value` where the visible tail starts.
///
/// Returns `value.len()` when nothing may stay visible, including values
/// too short to keep a tail without revealing the whole thing.
pub fn visible_tail_start(value: &str, policy: MaskPolicy) -> usize {
    let MaskPolicy::KeepLast(keep) = policy else {
        return value.len();
    };
    let total = value.chars().filter(|c| c.is_alphanumeric()).count();
    if keep == 0 || total <= keep {
        return value.len();
    }

    let mut seen = 0;
    for (idx, c) in value.char_indices().rev() {
        if c.is_alphanumeric() {
            seen += 1;
            if seen == keep {
                return idx;
            }
        }
    }
    value.len()
}

/// Replacement text for the hidden part of a value: alphanumerics become
/// `X`, whitespace and punctuation are kept so the run lines up.
pub fn placeholder(hidden: &str) -> String {
    hidden
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                PLACEHOLDER_CHAR
            } else if c.is_whitespace() {
                ' '
            } else {
                c
            }
        })
        .collect()
}

/// What a reader sees after redaction, e.g. `XXXX XXXX 9012`.
pub fn masked_preview(value: &str, policy: MaskPolicy) -> String {
    let cut = visible_tail_start(value, policy);
    let mut out = placeholder(&value[..cut]);
    if cut < value.len() {
        out.push_str(&value[cut..]);
    }
    out
}

//! Canonical field identifiers.
//!
//! "Họ và tên", "HO VA TEN" and "ho_va_ten" must all land on the same key,
//! otherwise deduplication sees three different fields.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

pub const UNNAMED_FIELD: &str = "unnamed_field";

/// Map an arbitrary label or name to a stable snake_case identifier.
///
/// Total and idempotent: garbage maps to [`UNNAMED_FIELD`].
pub fn normalize(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();

    let mut out = String::with_capacity(lowered.len());
    let mut last_was_sep = true;
    for ch in lowered.nfd().filter(|c| !is_combining_mark(*c)) {
        let mapped = match ch {
            'đ' => 'd',
            c if c.is_ascii_lowercase() || c.is_ascii_digit() => c,
            c if is_latin_extended_letter(c) => c,
            _ => '_',
        };
        if mapped == '_' {
            if !last_was_sep {
                out.push('_');
            }
            last_was_sep = true;
        } else {
            out.push(mapped);
            last_was_sep = false;
        }
    }

    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        UNNAMED_FIELD.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Letters from Latin-1 Supplement and Latin Extended-A that survive NFD
/// folding (ø, æ, ß and friends).
fn is_latin_extended_letter(c: char) -> bool {
    ('\u{00C0}'..='\u{017F}').contains(&c) && c.is_alphabetic()
}

/// The part of a normalized name before its first underscore.
pub fn base_segment(name: &str) -> &str {
    name.split('_').next().unwrap_or(name)
}

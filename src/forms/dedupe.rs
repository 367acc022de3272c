//! Merge near-duplicate extracted fields into a uniquely named set.
//!
//! OCR plus a model produces the same field several times with small
//! variations (`ho_ten`, `ho_ten_1`, "Họ và tên" vs "Ho va ten"). Two keys
//! catch them: the exact `(name, type)` identity and the `(first segment,
//! type)` base key.

use std::collections::HashSet;

use tracing::{debug, warn};

use super::normalizer::{base_segment, normalize};
use super::types::{FieldType, FormField};

const DESCRIPTION_SEPARATOR: &str = " | ";

type IdentityKey = (String, FieldType);

#[derive(Default)]
struct Seen {
    exact: HashSet<IdentityKey>,
    base: HashSet<IdentityKey>,
    names: HashSet<String>,
}

impl Seen {
    fn record(&mut self, field: &FormField) {
        self.exact.insert((field.name.clone(), field.field_type));
        self.base.insert((base_segment(&field.name).to_string(), field.field_type));
        self.names.insert(field.name.clone());
    }
}

/// Single order-preserving pass over `candidates`.
///
/// The output has pairwise unique names and is never longer than the input.
/// A candidate that collides with an accepted field either contributes its
/// description to that field, is absorbed as a repeat of it, or is renamed
/// with the smallest free numeric suffix.
pub fn dedupe(candidates: Vec<FormField>) -> Vec<FormField> {
    let mut accepted: Vec<FormField> = Vec::with_capacity(candidates.len());
    let mut seen = Seen::default();

    for mut candidate in candidates {
        candidate.name = normalize(&candidate.name);
        let exact = (candidate.name.clone(), candidate.field_type);
        let base = (base_segment(&candidate.name).to_string(), candidate.field_type);

        if !seen.exact.contains(&exact) && !seen.base.contains(&base) && !seen.names.contains(&candidate.name) {
            seen.record(&candidate);
            accepted.push(candidate);
            continue;
        }

        if let Some(idx) = find_counterpart(&accepted, &candidate) {
            let existing = &mut accepted[idx];
            if merge_description(existing, &candidate.description) {
                debug!("merged description of `{}` into `{}`", candidate.name, existing.name);
                absorb_flags(existing, &candidate);
                continue;
            }
            if is_repeat_of(existing, &candidate) {
                debug!("absorbed repeated field `{}`", candidate.name);
                absorb_flags(existing, &candidate);
                continue;
            }
        }

        if seen.names.contains(&candidate.name) {
            rename_with_suffix(&mut candidate, &seen.names);
        }
        seen.record(&candidate);
        accepted.push(candidate);
    }

    ensure_unique(accepted)
}

/// Prefer an accepted field with the same name and type, then the same base
/// and type. A field of another type is never a counterpart.
fn find_counterpart(accepted: &[FormField], candidate: &FormField) -> Option<usize> {
    let base = base_segment(&candidate.name);
    accepted
        .iter()
        .position(|f| f.name == candidate.name && f.field_type == candidate.field_type)
        .or_else(|| {
            accepted
                .iter()
                .position(|f| f.field_type == candidate.field_type && base_segment(&f.name) == base)
        })
}

/// Append `description` unless it is empty or already one of the segments.
fn merge_description(existing: &mut FormField, description: &str) -> bool {
    let description = description.trim();
    if description.is_empty() {
        return false;
    }
    if existing.description.trim().is_empty() {
        existing.description = description.to_string();
        return true;
    }
    if existing
        .description
        .split(DESCRIPTION_SEPARATOR)
        .any(|segment| segment.trim() == description)
    {
        return false;
    }
    existing.description.push_str(DESCRIPTION_SEPARATOR);
    existing.description.push_str(description);
    true
}

/// Same identity, or the same name carrying a numeric suffix (`ho_ten_1`).
fn is_repeat_of(existing: &FormField, candidate: &FormField) -> bool {
    if existing.field_type != candidate.field_type {
        return false;
    }
    existing.name == candidate.name
        || has_numeric_suffix(&candidate.name, &existing.name)
        || has_numeric_suffix(&existing.name, &candidate.name)
}

fn has_numeric_suffix(name: &str, stem: &str) -> bool {
    name.strip_prefix(stem)
        .and_then(|rest| rest.strip_prefix('_'))
        .map(|digits| !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(false)
}

fn absorb_flags(existing: &mut FormField, candidate: &FormField) {
    existing.required |= candidate.required;
    existing.confidence = match (existing.confidence, candidate.confidence) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    };
    if existing.label.trim().is_empty() {
        existing.label = candidate.label.clone();
    }
}

fn rename_with_suffix(candidate: &mut FormField, used: &HashSet<String>) {
    let mut n = 1usize;
    while used.contains(&format!("{}_{}", candidate.name, n)) {
        n += 1;
    }
    debug!("renamed colliding field `{}` to `{}_{}`", candidate.name, candidate.name, n);
    candidate.name = format!("{}_{}", candidate.name, n);
    candidate.label = format!("{} ({})", candidate.label, n);
}

fn ensure_unique(fields: Vec<FormField>) -> Vec<FormField> {
    let mut names = HashSet::with_capacity(fields.len());
    fields
        .into_iter()
        .filter(|field| {
            let fresh = names.insert(field.name.clone());
            if !fresh {
                warn!("dropping field with duplicate name `{}` after deduplication", field.name);
            }
            fresh
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn field(name: &str, field_type: FieldType, description: &str) -> FormField {
        FormField::new(name, field_type, name).with_description(description)
    }

    #[test]
    fn distinct_fields_pass_through_in_order() {
        let out = dedupe(vec![
            field("ho_ten", FieldType::Text, ""),
            field("ngay_sinh", FieldType::Date, ""),
            field("email", FieldType::Email, ""),
        ]);
        let names: Vec<_> = out.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["ho_ten", "ngay_sinh", "email"]);
    }

    #[test]
    fn suffixed_repeat_is_merged_into_the_original() {
        let out = dedupe(vec![
            field("ho_ten", FieldType::Text, "Full name"),
            field("ho_ten_1", FieldType::Text, "As printed on ID card"),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].description, "Full name | As printed on ID card");
    }

    #[test]
    fn identical_repeat_is_absorbed() {
        let mut second = field("ho_va_ten", FieldType::Text, "Full name");
        second.required = true;
        let out = dedupe(vec![field("Họ và tên", FieldType::Text, "Full name"), second]);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name, "ho_va_ten");
        assert_eq!(out[0].description, "Full name");
        assert!(out[0].required);
    }

    #[test]
    fn same_name_with_another_type_is_renamed() {
        let mut date = field("ngay", FieldType::Date, "");
        date.label = "Ngày".to_string();
        let out = dedupe(vec![field("ngay", FieldType::Text, ""), date, field("ngay", FieldType::Checkbox, "")]);

        let names: Vec<_> = out.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["ngay", "ngay_1", "ngay_2"]);
        assert_eq!(out[1].label, "Ngày (1)");
    }

    #[test]
    fn described_field_of_another_type_keeps_its_identity() {
        let out = dedupe(vec![
            field("ngay", FieldType::Text, "Ngày làm đơn"),
            field("ngay", FieldType::Date, "Date of issue"),
        ]);

        assert_eq!(out.len(), 2);
        assert_eq!((out[0].name.as_str(), out[0].field_type), ("ngay", FieldType::Text));
        assert_eq!(out[0].description, "Ngày làm đơn");
        assert_eq!((out[1].name.as_str(), out[1].field_type), ("ngay_1", FieldType::Date));
        assert_eq!(out[1].description, "Date of issue");
    }

    #[test]
    fn merge_keeps_the_higher_confidence() {
        let out = dedupe(vec![
            field("email", FieldType::Email, "").with_confidence(70.0),
            field("email", FieldType::Email, "work address").with_confidence(92.0),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].confidence, Some(92.0));
        assert_eq!(out[0].description, "work address");
    }

    fn arb_type() -> impl Strategy<Value = FieldType> {
        prop_oneof![
            Just(FieldType::Text),
            Just(FieldType::Date),
            Just(FieldType::Checkbox),
            Just(FieldType::Email),
        ]
    }

    fn arb_field() -> impl Strategy<Value = FormField> {
        (
            prop_oneof![Just("ho_ten"), Just("ho_ten_1"), Just("Họ tên"), Just("ngay"), Just("ngay_1"), Just("a_b"), Just("")],
            arb_type(),
            prop_oneof![Just(""), Just("x"), Just("y"), Just("z")],
        )
            .prop_map(|(name, field_type, description)| field(name, field_type, description))
    }

    proptest! {
        #[test]
        fn output_names_are_unique_and_never_grow(input in prop::collection::vec(arb_field(), 0..24)) {
            let out = dedupe(input.clone());
            prop_assert!(out.len() <= input.len());
            let names: HashSet<_> = out.iter().map(|f| f.name.clone()).collect();
            prop_assert_eq!(names.len(), out.len());
        }

        #[test]
        fn merged_descriptions_keep_both_sides(
            first in "[a-z]{1,8}",
            second in "[A-Z]{1,8}",
            field_type in arb_type(),
        ) {
            let out = dedupe(vec![
                field("so_dien_thoai", field_type, &first),
                field("so_dien_thoai", field_type, &second),
            ]);
            prop_assert_eq!(out.len(), 1);
            prop_assert!(out[0].description.contains(&first));
            prop_assert!(out[0].description.contains(&second));
        }
    }
}

//! Known shapes of extraction replies and one adapter per shape.

use serde_json::{Map, Value};

use super::normalizer::normalize;
use super::types::{FieldType, FormField};

const DATE_KEYWORDS: &[&str] = &["ngày", "date", "thời gian", "dob"];
const SIGNATURE_KEYWORDS: &[&str] = &["ký tên", "signature", "chữ ký"];
const CHECKBOX_KEYWORDS: &[&str] = &["checkbox", "tích", "chọn"];
const EMAIL_KEYWORDS: &[&str] = &["email", "e-mail", "thư điện tử"];
const TEL_KEYWORDS: &[&str] = &["số điện thoại", "điện thoại", "phone", "tel"];
const REQUIRED_KEYWORDS: &[&str] = &["bắt buộc", "required", "phải", "cần thiết"];

/// An extraction reply, classified by the keys it carries.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionShape {
    /// `{"fields": [{"name", "label", "type", ...}]}`
    Fields(Vec<Value>),
    /// `{"form_fields": [{"field_name", "field_type", ...}]}`
    LegacyFormFields(Vec<Value>),
    /// `{"description": "Họ tên | Ngày sinh | ..."}` with no field list.
    DescriptionBlob(String),
    Unknown,
}

impl ExtractionShape {
    pub fn classify(value: &Value) -> Self {
        if let Some(fields) = value.get("fields").and_then(Value::as_array) {
            return ExtractionShape::Fields(fields.clone());
        }
        if let Some(fields) = value.get("form_fields").and_then(Value::as_array) {
            return ExtractionShape::LegacyFormFields(fields.clone());
        }
        match value.get("description").and_then(Value::as_str) {
            Some(description) if !description.trim().is_empty() => {
                ExtractionShape::DescriptionBlob(description.to_string())
            }
            _ => ExtractionShape::Unknown,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExtractionShape::Fields(_) => "fields",
            ExtractionShape::LegacyFormFields(_) => "form_fields",
            ExtractionShape::DescriptionBlob(_) => "description",
            ExtractionShape::Unknown => "unknown",
        }
    }

    /// Canonical fields for this shape. `Unknown` yields nothing and leaves
    /// the fallback to the caller.
    pub fn into_fields(self) -> Vec<FormField> {
        let fields = match self {
            ExtractionShape::Fields(items) => items.iter().filter_map(|item| adapt_item(item, "name", "type")).collect(),
            ExtractionShape::LegacyFormFields(items) => {
                items.iter().filter_map(|item| adapt_item(item, "field_name", "field_type")).collect()
            }
            ExtractionShape::DescriptionBlob(description) => expand_description(&description),
            ExtractionShape::Unknown => Vec::new(),
        };
        expand_single_blob_field(fields)
    }
}

fn adapt_item(item: &Value, name_key: &str, type_key: &str) -> Option<FormField> {
    match item {
        Value::String(label) if !label.trim().is_empty() => Some(field_from_label(label.trim())),
        Value::Object(obj) => Some(adapt_object(obj, name_key, type_key)),
        _ => None,
    }
}

fn adapt_object(obj: &Map<String, Value>, name_key: &str, type_key: &str) -> FormField {
    let text = |key: &str| obj.get(key).and_then(Value::as_str).map(str::trim).filter(|s| !s.is_empty());

    let raw_name = text(name_key).or_else(|| text("name")).or_else(|| text("label"));
    let label = text("label").or(raw_name).unwrap_or_default().to_string();
    let name = normalize(raw_name.unwrap_or(&label));

    let field_type = text(type_key)
        .and_then(FieldType::parse)
        .unwrap_or_else(|| infer_field_type(&label));

    let required = match obj.get("required") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => is_required_label(&label),
    };

    let mut field = FormField::new(name, field_type, label).with_description(text("description").unwrap_or_default());
    field.required = required;
    if let Some(confidence) = obj.get("confidence").and_then(confidence_value) {
        field = field.with_confidence(confidence);
    }
    field
}

fn confidence_value(value: &Value) -> Option<f32> {
    match value {
        Value::Number(n) => n.as_f64().map(|f| f as f32),
        Value::String(s) => s.trim().trim_end_matches('%').parse().ok(),
        _ => None,
    }
}

fn field_from_label(label: &str) -> FormField {
    FormField::new(normalize(label), infer_field_type(label), label)
}

/// One `field_n` per `|`-separated label.
fn expand_description(description: &str) -> Vec<FormField> {
    description
        .split('|')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .enumerate()
        .map(|(i, label)| FormField::new(format!("field_{}", i + 1), infer_field_type(label), label))
        .collect()
}

/// A lone field whose description enumerates several labels is really a
/// whole form squeezed into one entry.
fn expand_single_blob_field(fields: Vec<FormField>) -> Vec<FormField> {
    if fields.len() != 1 {
        return fields;
    }
    let segments = fields[0].description.split('|').filter(|s| !s.trim().is_empty()).count();
    if segments < 2 {
        return fields;
    }
    expand_description(&fields[0].description)
}

/// Guess a widget type from keywords in a Vietnamese or English label.
pub fn infer_field_type(label: &str) -> FieldType {
    let lowered = label.to_lowercase();
    let has = |keywords: &[&str]| keywords.iter().any(|k| lowered.contains(k));

    if has(SIGNATURE_KEYWORDS) {
        FieldType::Signature
    } else if has(DATE_KEYWORDS) {
        FieldType::Date
    } else if has(CHECKBOX_KEYWORDS) {
        FieldType::Checkbox
    } else if has(EMAIL_KEYWORDS) {
        FieldType::Email
    } else if has(TEL_KEYWORDS) {
        FieldType::Tel
    } else {
        FieldType::Text
    }
}

fn is_required_label(label: &str) -> bool {
    let lowered = label.to_lowercase();
    REQUIRED_KEYWORDS.iter().any(|k| lowered.contains(k))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classifies_each_known_shape() {
        assert!(matches!(ExtractionShape::classify(&json!({"fields": []})), ExtractionShape::Fields(_)));
        assert!(matches!(
            ExtractionShape::classify(&json!({"form_fields": [], "form_title": "x"})),
            ExtractionShape::LegacyFormFields(_)
        ));
        assert!(matches!(
            ExtractionShape::classify(&json!({"description": "a | b"})),
            ExtractionShape::DescriptionBlob(_)
        ));
        assert_eq!(ExtractionShape::classify(&json!({"error": "nope"})), ExtractionShape::Unknown);
    }

    #[test]
    fn legacy_items_map_onto_canonical_fields() {
        let shape = ExtractionShape::classify(&json!({
            "form_fields": [
                {"field_name": "Họ và tên", "field_type": "text_input", "required": true, "description": "Full name"},
                {"field_name": "Ngày sinh", "field_type": "address"},
            ]
        }));
        let fields = shape.into_fields();

        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].name, "ho_va_ten");
        assert_eq!(fields[0].label, "Họ và tên");
        assert_eq!(fields[0].field_type, FieldType::Text);
        assert!(fields[0].required);
        assert_eq!(fields[1].field_type, FieldType::Date);
    }

    #[test]
    fn new_shape_reads_confidence_and_infers_missing_types() {
        let fields = ExtractionShape::classify(&json!({
            "fields": [
                {"name": "so_dien_thoai", "label": "Số điện thoại", "confidence": "88%"},
                {"label": "Chữ ký người khai", "type": "unknown"},
                "Email liên hệ",
            ]
        }))
        .into_fields();

        assert_eq!(fields[0].field_type, FieldType::Tel);
        assert_eq!(fields[0].confidence, Some(88.0));
        assert_eq!(fields[1].name, "chu_ky_nguoi_khai");
        assert_eq!(fields[1].field_type, FieldType::Signature);
        assert_eq!(fields[2].field_type, FieldType::Email);
    }

    #[test]
    fn single_blob_field_expands_per_label() {
        let fields = ExtractionShape::classify(&json!({
            "fields": [{"name": "form", "description": "Họ tên | Ngày sinh | Chữ ký"}]
        }))
        .into_fields();

        let names: Vec<_> = fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["field_1", "field_2", "field_3"]);
        assert_eq!(fields[1].field_type, FieldType::Date);
        assert_eq!(fields[2].field_type, FieldType::Signature);
    }

    #[test]
    fn unknown_shape_produces_no_fields() {
        assert!(ExtractionShape::Unknown.into_fields().is_empty());
    }
}

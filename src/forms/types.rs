use serde::{Deserialize, Serialize};

/// Input widget a form field renders as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[default]
    Text,
    Date,
    Checkbox,
    Signature,
    Tel,
    Email,
}

impl FieldType {
    /// Parse an extractor-reported type. Legacy `*_input` suffixes are
    /// accepted; anything unrecognised yields `None` so the caller can infer
    /// a type from the label instead.
    pub fn parse(raw: &str) -> Option<Self> {
        let lowered = raw.trim().to_lowercase();
        let base = lowered.strip_suffix("_input").unwrap_or(&lowered);
        match base {
            "text" | "textarea" | "string" => Some(FieldType::Text),
            "date" | "datetime" => Some(FieldType::Date),
            "checkbox" | "check" | "boolean" => Some(FieldType::Checkbox),
            "signature" => Some(FieldType::Signature),
            "tel" | "phone" | "telephone" => Some(FieldType::Tel),
            "email" => Some(FieldType::Email),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl FormField {
    pub fn new(name: impl Into<String>, field_type: FieldType, label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type,
            label: label.into(),
            required: false,
            description: String::new(),
            confidence: None,
            value: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence.clamp(0.0, 100.0));
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

pub type FormFieldSet = Vec<FormField>;

/// Aggregate view of per-field extraction confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ConfidenceSummary {
    pub average: f32,
    pub min: f32,
    pub max: f32,
    pub total: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl ConfidenceSummary {
    /// Summarise the fields that carry a confidence score; unscored fields
    /// are ignored.
    pub fn from_fields(fields: &[FormField]) -> Self {
        let scores: Vec<f32> = fields.iter().filter_map(|f| f.confidence).collect();
        if scores.is_empty() {
            return Self::default();
        }

        let total = scores.len();
        let sum: f32 = scores.iter().sum();
        Self {
            average: sum / total as f32,
            min: scores.iter().copied().fold(f32::INFINITY, f32::min),
            max: scores.iter().copied().fold(f32::NEG_INFINITY, f32::max),
            total,
            high: scores.iter().filter(|s| **s >= 90.0).count(),
            medium: scores.iter().filter(|s| (70.0..90.0).contains(*s)).count(),
            low: scores.iter().filter(|s| **s < 70.0).count(),
        }
    }
}

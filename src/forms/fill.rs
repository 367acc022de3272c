use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::types::FormField;
use crate::config::{CompletionSettings, PipelineConfig};
use crate::conversations::types::Message;
use crate::errors::ValidationError;
use crate::llm::{CompletionInterface, CompletionRequest};
use crate::prompts;
use crate::recovery::recover;

/// Placeholder for a value the user still has to provide.
pub const ASK_USER: &str = "ASK_USER";

/// Personal details kept by the caller. Only non-empty attributes reach the
/// prompt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserProfile {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub address: Option<String>,
    pub id_number: Option<String>,
    pub date_of_birth: Option<String>,
    pub nationality: Option<String>,
    pub occupation: Option<String>,
}

impl UserProfile {
    /// `- Label: value` lines, or `None` when nothing is known.
    pub fn prompt_block(&self) -> Option<String> {
        let attributes = [
            ("Full name", &self.full_name),
            ("Email", &self.email),
            ("Phone number", &self.phone_number),
            ("Address", &self.address),
            ("ID number", &self.id_number),
            ("Date of birth", &self.date_of_birth),
            ("Nationality", &self.nationality),
            ("Occupation", &self.occupation),
        ];
        let lines: Vec<String> = attributes
            .iter()
            .filter_map(|(label, value)| {
                value
                    .as_deref()
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(|v| format!("- {label}: {v}"))
            })
            .collect();
        if lines.is_empty() {
            None
        } else {
            Some(lines.join("\n"))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilledField {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FillResult {
    /// One entry per schema field, in schema order.
    pub fields: Vec<FilledField>,
    pub missing_fields: Vec<String>,
    /// Fraction of fields with a real value.
    pub confidence: f32,
}

impl FillResult {
    fn from_values(schema: &[FormField], mut values: HashMap<String, String>) -> Self {
        let fields: Vec<FilledField> = schema
            .iter()
            .map(|field| FilledField {
                name: field.name.clone(),
                value: values.remove(&field.name).unwrap_or_else(|| ASK_USER.to_string()),
            })
            .collect();
        let missing_fields: Vec<String> = fields
            .iter()
            .filter(|f| f.value == ASK_USER)
            .map(|f| f.name.clone())
            .collect();
        let confidence = if fields.is_empty() {
            0.0
        } else {
            (fields.len() - missing_fields.len()) as f32 / fields.len() as f32
        };
        Self { fields, missing_fields, confidence }
    }

    fn all_missing(schema: &[FormField]) -> Self {
        Self::from_values(schema, HashMap::new())
    }

    pub fn value_of(&self, name: &str) -> Option<&str> {
        self.fields.iter().find(|f| f.name == name).map(|f| f.value.as_str())
    }
}

/// Fills a field schema from chat history and an optional profile.
pub struct FormFillPipeline {
    completion: Arc<dyn CompletionInterface>,
    settings: CompletionSettings,
    history_window: usize,
    history_limit: usize,
}

impl FormFillPipeline {
    pub fn new(completion: Arc<dyn CompletionInterface>, config: &PipelineConfig) -> Self {
        Self {
            completion,
            settings: config.fill,
            history_window: config.fill_history_window,
            history_limit: config.fill_history_limit,
        }
    }

    /// Only caller mistakes fail; model and transport trouble yields
    /// `ASK_USER` for the affected fields.
    pub async fn fill(
        &self,
        schema: &[FormField],
        history: &[Message],
        profile: Option<&UserProfile>,
    ) -> Result<FillResult, ValidationError> {
        if schema.is_empty() {
            return Err(ValidationError::InvalidSchema);
        }
        if history.len() > self.history_limit {
            return Err(ValidationError::ConversationTooLong { len: history.len(), max: self.history_limit });
        }

        let recent = &history[history.len().saturating_sub(self.history_window)..];
        let profile_block = profile.and_then(UserProfile::prompt_block);
        let prompt = prompts::fill(schema, recent, profile_block.as_deref());

        let reply = match self.completion.try_complete(&CompletionRequest::new(prompt, self.settings)).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("[fill] completion failed, asking the user for every field: {}", e);
                return Ok(FillResult::all_missing(schema));
            }
        };
        let value = match recover(&reply) {
            Ok(recovered) => recovered.value,
            Err(e) => {
                warn!("[fill] {}; asking the user for every field", e);
                return Ok(FillResult::all_missing(schema));
            }
        };

        let values = extract_values(&value, schema);
        debug!("[fill] model supplied {} values", values.len());
        let result = FillResult::from_values(schema, values);
        info!(
            "[fill] {}/{} fields filled",
            result.fields.len() - result.missing_fields.len(),
            result.fields.len()
        );
        Ok(result)
    }
}

/// Accepts `{"fields": [{"name", "value"}]}` or a flat `{"name": "value"}`
/// map. Unknown names and blank values are dropped.
fn extract_values(value: &Value, schema: &[FormField]) -> HashMap<String, String> {
    let pairs: Vec<(&str, &Value)> = match value.get("fields").and_then(Value::as_array) {
        Some(items) => items
            .iter()
            .filter_map(|item| Some((item.get("name")?.as_str()?, item.get("value")?)))
            .collect(),
        None => value
            .as_object()
            .map(|flat| flat.iter().map(|(name, raw)| (name.as_str(), raw)).collect())
            .unwrap_or_default(),
    };

    pairs
        .into_iter()
        .filter(|(name, _)| schema.iter().any(|f| f.name == *name))
        .filter_map(|(name, raw)| {
            let text = match raw {
                Value::String(s) => s.trim().to_string(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return None,
            };
            (!text.is_empty() && !text.eq_ignore_ascii_case(ASK_USER)).then(|| (name.to_string(), text))
        })
        .collect()
}

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::dedupe::dedupe;
use super::shapes::ExtractionShape;
use super::types::{ConfidenceSummary, FieldType, FormField, FormFieldSet};
use crate::config::CompletionSettings;
use crate::llm::{CompletionInterface, CompletionRequest};
use crate::prompts;
use crate::recovery::recover;

pub const MANUAL_ENTRY_FIELD: &str = "manual_entry";
pub const GENERIC_FIELD: &str = "form_content";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionResult {
    pub fields: FormFieldSet,
    pub confidence: ConfidenceSummary,
}

impl ExtractionResult {
    fn from_fields(fields: FormFieldSet) -> Self {
        Self { confidence: ConfidenceSummary::from_fields(&fields), fields }
    }
}

/// Raw OCR text in, deduplicated field schema out. Never fails.
pub struct FormFieldExtractionPipeline {
    completion: Arc<dyn CompletionInterface>,
    settings: CompletionSettings,
}

impl FormFieldExtractionPipeline {
    pub fn new(completion: Arc<dyn CompletionInterface>, settings: CompletionSettings) -> Self {
        Self { completion, settings }
    }

    pub async fn extract(&self, raw_text: &str) -> ExtractionResult {
        if raw_text.trim().is_empty() {
            warn!("[extraction] no form text, returning a manual-entry field");
            return ExtractionResult::from_fields(vec![manual_entry()]);
        }

        let request = CompletionRequest::new(prompts::extraction(raw_text), self.settings);
        let reply = match self.completion.try_complete(&request).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("[extraction] completion failed, returning a manual-entry field: {}", e);
                return ExtractionResult::from_fields(vec![manual_entry()]);
            }
        };
        let recovered = match recover(&reply) {
            Ok(recovered) => recovered,
            Err(e) => {
                warn!("[extraction] {}; returning a manual-entry field", e);
                return ExtractionResult::from_fields(vec![manual_entry()]);
            }
        };

        let shape = ExtractionShape::classify(&recovered.value);
        debug!("[extraction] reply recovered via {:?} as '{}' shape", recovered.strategy, shape.name());
        let candidates = shape.into_fields();
        let candidate_count = candidates.len();
        let mut fields = dedupe(candidates);
        if fields.is_empty() {
            warn!("[extraction] no usable fields, falling back to a generic field");
            fields.push(generic_field());
        }

        info!("[extraction] {} candidates -> {} fields", candidate_count, fields.len());
        ExtractionResult::from_fields(fields)
    }
}

fn manual_entry() -> FormField {
    FormField::new(MANUAL_ENTRY_FIELD, FieldType::Text, "Nhập thông tin thủ công")
        .with_description("Không thể tự động trích xuất các trường của biểu mẫu")
        .with_confidence(0.0)
}

fn generic_field() -> FormField {
    FormField::new(GENERIC_FIELD, FieldType::Text, "Nội dung biểu mẫu")
        .with_description("Điền thông tin theo biểu mẫu")
        .with_confidence(50.0)
        .required()
}

use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use super::extraction::FormFieldExtractionPipeline;
use super::store::{FormKey, FormStore};
use super::types::{ConfidenceSummary, FormFieldSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaSource {
    Store,
    Extraction,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormSchema {
    pub source: SchemaSource,
    pub form_id: Option<i64>,
    pub title: Option<String>,
    pub processing_status: Option<String>,
    pub fields: FormFieldSet,
    pub confidence: ConfidenceSummary,
}

/// Stored schema first; OCR text is extracted only on a miss.
pub struct FormSchemaService {
    store: Arc<dyn FormStore>,
    extraction: Arc<FormFieldExtractionPipeline>,
}

impl FormSchemaService {
    pub fn new(store: Arc<dyn FormStore>, extraction: Arc<FormFieldExtractionPipeline>) -> Self {
        Self { store, extraction }
    }

    /// `None` when the store has nothing usable and no text was supplied.
    pub async fn resolve(&self, key: Option<&FormKey>, raw_text: Option<&str>) -> Option<FormSchema> {
        if let Some(key) = key {
            match self.store.find(key).await {
                Ok(Some(form)) if !form.fields.is_empty() => {
                    info!("[schema] {:?} served from the store ({} fields)", key, form.fields.len());
                    return Some(FormSchema {
                        source: SchemaSource::Store,
                        form_id: Some(form.id),
                        title: Some(form.title).filter(|t| !t.is_empty()),
                        processing_status: Some(form.processing_status),
                        confidence: ConfidenceSummary::from_fields(&form.fields),
                        fields: form.fields,
                    });
                }
                Ok(Some(form)) => warn!("[schema] stored form {} has no fields", form.id),
                Ok(None) => info!("[schema] {:?} not in the store", key),
                Err(e) => warn!("[schema] store lookup for {:?} failed: {}", key, e),
            }
        }

        let text = raw_text.filter(|t| !t.trim().is_empty())?;
        let extracted = self.extraction.extract(text).await;
        Some(FormSchema {
            source: SchemaSource::Extraction,
            form_id: match key {
                Some(FormKey::Id(id)) => Some(*id),
                _ => None,
            },
            title: None,
            processing_status: None,
            fields: extracted.fields,
            confidence: extracted.confidence,
        })
    }
}

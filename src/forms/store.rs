//! Previously extracted form schemas, keyed by id or file name.

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

use super::dedupe::dedupe;
use super::shapes::ExtractionShape;
use super::types::FormFieldSet;
use crate::config::FormStoreConfig;
use crate::errors::ServiceError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormKey {
    Id(i64),
    Filename(String),
}

impl FormKey {
    /// Directory parts are ignored; stored URLs are matched by file name.
    pub fn filename(raw: &str) -> Self {
        let name = raw.rsplit(['/', '\\']).next().unwrap_or(raw).trim();
        FormKey::Filename(name.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredForm {
    pub id: i64,
    pub title: String,
    pub category: Option<String>,
    pub url: String,
    pub fields: FormFieldSet,
    pub processing_status: String,
    pub confidence_scores: Value,
}

#[derive(Debug, Deserialize)]
struct FormRow {
    id: i64,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    form_fields: Option<Vec<Value>>,
    #[serde(default)]
    processing_status: Option<String>,
    #[serde(default)]
    confidence_scores: Option<Value>,
}

impl From<FormRow> for StoredForm {
    fn from(row: FormRow) -> Self {
        Self {
            id: row.id,
            title: row.title.unwrap_or_default(),
            category: row.category,
            url: row.url.unwrap_or_default(),
            fields: dedupe(ExtractionShape::Fields(row.form_fields.unwrap_or_default()).into_fields()),
            processing_status: row.processing_status.unwrap_or_else(|| "unknown".to_string()),
            confidence_scores: row.confidence_scores.unwrap_or_else(|| Value::Object(Default::default())),
        }
    }
}

#[async_trait]
pub trait FormStore: Send + Sync {
    /// `Ok(None)` on a miss; only active forms are visible. Field names of a
    /// returned form are unique.
    async fn find(&self, key: &FormKey) -> Result<Option<StoredForm>, ServiceError>;
}

/// PostgREST-style table access.
pub struct HttpFormStore {
    client: Client,
    base_url: String,
    api_key: String,
    table: String,
}

impl HttpFormStore {
    pub fn new(config: &FormStoreConfig) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        info!("Initialized form store client: {} (table {})", config.base_url, config.table);
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            table: config.table.clone(),
        })
    }
}

#[async_trait]
impl FormStore for HttpFormStore {
    async fn find(&self, key: &FormKey) -> Result<Option<StoredForm>, ServiceError> {
        let url = format!("{}/rest/v1/{}", self.base_url, self.table);
        let filter = match key {
            FormKey::Id(id) => ("id", format!("eq.{id}")),
            FormKey::Filename(name) => ("url", format!("ilike.*{name}")),
        };
        let response = self
            .client
            .get(&url)
            .query(&[("select", "*".to_string()), (filter.0, filter.1), ("is_active", "eq.true".to_string())])
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ServiceError::Status { status: status.as_u16(), message });
        }

        let rows: Vec<FormRow> = response.json().await?;
        debug!("[form-store] {:?} matched {} rows", key, rows.len());
        Ok(rows.into_iter().next().map(StoredForm::from))
    }
}

/// Used when no store is configured, and by tests.
#[derive(Default)]
pub struct InMemoryFormStore {
    forms: DashMap<i64, StoredForm>,
}

impl InMemoryFormStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, mut form: StoredForm) {
        form.fields = dedupe(std::mem::take(&mut form.fields));
        self.forms.insert(form.id, form);
    }
}

#[async_trait]
impl FormStore for InMemoryFormStore {
    async fn find(&self, key: &FormKey) -> Result<Option<StoredForm>, ServiceError> {
        let found = match key {
            FormKey::Id(id) => self.forms.get(id).map(|entry| entry.value().clone()),
            FormKey::Filename(name) => {
                let name = name.to_lowercase();
                self.forms
                    .iter()
                    .find(|entry| entry.value().url.to_lowercase().ends_with(&name))
                    .map(|entry| entry.value().clone())
            }
        };
        Ok(found)
    }
}

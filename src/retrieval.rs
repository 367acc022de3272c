//! Client for the vector-search gateway.
//!
//! The gateway owns embedding and matching; this side only picks the RPC
//! function, the filters, and tidies up the records it returns.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::RetrievalConfig;
use crate::conversations::types::Category;
use crate::errors::ServiceError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalRecord {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub similarity: f32,
}

/// Gateway row. Form rows carry `description` where document chunks carry
/// `content`.
#[derive(Debug, Deserialize)]
struct GatewayRow {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    similarity: Option<f32>,
}

impl From<GatewayRow> for RetrievalRecord {
    fn from(row: GatewayRow) -> Self {
        Self {
            title: row.title.unwrap_or_default(),
            url: row.url.unwrap_or_default(),
            content: row.content.filter(|c| !c.is_empty()).or(row.description).unwrap_or_default(),
            similarity: row.similarity.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalKind {
    Documents,
    Forms,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalQuery {
    pub text: String,
    pub kind: RetrievalKind,
    pub top_k: usize,
    pub country: Option<String>,
    pub category: Option<Category>,
}

/// Ordered top-k search, most similar first.
#[async_trait]
pub trait RetrievalService: Send + Sync {
    async fn search(&self, query: &RetrievalQuery) -> Result<Vec<RetrievalRecord>, ServiceError>;
}

pub struct HttpRetrievalService {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    document_function: String,
    category_functions: HashMap<String, String>,
    form_function: String,
    country_codes: HashMap<String, String>,
    form_url_prefix: Option<String>,
}

impl HttpRetrievalService {
    pub fn new(config: &RetrievalConfig) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        info!("Initialized retrieval gateway client: {}", config.base_url);
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            document_function: config.document_function.clone(),
            category_functions: config.category_functions.clone(),
            form_function: config.form_function.clone(),
            country_codes: config.country_codes.clone(),
            form_url_prefix: config.form_url_prefix.clone(),
        })
    }

    fn function_for(&self, query: &RetrievalQuery) -> &str {
        match query.kind {
            RetrievalKind::Forms => self.form_function.as_str(),
            RetrievalKind::Documents => query
                .category
                .and_then(|c| self.category_functions.get(c.as_str()))
                .map(String::as_str)
                .unwrap_or(self.document_function.as_str()),
        }
    }

    fn normalize_country(&self, country: &str) -> String {
        let key = country.trim().to_lowercase();
        self.country_codes
            .get(&key)
            .cloned()
            .unwrap_or_else(|| country.trim().to_string())
    }

    /// Point stored form paths at the public download prefix, keeping only
    /// the file name.
    fn rewrite_form_url(&self, url: &str) -> String {
        match &self.form_url_prefix {
            Some(prefix) if !url.is_empty() => {
                let filename = url.rsplit(['/', '\\']).next().unwrap_or(url);
                format!("{}/{}", prefix.trim_end_matches('/'), filename)
            }
            _ => url.to_string(),
        }
    }
}

#[async_trait]
impl RetrievalService for HttpRetrievalService {
    async fn search(&self, query: &RetrievalQuery) -> Result<Vec<RetrievalRecord>, ServiceError> {
        let function = self.function_for(query);
        let url = format!("{}/rpc/{}", self.base_url, function);

        let mut body = json!({
            "query_text": query.text,
            "match_count": query.top_k,
        });
        if let Some(country) = query.country.as_deref().filter(|c| !c.trim().is_empty()) {
            body["filter_country"] = json!(self.normalize_country(country));
        }
        if let Some(category) = query.category {
            body["filter_category"] = json!(category.as_str());
        }
        debug!("[retrieval] rpc={} body={}", function, body);

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("apikey", key).bearer_auth(key);
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ServiceError::Status { status: status.as_u16(), message });
        }

        let rows: Vec<GatewayRow> = response.json().await?;
        let mut records: Vec<RetrievalRecord> = rows.into_iter().map(RetrievalRecord::from).collect();
        if query.kind == RetrievalKind::Forms {
            for record in &mut records {
                record.url = self.rewrite_form_url(&record.url);
            }
        }
        records.truncate(query.top_k);
        debug!("[retrieval] {} records from {}", records.len(), function);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service(server: &MockServer) -> HttpRetrievalService {
        let config: RetrievalConfig = serde_yaml::from_str(&format!(
            "base_url: {}\ncategory_functions:\n  housing: match_chunks_housing\nform_url_prefix: https://govly.example/forms",
            server.uri()
        ))
        .unwrap();
        HttpRetrievalService::new(&config).unwrap()
    }

    #[tokio::test]
    async fn category_function_and_country_code_are_applied() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rpc/match_chunks_housing"))
            .and(body_json(json!({
                "query_text": "show me housing policies",
                "match_count": 3,
                "filter_country": "VN",
                "filter_category": "housing"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"title": "Luật Nhà ở 2023", "url": "https://docs/nha-o", "content": "...", "similarity": 0.91},
                {"title": "Nghị định 95", "url": "https://docs/95", "content": "...", "similarity": 0.84}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let records = service(&server)
            .search(&RetrievalQuery {
                text: "show me housing policies".into(),
                kind: RetrievalKind::Documents,
                top_k: 3,
                country: Some("Viet Nam".into()),
                category: Some(Category::Housing),
            })
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].title, "Luật Nhà ở 2023");
    }

    #[tokio::test]
    async fn form_urls_are_rewritten_onto_the_public_prefix() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rpc/match_forms"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"title": "Tờ khai", "url": "storage/forms/to_khai_ct01.pdf", "description": "Mẫu CT01", "similarity": 0.7}
            ])))
            .mount(&server)
            .await;

        let records = service(&server)
            .search(&RetrievalQuery {
                text: "đăng ký thường trú".into(),
                kind: RetrievalKind::Forms,
                top_k: 3,
                country: None,
                category: None,
            })
            .await
            .unwrap();

        assert_eq!(records[0].url, "https://govly.example/forms/to_khai_ct01.pdf");
        assert_eq!(records[0].content, "Mẫu CT01");
    }

    #[tokio::test]
    async fn gateway_errors_surface_as_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = service(&server)
            .search(&RetrievalQuery {
                text: "x".into(),
                kind: RetrievalKind::Documents,
                top_k: 3,
                country: None,
                category: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Status { status: 500, .. }));
    }
}

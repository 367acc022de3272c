use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::conversations::types::{Category, Message, TurnRequest};
use crate::forms::{FormField, FormKey, UserProfile};
use crate::retrieval::{RetrievalKind, RetrievalQuery};
use crate::state::AppState;

type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, message: impl ToString) -> ApiError {
    (status, Json(json!({ "error": message.to_string() })))
}

pub fn create_routes() -> Router<AppState> {
    Router::new()
        // WebSocket
        .route("/client-ws", get(websocket_handler))

        // Health check
        .route("/api/health", get(health_check))

        // Chat and forms
        .route("/api/chat", post(chat))
        .route("/api/forms/extract", post(extract_form))
        .route("/api/forms/fill", post(fill_form))
        .route("/api/forms/schema", post(form_schema))
        .route("/api/agencies/:country/:category", get(agencies))

        // Direct retrieval, no routing or narration
        .route("/api/search/documents", post(search_documents))
        .route("/api/search/forms", post(search_forms))
}

async fn websocket_handler(
    ws: axum::extract::ws::WebSocketUpgrade,
    State(state): State<AppState>,
) -> axum::response::Response {
    crate::websocket::websocket_handler(ws, State(state)).await
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let llm = &state.config.llm_config;
    Json(json!({
        "status": "ok",
        "provider": llm.provider,
        "model": llm.model,
        "form_store": state.config.form_store_config.is_some(),
    }))
}

#[derive(Debug, Deserialize)]
struct ChatPayload {
    message: String,
    #[serde(default)]
    context: Vec<Message>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    selected_agency: Option<String>,
}

async fn chat(
    State(state): State<AppState>,
    Json(payload): Json<ChatPayload>,
) -> Result<Json<Value>, ApiError> {
    let request = TurnRequest::new(
        &payload.message,
        payload.context,
        payload.country,
        payload.language,
        payload.selected_agency,
    )
    .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;

    let response = state.router.route(&request).await;
    Ok(Json(json!(response)))
}

#[derive(Debug, Deserialize)]
struct ExtractPayload {
    #[serde(default)]
    raw_text: String,
}

async fn extract_form(
    State(state): State<AppState>,
    Json(payload): Json<ExtractPayload>,
) -> Json<Value> {
    let result = state.extraction.extract(&payload.raw_text).await;
    Json(json!(result))
}

#[derive(Debug, Deserialize)]
struct FillPayload {
    #[serde(default)]
    fields: Vec<FormField>,
    #[serde(default)]
    chat_history: Vec<Message>,
    #[serde(default)]
    user_profile: Option<UserProfile>,
}

async fn fill_form(
    State(state): State<AppState>,
    Json(payload): Json<FillPayload>,
) -> Result<Json<Value>, ApiError> {
    let result = state
        .fill
        .fill(&payload.fields, &payload.chat_history, payload.user_profile.as_ref())
        .await
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;
    Ok(Json(json!(result)))
}

#[derive(Debug, Deserialize)]
struct SchemaPayload {
    #[serde(default)]
    form_id: Option<i64>,
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    raw_text: Option<String>,
}

async fn form_schema(
    State(state): State<AppState>,
    Json(payload): Json<SchemaPayload>,
) -> Result<Json<Value>, ApiError> {
    let key = match (payload.form_id, payload.filename.as_deref()) {
        (Some(id), _) => Some(FormKey::Id(id)),
        (None, Some(name)) if !name.trim().is_empty() => Some(FormKey::filename(name)),
        _ => None,
    };
    match state.schemas.resolve(key.as_ref(), payload.raw_text.as_deref()).await {
        Some(schema) => Ok(Json(json!(schema))),
        None => Err(api_error(StatusCode::NOT_FOUND, "form not found and no form text supplied")),
    }
}

async fn agencies(
    State(state): State<AppState>,
    Path((country, category)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let category = Category::parse(&category)
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, format!("unknown category '{category}'")))?;
    let agencies = state.directory.lookup(&country, category);
    info!("Agency lookup {} / {}: {} entries", country, category.as_str(), agencies.len());
    Ok(Json(json!({
        "country": country,
        "category": category,
        "agencies": agencies,
    })))
}

#[derive(Debug, Deserialize)]
struct SearchPayload {
    query: String,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    category: Option<String>,
}

async fn search_documents(
    State(state): State<AppState>,
    Json(payload): Json<SearchPayload>,
) -> Result<Json<Value>, ApiError> {
    search(&state, RetrievalKind::Documents, payload).await
}

async fn search_forms(
    State(state): State<AppState>,
    Json(payload): Json<SearchPayload>,
) -> Result<Json<Value>, ApiError> {
    search(&state, RetrievalKind::Forms, payload).await
}

/// A gateway failure answers with an empty result list.
async fn search(state: &AppState, kind: RetrievalKind, payload: SearchPayload) -> Result<Json<Value>, ApiError> {
    let text = payload.query.trim();
    if text.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "query must not be empty"));
    }
    let query = RetrievalQuery {
        text: text.to_string(),
        kind,
        top_k: state.config.retrieval_config.top_k,
        country: payload.country.filter(|c| !c.trim().is_empty()),
        category: payload.category.as_deref().and_then(Category::parse),
    };
    let results = state.retrieval.search(&query).await.unwrap_or_else(|e| {
        warn!("[search] {:?} search failed, answering empty: {}", kind, e);
        Vec::new()
    });
    Ok(Json(json!({ "results": results })))
}

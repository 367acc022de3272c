use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

use super::completion_interface::{CompletionBackend, CompletionRequest};
use crate::errors::CompletionError;

/// OpenAI-style chat completions endpoint (SEA-LION, OpenAI, Ollama's `/v1`).
pub struct OpenAICompatibleLLM {
    client: Client,
    base_url: String,
    api_key: String,
    /// SEA-LION reasoning models think out loud unless told not to.
    disable_thinking: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

impl OpenAICompatibleLLM {
    pub fn new(
        base_url: String,
        api_key: String,
        timeout: Duration,
        disable_thinking: bool,
    ) -> Result<Self, CompletionError> {
        let client = Client::builder().timeout(timeout).build()?;
        let base_url = base_url.trim_end_matches('/').to_string();
        info!("Initialized OpenAICompatibleLLM: base_url={}", base_url);
        Ok(Self { client, base_url, api_key, disable_thinking })
    }
}

/// Map a non-success status to the error family the retry ladder expects.
fn classify_status(status: StatusCode, body: String, model: &str) -> CompletionError {
    let code = status.as_u16();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return CompletionError::RateLimited { status: code };
    }
    if status.is_server_error() {
        return CompletionError::Server { status: code, message: body };
    }
    let lowered = body.to_lowercase();
    let mentions_model = lowered.contains("model");
    let says_missing = ["invalid", "not found", "does not exist", "not available", "unknown"]
        .iter()
        .any(|needle| lowered.contains(needle));
    if (status == StatusCode::BAD_REQUEST || status == StatusCode::NOT_FOUND) && mentions_model && says_missing {
        return CompletionError::InvalidModel { model: model.to_string() };
    }
    CompletionError::Rejected { status: code, message: body }
}

#[async_trait]
impl CompletionBackend for OpenAICompatibleLLM {
    async fn send(&self, model: &str, request: &CompletionRequest) -> Result<String, CompletionError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut body = json!({
            "messages": [{"role": "user", "content": request.prompt}],
            "model": model,
            "temperature": request.temperature,
            "max_completion_tokens": request.max_tokens,
        });
        if self.disable_thinking {
            body["thinking_mode"] = json!("off");
        }

        debug!("POST {} model={} max_tokens={}", url, model, request.max_tokens);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, text, model));
        }

        let parsed: ChatCompletionResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|text| text.trim().to_string())
            .unwrap_or_default();
        if content.is_empty() {
            return Err(CompletionError::Decode("completion had no content".to_string()));
        }
        Ok(content)
    }

    async fn list_models(&self) -> Result<Vec<String>, CompletionError> {
        let url = format!("{}/models", self.base_url);
        let response = self.client.get(&url).bearer_auth(&self.api_key).send().await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CompletionError::Rejected { status: status.as_u16(), message: text });
        }
        let models: ModelList = response.json().await?;
        Ok(models.data.into_iter().map(|m| m.id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompletionSettings;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn llm(server: &MockServer) -> OpenAICompatibleLLM {
        OpenAICompatibleLLM::new(server.uri(), "test-key".into(), Duration::from_secs(5), true).unwrap()
    }

    fn request() -> CompletionRequest {
        CompletionRequest::new("Xin chào", CompletionSettings::new(0.2, 64))
    }

    #[tokio::test]
    async fn sends_openai_body_and_trims_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(json!({
                "model": "sea-lion-it",
                "max_completion_tokens": 64,
                "thinking_mode": "off",
                "messages": [{"role": "user", "content": "Xin chào"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "  Chào bạn!\n"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let text = llm(&server).send("sea-lion-it", &request()).await.unwrap();
        assert_eq!(text, "Chào bạn!");
    }

    #[tokio::test]
    async fn maps_statuses_to_error_kinds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_string(r#"{"error": "The model `old` does not exist"}"#))
            .mount(&server)
            .await;

        let err = llm(&server).send("old", &request()).await.unwrap_err();
        assert!(matches!(err, CompletionError::InvalidModel { model } if model == "old"));
    }

    #[tokio::test]
    async fn server_errors_are_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = llm(&server).send("m", &request()).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn lists_model_ids() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"id": "aisingapore/Gemma-SEA-LION-v3-9B-IT"}, {"id": "aisingapore/Llama-SEA-LION-v3-70B"}]
            })))
            .mount(&server)
            .await;

        let models = llm(&server).list_models().await.unwrap();
        assert_eq!(models.len(), 2);
        assert_eq!(models[0], "aisingapore/Gemma-SEA-LION-v3-9B-IT");
    }

    #[test]
    fn unauthorized_is_rejected_not_invalid_model() {
        let err = classify_status(StatusCode::UNAUTHORIZED, "invalid api key".into(), "m");
        assert!(matches!(err, CompletionError::Rejected { status: 401, .. }));
    }
}

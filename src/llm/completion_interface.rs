use async_trait::async_trait;
use tracing::warn;

use crate::config::CompletionSettings;
use crate::errors::CompletionError;

/// Returned to the user when no model could answer.
pub const APOLOGY: &str = "Sorry, I'm having trouble answering right now. Please try again in a moment. \
(Xin lỗi, hiện tôi chưa thể trả lời. Vui lòng thử lại sau.)";

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>, settings: CompletionSettings) -> Self {
        Self {
            prompt: prompt.into(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        }
    }
}

/// Text completion as seen by the pipelines.
///
/// Pipelines that parse structured output call [`try_complete`] so they can
/// pick their own fallback payload. Conversational pipelines call
/// [`complete`], which never fails.
///
/// [`try_complete`]: CompletionInterface::try_complete
/// [`complete`]: CompletionInterface::complete
#[async_trait]
pub trait CompletionInterface: Send + Sync {
    async fn try_complete(&self, request: &CompletionRequest) -> Result<String, CompletionError>;

    async fn complete(&self, request: &CompletionRequest) -> String {
        match self.try_complete(request).await {
            Ok(text) => text,
            Err(e) => {
                warn!("completion failed, answering with apology: {}", e);
                APOLOGY.to_string()
            }
        }
    }
}

/// A single provider endpoint. Stateless: no retries, no fallback.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Send one request against `model`.
    async fn send(&self, model: &str, request: &CompletionRequest) -> Result<String, CompletionError>;

    /// Model identifiers the provider currently serves.
    async fn list_models(&self) -> Result<Vec<String>, CompletionError>;
}

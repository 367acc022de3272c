use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::completion_client::CompletionClient;
use super::completion_interface::{CompletionBackend, CompletionInterface};
use super::openai_compatible::OpenAICompatibleLLM;
use crate::config::LlmConfig;
use crate::errors::{CompletionError, ConfigurationError};

/// Builds the completion stack for the configured provider.
pub struct CompletionFactory;

impl CompletionFactory {
    pub fn create_backend(config: &LlmConfig) -> Result<Arc<dyn CompletionBackend>, ConfigurationError> {
        info!("Initializing completion provider: {}", config.provider);
        let timeout = Duration::from_secs(config.timeout_secs);
        let build = |disable_thinking: bool| {
            OpenAICompatibleLLM::new(config.base_url.clone(), config.llm_api_key.clone(), timeout, disable_thinking)
                .map_err(|e: CompletionError| ConfigurationError::InvalidValue {
                    key: "llm_config.base_url".to_string(),
                    reason: e.to_string(),
                })
        };

        match config.provider.as_str() {
            "sea_lion" => Ok(Arc::new(build(true)?)),
            "openai_compatible" | "openai" | "ollama" => Ok(Arc::new(build(false)?)),
            other => Err(ConfigurationError::UnsupportedProvider(other.to_string())),
        }
    }

    /// Provider backend wrapped in the retrying, falling-back client.
    pub fn create_client(config: &LlmConfig) -> Result<Arc<dyn CompletionInterface>, ConfigurationError> {
        let backend = Self::create_backend(config)?;
        Ok(Arc::new(CompletionClient::new(backend, config)))
    }
}

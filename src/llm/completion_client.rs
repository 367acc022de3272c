//! Retry ladder around a [`CompletionBackend`].
//!
//! Per model: up to `max_attempts` sends with exponential backoff on
//! retryable errors. An "invalid model" reply triggers one lookup of the
//! provider's model list (cached for the life of the process) and a switch to
//! the closest alternative. When the primary model gives up, the same ladder
//! runs against the fallback model.

use async_trait::async_trait;
use backon::{BackoffBuilder, ExponentialBuilder};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::completion_interface::{CompletionBackend, CompletionInterface, CompletionRequest};
use crate::config::{LlmConfig, RetryConfig};
use crate::errors::CompletionError;

pub struct CompletionClient {
    backend: Arc<dyn CompletionBackend>,
    primary_model: String,
    fallback_model: Option<String>,
    instruct_marker: String,
    retry: RetryConfig,
    available_models: OnceCell<Vec<String>>,
}

impl CompletionClient {
    pub fn new(backend: Arc<dyn CompletionBackend>, config: &LlmConfig) -> Self {
        Self {
            backend,
            primary_model: config.model.clone(),
            fallback_model: config.fallback_model.clone().filter(|m| !m.trim().is_empty()),
            instruct_marker: config.instruct_marker.clone(),
            retry: config.retry.clone(),
            available_models: OnceCell::new(),
        }
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(self.retry.base_delay_ms))
            .with_max_delay(Duration::from_millis(self.retry.max_delay_ms))
            .with_factor(2.0)
            .with_max_times(self.retry.max_attempts.saturating_sub(1))
    }

    /// Run the per-model ladder. Every model name actually sent to is pushed
    /// onto `tried`.
    async fn run_ladder(
        &self,
        model: &str,
        request: &CompletionRequest,
        tried: &mut Vec<String>,
    ) -> Result<String, CompletionError> {
        let mut model = model.to_string();
        let mut delays = self.backoff().build();
        let mut swapped = false;
        tried.push(model.clone());

        loop {
            let err = match self.backend.send(&model, request).await {
                Ok(text) => return Ok(text),
                Err(e) => e,
            };

            match err {
                CompletionError::InvalidModel { .. } if !swapped => {
                    swapped = true;
                    match self.discover_alternative(tried).await {
                        Some(alternative) => {
                            warn!("model `{}` unavailable, switching to `{}`", model, alternative);
                            model = alternative;
                            tried.push(model.clone());
                        }
                        None => return Err(err),
                    }
                }
                err if err.is_retryable() => match delays.next() {
                    Some(delay) => {
                        warn!("completion on `{}` failed ({}), retrying in {:?}", model, err, delay);
                        tokio::time::sleep(delay).await;
                    }
                    None => return Err(err),
                },
                err => return Err(err),
            }
        }
    }

    async fn models(&self) -> Option<&Vec<String>> {
        let backend = self.backend.clone();
        match self
            .available_models
            .get_or_try_init(|| async move { backend.list_models().await })
            .await
        {
            Ok(models) => Some(models),
            Err(e) => {
                warn!("could not list provider models: {}", e);
                None
            }
        }
    }

    async fn discover_alternative(&self, exclude: &[String]) -> Option<String> {
        let models = self.models().await?;
        best_alternative(models, exclude, &self.instruct_marker)
    }

    async fn fallback_for(&self, tried: &[String]) -> Option<String> {
        if let Some(configured) = &self.fallback_model {
            if !tried.contains(configured) {
                return Some(configured.clone());
            }
        }
        self.discover_alternative(tried).await
    }
}

/// Pick the listed model closest to the last excluded one: names carrying
/// the instruct marker win, then the most shared name tokens. Ties keep list
/// order.
pub fn best_alternative(models: &[String], exclude: &[String], marker: &str) -> Option<String> {
    let reference = exclude.last().map(|m| tokens(m)).unwrap_or_default();
    let marker = marker.to_lowercase();

    let mut best: Option<(&String, (bool, usize))> = None;
    for candidate in models.iter().filter(|m| !exclude.contains(m)) {
        let has_marker = !marker.is_empty() && candidate.to_lowercase().contains(&marker);
        let shared = tokens(candidate).iter().filter(|t| reference.contains(t)).count();
        let score = (has_marker, shared);
        if best.map_or(true, |(_, top)| score > top) {
            best = Some((candidate, score));
        }
    }
    best.map(|(name, _)| name.clone())
}

fn tokens(model: &str) -> Vec<String> {
    model
        .to_lowercase()
        .split(|c: char| matches!(c, '/' | '-' | '.' | '_' | ':'))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl CompletionInterface for CompletionClient {
    async fn try_complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let mut tried = Vec::new();
        let primary_err = match self.run_ladder(&self.primary_model, request, &mut tried).await {
            Ok(text) => return Ok(text),
            Err(e) => e,
        };
        warn!("primary model `{}` gave up: {}", self.primary_model, primary_err);

        let Some(fallback) = self.fallback_for(&tried).await else {
            debug!("no fallback model available");
            return Err(CompletionError::Exhausted);
        };
        info!("trying fallback model `{}`", fallback);
        match self.run_ladder(&fallback, request, &mut tried).await {
            Ok(text) => Ok(text),
            Err(e) => {
                warn!("fallback model `{}` gave up: {}", fallback, e);
                Err(CompletionError::Exhausted)
            }
        }
    }
}

//! In-process doubles for the external collaborators.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::Config;
use crate::errors::{CompletionError, ServiceError};
use crate::forms::InMemoryFormStore;
use crate::llm::{CompletionInterface, CompletionRequest};
use crate::retrieval::{RetrievalQuery, RetrievalRecord, RetrievalService};
use crate::state::AppState;

/// Replies from a FIFO script and records every prompt. An exhausted script
/// behaves like an unreachable provider.
#[derive(Default)]
pub struct ScriptedCompletion {
    script: Mutex<VecDeque<Result<String, CompletionError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedCompletion {
    pub fn new(script: Vec<Result<String, CompletionError>>) -> Arc<Self> {
        Arc::new(Self { script: Mutex::new(script.into()), prompts: Mutex::default() })
    }

    pub fn replying(replies: &[&str]) -> Arc<Self> {
        Self::new(replies.iter().map(|r| Ok(r.to_string())).collect())
    }

    pub fn unreachable() -> Arc<Self> {
        Self::new(Vec::new())
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionInterface for ScriptedCompletion {
    async fn try_complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        self.prompts.lock().unwrap().push(request.prompt.clone());
        self.script.lock().unwrap().pop_front().unwrap_or(Err(CompletionError::Exhausted))
    }
}

/// Fixed results, counted calls, last query kept for assertions.
#[derive(Default)]
pub struct StaticRetrieval {
    records: Vec<RetrievalRecord>,
    fail: bool,
    calls: AtomicUsize,
    last_query: Mutex<Option<RetrievalQuery>>,
}

impl StaticRetrieval {
    pub fn with(records: Vec<RetrievalRecord>) -> Arc<Self> {
        Arc::new(Self { records, ..Default::default() })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self { fail: true, ..Default::default() })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_query(&self) -> Option<RetrievalQuery> {
        self.last_query.lock().unwrap().clone()
    }
}

#[async_trait]
impl RetrievalService for StaticRetrieval {
    async fn search(&self, query: &RetrievalQuery) -> Result<Vec<RetrievalRecord>, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_query.lock().unwrap() = Some(query.clone());
        if self.fail {
            return Err(ServiceError::Transport("connection refused".into()));
        }
        Ok(self.records.iter().take(query.top_k).cloned().collect())
    }
}

pub fn record(title: &str, similarity: f32) -> RetrievalRecord {
    RetrievalRecord {
        title: title.to_string(),
        url: format!("https://docs.example/{}", title.to_lowercase().replace(' ', "-")),
        content: format!("{title} content"),
        similarity,
    }
}

/// Default configuration wired to in-process doubles.
pub fn app_state(completion: Arc<ScriptedCompletion>, retrieval: Arc<StaticRetrieval>) -> AppState {
    let config: Config = serde_yaml::from_str(
        "llm_config:\n  llm_api_key: test-key\nretrieval_config:\n  base_url: http://localhost:1\n",
    )
    .unwrap();
    AppState::with_collaborators(config, completion, retrieval, Arc::new(InMemoryFormStore::new()))
}

use async_trait::async_trait;
use std::sync::Arc;

use super::{ActionHandler, ActionOutcome, TurnContext};
use crate::config::CompletionSettings;
use crate::conversations::types::{ResponseType, TurnRequest};
use crate::llm::{CompletionInterface, CompletionRequest};
use crate::prompts;
use crate::retrieval::{RetrievalKind, RetrievalRecord};

/// Open-ended advice. Also the clarification path and the narrator for
/// retrieval results.
pub struct AdvisoryChatHandler {
    completion: Arc<dyn CompletionInterface>,
    advisory: CompletionSettings,
    narration: CompletionSettings,
}

impl AdvisoryChatHandler {
    pub fn new(
        completion: Arc<dyn CompletionInterface>,
        advisory: CompletionSettings,
        narration: CompletionSettings,
    ) -> Self {
        Self { completion, advisory, narration }
    }

    /// Explain why the retrieved records fit the request.
    pub async fn narrate(&self, request: &TurnRequest, kind: RetrievalKind, records: &[RetrievalRecord]) -> String {
        let prompt = prompts::narration(request, kind, records);
        self.completion
            .complete(&CompletionRequest::new(prompt, self.narration))
            .await
    }
}

#[async_trait]
impl ActionHandler for AdvisoryChatHandler {
    fn kind(&self) -> ResponseType {
        ResponseType::Advisory
    }

    async fn handle(&self, turn: &TurnContext<'_>) -> ActionOutcome {
        let prompt = prompts::advisory(turn.request, turn.clarify);
        let text = self
            .completion
            .complete(&CompletionRequest::new(prompt, self.advisory))
            .await;
        ActionOutcome::text(text)
    }
}

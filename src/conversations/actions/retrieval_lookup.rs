use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use super::{ActionHandler, ActionOutcome, AdvisoryChatHandler, TurnContext};
use crate::conversations::types::{ResponseType, Role, TurnRequest};
use crate::retrieval::{RetrievalKind, RetrievalQuery, RetrievalService};

const EARLIER_USER_MESSAGES: usize = 2;

/// Document or form lookup: retrieve top-k, then have the advisory handler
/// narrate the hits once.
pub struct RetrievalLookupHandler {
    kind: RetrievalKind,
    retrieval: Arc<dyn RetrievalService>,
    narrator: Arc<AdvisoryChatHandler>,
    top_k: usize,
}

impl RetrievalLookupHandler {
    pub fn documents(retrieval: Arc<dyn RetrievalService>, narrator: Arc<AdvisoryChatHandler>, top_k: usize) -> Self {
        Self { kind: RetrievalKind::Documents, retrieval, narrator, top_k }
    }

    pub fn forms(retrieval: Arc<dyn RetrievalService>, narrator: Arc<AdvisoryChatHandler>, top_k: usize) -> Self {
        Self { kind: RetrievalKind::Forms, retrieval, narrator, top_k }
    }

    fn nothing_found(&self, request: &TurnRequest) -> String {
        match (self.kind, request.is_vietnamese()) {
            (RetrievalKind::Documents, true) => {
                "Tôi chưa tìm thấy tài liệu phù hợp. Bạn có thể mô tả lại yêu cầu cụ thể hơn không?".to_string()
            }
            (RetrievalKind::Forms, true) => {
                "Tôi chưa tìm thấy biểu mẫu phù hợp. Bạn có thể mô tả lại yêu cầu cụ thể hơn không?".to_string()
            }
            (RetrievalKind::Documents, false) => {
                "I couldn't find any matching documents. Could you rephrase or add more detail?".to_string()
            }
            (RetrievalKind::Forms, false) => {
                "I couldn't find any matching forms. Could you rephrase or add more detail?".to_string()
            }
        }
    }
}

/// The current message plus the last couple of user messages, so answers to
/// clarifying questions still carry the original topic.
fn query_text(request: &TurnRequest) -> String {
    let earlier: Vec<&str> = request
        .context
        .iter()
        .filter(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .collect();
    let start = earlier.len().saturating_sub(EARLIER_USER_MESSAGES);
    let mut parts = earlier[start..].to_vec();
    parts.push(&request.message);
    parts.join(" ")
}

#[async_trait]
impl ActionHandler for RetrievalLookupHandler {
    fn kind(&self) -> ResponseType {
        match self.kind {
            RetrievalKind::Documents => ResponseType::DocumentLookup,
            RetrievalKind::Forms => ResponseType::FormLookup,
        }
    }

    async fn handle(&self, turn: &TurnContext<'_>) -> ActionOutcome {
        let request = turn.request;
        let query = RetrievalQuery {
            text: query_text(request),
            kind: self.kind,
            top_k: self.top_k,
            country: Some(request.country.clone()).filter(|c| !c.trim().is_empty()),
            category: turn.intent.category,
        };

        let records = match self.retrieval.search(&query).await {
            Ok(records) => records,
            Err(e) => {
                warn!("[lookup] {:?} retrieval failed, answering as empty: {}", self.kind, e);
                Vec::new()
            }
        };
        if records.is_empty() {
            info!("[lookup] no {:?} matched", self.kind);
            return ActionOutcome::text(self.nothing_found(request));
        }

        let narration = self.narrator.narrate(request, self.kind, &records).await;
        ActionOutcome { documents: records, ..ActionOutcome::text(narration) }
    }
}

//! Action handlers: exactly one runs per routed turn.

use async_trait::async_trait;

use super::types::{AgencySuggestion, IntentResult, ResponseType, TurnRequest};
use crate::retrieval::RetrievalRecord;

pub mod advisory;
pub mod agency;
pub mod retrieval_lookup;

pub use advisory::AdvisoryChatHandler;
pub use agency::AgencyHandoffHandler;
pub use retrieval_lookup::RetrievalLookupHandler;

/// What a handler sees of the turn.
pub struct TurnContext<'a> {
    pub request: &'a TurnRequest,
    pub intent: &'a IntentResult,
    /// The gate asked for another clarifying turn.
    pub clarify: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionOutcome {
    pub text: String,
    pub documents: Vec<RetrievalRecord>,
    pub agency: Option<AgencySuggestion>,
    pub follow_up_questions: Vec<String>,
}

impl ActionOutcome {
    pub fn text(text: impl Into<String>) -> Self {
        let text = text.into();
        Self { follow_up_questions: follow_up_questions(&text), text, ..Default::default() }
    }
}

/// Handlers absorb their own failures; `handle` always yields a response.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    fn kind(&self) -> ResponseType;

    /// Whether this handler can serve the turn at all. A handler that says
    /// no is replaced by the advisory handler.
    fn accepts(&self, _turn: &TurnContext<'_>) -> bool {
        true
    }

    async fn handle(&self, turn: &TurnContext<'_>) -> ActionOutcome;
}

const MAX_FOLLOW_UPS: usize = 2;

/// The question sentences a response ends with, at most two.
pub fn follow_up_questions(text: &str) -> Vec<String> {
    let mut questions = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        match ch {
            '?' | '？' => {
                let sentence = current.trim().trim_start_matches(['-', '*', '•']).trim();
                if !sentence.is_empty() {
                    questions.push(format!("{sentence}?"));
                }
                current.clear();
            }
            '.' | '!' | '\n' | '。' => current.clear(),
            _ => current.push(ch),
        }
    }
    let skip = questions.len().saturating_sub(MAX_FOLLOW_UPS);
    questions.into_iter().skip(skip).collect()
}

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use super::{follow_up_questions, ActionHandler, ActionOutcome, TurnContext};
use crate::config::CompletionSettings;
use crate::conversations::agency_directory::AgencyDirectory;
use crate::conversations::types::{AgencySuggestion, ResponseType, TurnRequest};
use crate::llm::{CompletionInterface, CompletionRequest, APOLOGY};
use crate::prompts;
use crate::recovery;

/// Explains the situation and proposes a specialised agency, ending on a
/// yes/no hand-off question.
pub struct AgencyHandoffHandler {
    completion: Arc<dyn CompletionInterface>,
    directory: Arc<AgencyDirectory>,
    settings: CompletionSettings,
}

impl AgencyHandoffHandler {
    pub fn new(completion: Arc<dyn CompletionInterface>, directory: Arc<AgencyDirectory>, settings: CompletionSettings) -> Self {
        Self { completion, directory, settings }
    }

    /// Directory entries for the turn, else whatever the classifier proposed.
    fn agencies(&self, turn: &TurnContext<'_>) -> Vec<String> {
        let listed = turn
            .intent
            .category
            .map(|category| self.directory.lookup(&turn.request.country, category))
            .unwrap_or(&[]);
        if listed.is_empty() {
            turn.intent.suggested_agencies.clone()
        } else {
            listed.to_vec()
        }
    }
}

fn handoff_question(request: &TurnRequest, agency: &str) -> String {
    if request.is_vietnamese() {
        format!("Bạn có muốn tôi kết nối bạn với {agency} để được hỗ trợ chuyên sâu không?")
    } else {
        format!("Would you like me to connect you to {agency} for specialised assistance?")
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl ActionHandler for AgencyHandoffHandler {
    fn kind(&self) -> ResponseType {
        ResponseType::AgencyHandoff
    }

    fn accepts(&self, turn: &TurnContext<'_>) -> bool {
        !self.agencies(turn).is_empty()
    }

    async fn handle(&self, turn: &TurnContext<'_>) -> ActionOutcome {
        let request = turn.request;
        let agencies = self.agencies(turn);
        let prompt = prompts::agency(request, turn.intent.category, &agencies);
        let raw = self
            .completion
            .complete(&CompletionRequest::new(prompt, self.settings))
            .await;

        let parsed = recovery::recover(&raw).ok().map(|r| r.value);
        let mut text = parsed
            .as_ref()
            .and_then(|v| v.get("response"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| {
                debug!("[agency] reply was not structured, using it verbatim");
                raw.trim().to_string()
            });

        // Only agencies we actually know about are offered for hand-off.
        let proposed = parsed
            .as_ref()
            .and_then(|v| v.get("suggested_agency"))
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default();
        let suggested = agencies
            .iter()
            .find(|a| a.eq_ignore_ascii_case(proposed))
            .or_else(|| agencies.first())
            .cloned()
            .unwrap_or_default();

        if text != APOLOGY && !text.trim_end().ends_with('?') {
            text = format!("{}\n\n{}", text, handoff_question(request, &suggested));
        }

        let mut questions = string_list(parsed.as_ref().and_then(|v| v.get("follow_up_questions")));
        if questions.is_empty() {
            questions = follow_up_questions(&text);
        }

        info!("[agency] proposing '{}' out of {} agencies", suggested, agencies.len());
        ActionOutcome {
            text,
            documents: Vec::new(),
            agency: Some(AgencySuggestion {
                suggested_agency: suggested,
                available_agencies: agencies,
                category: turn.intent.category,
            }),
            follow_up_questions: questions,
        }
    }
}

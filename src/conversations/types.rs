use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;
use crate::retrieval::RetrievalRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Chronological transcript supplied by the caller each turn.
pub type ConversationContext = Vec<Message>;

/// Number of user turns already in the transcript.
pub fn user_turns(context: &[Message]) -> usize {
    context.iter().filter(|m| m.role == Role::User).count()
}

/// Render the transcript as `User: ...` / `Assistant: ...` lines.
pub fn render_transcript(context: &[Message]) -> String {
    context
        .iter()
        .map(|m| match m.role {
            Role::User => format!("User: {}", m.content),
            Role::Assistant => format!("Assistant: {}", m.content),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Housing,
    Land,
    Immigration,
    Employment,
    Transport,
    Environment,
    Business,
    Education,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Housing,
        Category::Land,
        Category::Immigration,
        Category::Employment,
        Category::Transport,
        Category::Environment,
        Category::Business,
        Category::Education,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Housing => "housing",
            Category::Land => "land",
            Category::Immigration => "immigration",
            Category::Employment => "employment",
            Category::Transport => "transport",
            Category::Environment => "environment",
            Category::Business => "business",
            Category::Education => "education",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let lowered = raw.trim().to_lowercase();
        Category::ALL.into_iter().find(|c| c.as_str() == lowered)
    }
}

/// Which action handler a turn is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    DocumentLookup,
    FormLookup,
    AgencyHandoff,
    Advisory,
}

impl ResponseType {
    /// Accepts both our names and the short labels models tend to emit.
    /// Anything unrecognised is advisory.
    pub fn parse_lenient(raw: &str) -> Self {
        let lowered = raw.trim().to_lowercase().replace(['-', ' '], "_");
        match lowered.as_str() {
            "raglink" | "rag_link" | "document" | "documents" | "document_lookup" => ResponseType::DocumentLookup,
            "ragform" | "rag_form" | "form" | "forms" | "form_lookup" => ResponseType::FormLookup,
            "agency" | "agency_handoff" | "agency_selection" => ResponseType::AgencyHandoff,
            _ => ResponseType::Advisory,
        }
    }

    pub fn is_lookup(&self) -> bool {
        matches!(self, ResponseType::DocumentLookup | ResponseType::FormLookup)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentResult {
    pub category: Option<Category>,
    pub needs_agency: bool,
    pub suggested_agencies: Vec<String>,
    pub response_type: ResponseType,
    pub reasoning: String,
}

impl IntentResult {
    /// Safe default when classification fails.
    pub fn fallback() -> Self {
        Self {
            category: None,
            needs_agency: false,
            suggested_agencies: Vec::new(),
            response_type: ResponseType::Advisory,
            reasoning: "fallback".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub response_type: ResponseType,
    pub should_clarify: bool,
}

/// Everything one routed turn needs.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnRequest {
    pub message: String,
    pub context: ConversationContext,
    pub country: String,
    pub language: String,
    pub selected_agency: Option<String>,
}

pub const DEFAULT_COUNTRY: &str = "Vietnam";
pub const DEFAULT_LANGUAGE: &str = "English";

impl TurnRequest {
    /// Rejects a blank message. Clients often echo the current message as the
    /// last context entry; that copy is dropped.
    pub fn new(
        message: &str,
        mut context: ConversationContext,
        country: Option<String>,
        language: Option<String>,
        selected_agency: Option<String>,
    ) -> Result<Self, ValidationError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(ValidationError::EmptyMessage);
        }
        if context
            .last()
            .is_some_and(|last| last.role == Role::User && last.content.trim() == message)
        {
            context.pop();
        }
        let non_blank = |value: Option<String>| value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        Ok(Self {
            message: message.to_string(),
            context,
            country: non_blank(country).unwrap_or_else(|| DEFAULT_COUNTRY.to_string()),
            language: non_blank(language).unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            selected_agency: non_blank(selected_agency),
        })
    }

    pub fn is_vietnamese(&self) -> bool {
        is_vietnamese(&self.language)
    }
}

pub fn is_vietnamese(language: &str) -> bool {
    let lowered = language.trim().to_lowercase();
    lowered == "vi" || lowered.starts_with("vi-") || lowered.contains("viet") || lowered.contains("việt")
}

/// Agency metadata returned so a client can render a hand-off button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgencySuggestion {
    pub suggested_agency: String,
    pub available_agencies: Vec<String>,
    pub category: Option<Category>,
}

/// Uniform result of one routed turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnResponse {
    pub response: String,
    pub routing: RoutingDecision,
    pub intent: IntentResult,
    pub documents: Vec<RetrievalRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agency: Option<AgencySuggestion>,
    pub follow_up_questions: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_request_drops_the_echoed_message() {
        let context = vec![Message::user("hi"), Message::assistant("Hello!"), Message::user("visa rules ")];
        let request = TurnRequest::new(" visa rules", context, None, Some(" ".into()), Some("".into())).unwrap();

        assert_eq!(request.context.len(), 2);
        assert_eq!(request.country, DEFAULT_COUNTRY);
        assert_eq!(request.language, DEFAULT_LANGUAGE);
        assert_eq!(request.selected_agency, None);
        assert_eq!(TurnRequest::new("  ", vec![], None, None, None), Err(ValidationError::EmptyMessage));
    }

    #[test]
    fn counts_only_user_turns() {
        let context = vec![Message::user("a"), Message::assistant("b"), Message::user("c")];
        assert_eq!(user_turns(&context), 2);
        assert_eq!(user_turns(&[]), 0);
    }

    #[test]
    fn lenient_response_types() {
        assert_eq!(ResponseType::parse_lenient("ragLink"), ResponseType::DocumentLookup);
        assert_eq!(ResponseType::parse_lenient("ragForm"), ResponseType::FormLookup);
        assert_eq!(ResponseType::parse_lenient("agency"), ResponseType::AgencyHandoff);
        assert_eq!(ResponseType::parse_lenient("general"), ResponseType::Advisory);
        assert_eq!(ResponseType::parse_lenient("something else"), ResponseType::Advisory);
    }

    #[test]
    fn category_parsing_is_case_insensitive() {
        assert_eq!(Category::parse(" Housing "), Some(Category::Housing));
        assert_eq!(Category::parse("health"), None);
    }

    #[test]
    fn language_detection() {
        assert!(is_vietnamese("Vietnamese"));
        assert!(is_vietnamese("vi"));
        assert!(is_vietnamese("Tiếng Việt"));
        assert!(!is_vietnamese("English"));
    }
}

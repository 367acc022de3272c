//! Maps a user message onto a category and a response type.
//!
//! Routing policy lives in code as a keyword pre-filter. The model is asked
//! for category and agency suggestions on every non-vague turn, but it only
//! chooses the response type when the pre-filter finds no action keyword or
//! finds both document and form keywords.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use super::agency_directory::AgencyDirectory;
use super::clarification::{is_help_seeking, token_count};
use super::types::{user_turns, Category, IntentResult, ResponseType, TurnRequest};
use crate::config::CompletionSettings;
use crate::llm::{CompletionInterface, CompletionRequest};
use crate::prompts;
use crate::recovery::recover;

const MAX_SUGGESTED_AGENCIES: usize = 3;
const MIN_SUGGESTED_AGENCIES: usize = 2;

const DOCUMENT_KEYWORDS: &[&str] = &[
    "policy", "policies", "document", "regulation", "law", "rules", "guideline", "requirement",
    "show me", "what are the", "how to", "chính sách", "quy định", "luật", "văn bản", "nghị định",
    "thông tư", "hướng dẫn", "thủ tục",
];

const FORM_KEYWORDS: &[&str] = &[
    "form", "application", "apply for", "appeal", "submit", "fill out", "fill in", "download",
    "petition", "mẫu đơn", "đơn xin", "tờ khai", "biểu mẫu", "nộp đơn",
];

const AGENCY_KEYWORDS: &[&str] = &[
    "which agency", "what agency", "which ministry", "which department", "who handles",
    "who do i contact", "who should i contact", "cơ quan nào", "liên hệ cơ quan", "bộ nào",
];

const CATEGORY_KEYWORDS: &[(Category, &[&str])] = &[
    (Category::Housing, &["housing", "house", "apartment", "rent", "nhà ở", "thuê nhà", "căn hộ", "chung cư"]),
    (Category::Land, &["land", "plot", "zoning", "đất", "sổ đỏ", "thửa"]),
    (
        Category::Immigration,
        &["visa", "passport", "citizenship", "residence permit", "immigration", "hộ chiếu", "thị thực", "quốc tịch", "xuất nhập cảnh"],
    ),
    (
        Category::Employment,
        &["job", "employment", "work permit", "labour", "labor", "salary", "việc làm", "lao động", "tiền lương"],
    ),
    (
        Category::Transport,
        &["driving", "driver", "vehicle", "car registration", "public transport", "bằng lái", "giấy phép lái xe", "đăng ký xe", "giao thông"],
    ),
    (Category::Environment, &["pollution", "waste", "environment", "ô nhiễm", "môi trường", "rác thải"]),
    (
        Category::Business,
        &["business", "company", "tax", "enterprise", "invest", "doanh nghiệp", "thuế", "công ty", "kinh doanh"],
    ),
    (Category::Education, &["school", "university", "education", "student", "trường", "giáo dục", "học sinh", "sinh viên"]),
];

/// Outcome of the keyword pre-filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeywordRoute {
    Decided(ResponseType),
    Ambiguous,
}

/// Keyword occurs at the start of a word: "form" matches "forms" but not
/// "information".
fn contains_term(lowered: &str, keyword: &str) -> bool {
    lowered.match_indices(keyword).any(|(start, _)| {
        lowered[..start]
            .chars()
            .next_back()
            .map_or(true, |prev| !prev.is_alphanumeric())
    })
}

fn contains_any(lowered: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| contains_term(lowered, k))
}

/// Route by keyword class: documents, forms, or agency questions. Mixed or
/// missing classes are ambiguous.
pub fn keyword_route(message: &str) -> KeywordRoute {
    let lowered = message.to_lowercase();
    let document = contains_any(&lowered, DOCUMENT_KEYWORDS);
    let form = contains_any(&lowered, FORM_KEYWORDS);
    let agency = contains_any(&lowered, AGENCY_KEYWORDS);

    match (document, form, agency) {
        (true, false, _) => KeywordRoute::Decided(ResponseType::DocumentLookup),
        (false, true, _) => KeywordRoute::Decided(ResponseType::FormLookup),
        (false, false, true) => KeywordRoute::Decided(ResponseType::AgencyHandoff),
        _ => KeywordRoute::Ambiguous,
    }
}

pub fn keyword_category(message: &str) -> Option<Category> {
    let lowered = message.to_lowercase();
    CATEGORY_KEYWORDS
        .iter()
        .find(|(_, keywords)| contains_any(&lowered, keywords))
        .map(|(category, _)| *category)
}

/// Too short to act on at the start of a conversation, or a bare request for
/// help with no concrete action in it.
pub fn is_vague(message: &str, turn_count: usize) -> bool {
    let short_opening = turn_count == 0 && token_count(message) <= 3;
    let bare_help = is_help_seeking(message) && keyword_route(message) == KeywordRoute::Ambiguous;
    short_opening || bare_help
}

pub struct IntentClassifier {
    completion: Arc<dyn CompletionInterface>,
    directory: Arc<AgencyDirectory>,
    settings: CompletionSettings,
}

impl IntentClassifier {
    pub fn new(
        completion: Arc<dyn CompletionInterface>,
        directory: Arc<AgencyDirectory>,
        settings: CompletionSettings,
    ) -> Self {
        Self { completion, directory, settings }
    }

    pub async fn classify(&self, request: &TurnRequest) -> IntentResult {
        let turn_count = user_turns(&request.context);
        if is_vague(&request.message, turn_count) {
            debug!("[intent] vague message on turn {}, routing to advisory", turn_count);
            return IntentResult {
                category: keyword_category(&request.message),
                needs_agency: false,
                suggested_agencies: Vec::new(),
                response_type: ResponseType::Advisory,
                reasoning: "vague request; ask for more detail first".to_string(),
            };
        }

        let completion_request = CompletionRequest::new(prompts::intent(request), self.settings);
        let reply = match self.completion.try_complete(&completion_request).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("[intent] classification call failed: {}", e);
                return IntentResult::fallback();
            }
        };
        let value = match recover(&reply) {
            Ok(recovered) => recovered.value,
            Err(e) => {
                warn!("[intent] unparseable classification ({}): {:.120}", e, reply);
                return IntentResult::fallback();
            }
        };

        let mut result = parse_intent(&value);
        if result.category.is_none() {
            result.category = keyword_category(&request.message);
        }
        if let KeywordRoute::Decided(response_type) = keyword_route(&request.message) {
            if response_type != result.response_type {
                debug!("[intent] keyword route {:?} overrides model {:?}", response_type, result.response_type);
            }
            result.response_type = response_type;
            if response_type == ResponseType::AgencyHandoff {
                result.needs_agency = true;
            }
        }
        self.complete_suggestions(&mut result, &request.country);
        result
    }

    fn complete_suggestions(&self, result: &mut IntentResult, country: &str) {
        result.suggested_agencies.truncate(MAX_SUGGESTED_AGENCIES);
        if !result.needs_agency || result.suggested_agencies.len() >= MIN_SUGGESTED_AGENCIES {
            return;
        }
        let Some(category) = result.category else { return };
        for agency in self.directory.lookup(country, category) {
            if result.suggested_agencies.len() >= MAX_SUGGESTED_AGENCIES {
                break;
            }
            if !result.suggested_agencies.contains(agency) {
                result.suggested_agencies.push(agency.clone());
            }
        }
    }
}

fn parse_intent(value: &Value) -> IntentResult {
    let category = value.get("category").and_then(Value::as_str).and_then(Category::parse);
    let needs_agency = match value.get("needs_agency") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    };
    let suggested_agencies = value
        .get("suggested_agencies")
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
        .unwrap_or_default();
    let response_type = value
        .get("response_type")
        .and_then(Value::as_str)
        .map(ResponseType::parse_lenient)
        .unwrap_or(ResponseType::Advisory);
    let reasoning = value
        .get("reasoning")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    IntentResult { category, needs_agency, suggested_agencies, response_type, reasoning }
}

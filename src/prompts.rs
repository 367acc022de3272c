//! Instruction templates sent to the completion service.

use crate::conversations::types::{render_transcript, Category, Message, ResponseType, TurnRequest};
use crate::forms::types::FormField;
use crate::retrieval::{RetrievalKind, RetrievalRecord};

const CATEGORY_GUIDE: &str = "\
- housing: housing, accommodation, real estate, construction
- land: land use, property, planning, permits, development
- immigration: passports, visas, citizenship, residence permits
- employment: work, jobs, labour law, contracts, work permits
- transport: driving licences, vehicle registration, public transport
- environment: environmental protection, waste management, pollution
- business: business registration, taxes, investment, trade
- education: schools, universities, training, courses";

fn history_block(context: &[Message]) -> String {
    if context.is_empty() {
        "(no earlier messages)".to_string()
    } else {
        render_transcript(context)
    }
}

pub fn intent(request: &TurnRequest) -> String {
    format!(
        r#"You analyse messages sent to a government services assistant and decide how to route them.

Decide:
1. Which service category the user needs, if any.
2. Whether they need specialised help from a government agency.
3. Two or three relevant government agencies in their country.
4. Whether they want documents/policies (ragLink), forms (ragForm), an agency (agency) or general advice (general).

Routing rules:
- "policies", "documents", "regulations", "laws", "guidelines", "requirements", "show me", "what are the" -> ragLink
- "form", "application", "appeal", "submit", "fill out", "download", "apply for", "petition" -> ragForm
- Needs an agency but no documents or forms -> agency
- Vague requests ("I need help", "what should I do?", "I have a problem") -> general, even if a category is visible

Categories:
{categories}

Conversation so far:
{history}

Reply with ONLY a JSON object:
{{"category": "<category or null>", "needs_agency": true/false, "suggested_agencies": ["Agency 1", "Agency 2"], "response_type": "ragLink|ragForm|agency|general", "reasoning": "<one sentence>"}}

User message: {message}
Country: {country}
Language: {language}"#,
        categories = CATEGORY_GUIDE,
        history = history_block(&request.context),
        message = request.message,
        country = request.country,
        language = request.language,
    )
}

pub fn clarification(message: &str, context: &[Message], proposed: ResponseType) -> String {
    let target = match proposed {
        ResponseType::FormLookup => "forms",
        _ => "documents",
    };
    format!(
        "Conversation:\n{history}\nUser: {message}\n\n\
Given this conversation, do we have enough specific detail to usefully recommend {target}? \
Answer with exactly one word: YES or NO.",
        history = history_block(context),
    )
}

fn agency_context(request: &TurnRequest) -> String {
    match &request.selected_agency {
        Some(agency) => format!(" You are speaking on behalf of {agency}, which the user has already chosen."),
        None => String::new(),
    }
}

pub fn advisory(request: &TurnRequest, clarify: bool) -> String {
    let focus = if clarify {
        "The request is still too vague to act on. Briefly acknowledge it, then ask 1-2 specific questions \
that would let you recommend the right documents, forms or agency."
    } else {
        "Give an informative, factual answer as a government representative, specific to the country where relevant."
    };
    format!(
        "You are a government agency advisor from {country}, responding in {language}.{agency} \
You advise people on relevant policies, laws, actions to take and the applications or appeals they can file.\n\n\
Be proactive: dig into the user's real situation (timeline, location, documents they hold, what they have tried).\n\
{focus}\n\
End your response with 1-2 specific follow-up questions.\n\n\
Conversation so far:\n{history}\n\nUser: {message}\nAssistant:",
        country = request.country,
        language = request.language,
        agency = agency_context(request),
        history = history_block(&request.context),
        message = request.message,
    )
}

pub fn agency(request: &TurnRequest, category: Option<Category>, agencies: &[String]) -> String {
    let category_name = category.map(|c| c.as_str()).unwrap_or("government");
    let listing = agencies
        .iter()
        .map(|a| format!("- {a}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        r#"You are a government agency advisor from {country}, responding in {language}.
The user needs specialised help from a {category_name} agency in {country}.

Respond by:
1) giving a helpful general answer,
2) asking 1-2 probing questions about their timeline, documents or circumstances,
3) proposing the single most relevant agency below,
4) ending with: "Would you like me to connect you to <agency> for specialised assistance?"

Available {category_name} agencies in {country}:
{listing}

Conversation so far:
{history}

User: {message}

Reply with ONLY a JSON object:
{{"response": "<full response text>", "suggested_agency": "<agency>", "available_agencies": ["..."], "follow_up_questions": ["..."]}}"#,
        country = request.country,
        language = request.language,
        history = history_block(&request.context),
        message = request.message,
    )
}

pub fn narration(request: &TurnRequest, kind: RetrievalKind, records: &[RetrievalRecord]) -> String {
    let document_type = match kind {
        RetrievalKind::Documents => "policy documents",
        RetrievalKind::Forms => "government forms",
    };
    let listing = records
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let snippet: String = r.content.chars().take(400).collect();
            format!("{}. {}\n   {}\n   {}", i + 1, r.title, r.url, snippet)
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "You are a government services advisor{agency}. Explain briefly why the {document_type} below match the user's request.\n\
- Quote or reference specific content when a match is clear.\n\
- If none clearly fits, ask 1-2 specific follow-up questions.\n\
- Keep it under 150 words and respond in {language}.\n\n\
User request: {message}\n\nRetrieved {document_type}:\n{listing}",
        agency = request
            .selected_agency
            .as_ref()
            .map(|a| format!(" speaking for {a}"))
            .unwrap_or_default(),
        language = request.language,
        message = request.message,
    )
}

pub fn extraction(raw_text: &str) -> String {
    format!(
        r#"You are an expert at analysing government forms (mostly Vietnamese) and extracting their fields.

The text below comes from OCR. Find every field a person must fill in: blanks marked with dots, underscores,
brackets or a trailing colon; dates (ngày/tháng/năm); addresses; personal details; signatures; checkboxes.

Rules:
1. One object per field. Never combine fields. Each field appears only once.
2. name: lowercase snake_case without diacritics (e.g. "ho_va_ten").
3. type: one of text, date, checkbox, signature, tel, email.
4. label: the original text with diacritics.
5. required: true for essential fields.
6. description: a short explanation.
7. confidence: 0-100, how sure you are this is a real field.

Reply with ONLY JSON:
{{"fields": [{{"name": "ho_va_ten", "type": "text", "label": "Họ và tên", "required": true, "description": "Tên đầy đủ của người nộp đơn", "confidence": 95}}]}}

Form text:
{raw_text}"#
    )
}

pub fn fill(fields: &[FormField], history: &[Message], profile_block: Option<&str>) -> String {
    let schema = fields
        .iter()
        .map(|f| {
            let label = if f.label.is_empty() { &f.name } else { &f.label };
            format!("- {} ({}): {}", f.name, field_type_name(f), label)
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        r#"You help people fill government forms.

1. Read the user profile and the chat history for personal information.
2. Map it onto the form fields by name. Profile data is more reliable than chat.
3. For every field give the value found, or the literal ASK_USER when unsure.
4. Reply with ONLY JSON: {{"fields": [{{"name": "<field name>", "value": "<value or ASK_USER>"}}]}}

User profile:
{profile}

Chat history:
{history}

Form fields:
{schema}"#,
        profile = profile_block.unwrap_or("(none)"),
        history = history_block(history),
    )
}

fn field_type_name(field: &FormField) -> String {
    serde_json::to_value(field.field_type)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| "text".to_string())
}

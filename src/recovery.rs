//! Best-effort recovery of JSON objects from model output.
//!
//! Models wrap JSON in code fences, chat before and after it, and get cut
//! off mid-array when they hit the token limit. [`recover`] walks a cascade
//! of strategies, cheapest first, and reports which one succeeded.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::errors::ParseError;

static LEADING_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^```[a-zA-Z]*\s*").expect("valid regex"));
static TRAILING_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*```\s*$").expect("valid regex"));
static OBJECT_SPAN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{.*\}").expect("valid regex"));
static FIELDS_SPAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?s)"fields"\s*:\s*\[.*"#).expect("valid regex"));
static TRAILING_PARTIAL_OBJECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s),\s*\{[^}]*$").expect("valid regex"));
static CONTROL_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\x00-\x1F\x7F]").expect("valid regex"));

/// Which step of the cascade produced the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStrategy {
    Direct,
    BalancedObject,
    FieldsSpan,
    TruncatedFieldsSpan,
}

impl RecoveryStrategy {
    const COUNT: usize = 4;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Recovered {
    pub value: Value,
    pub strategy: RecoveryStrategy,
}

/// Recover the first JSON object the cascade can parse out of `raw`.
///
/// Only objects count: a bare string or number is not a useful answer to
/// any prompt we send. Schema validation is left to the caller.
pub fn recover(raw: &str) -> Result<Recovered, ParseError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ParseError::Empty);
    }

    let unfenced = strip_fences(trimmed);
    if let Some(value) = parse_object(&unfenced) {
        return Ok(Recovered { value, strategy: RecoveryStrategy::Direct });
    }

    if let Some(span) = OBJECT_SPAN.find(&unfenced) {
        let cleaned = CONTROL_CHARS.replace_all(span.as_str(), "");
        if let Some(value) = parse_object(&cleaned) {
            debug!("recovered JSON from embedded object span");
            return Ok(Recovered { value, strategy: RecoveryStrategy::BalancedObject });
        }
    }

    if let Some(span) = FIELDS_SPAN.find(&unfenced) {
        let candidate = close_fields_span(span.as_str());
        if let Some(value) = parse_object(&candidate) {
            debug!("recovered JSON from a fields span");
            return Ok(Recovered { value, strategy: RecoveryStrategy::FieldsSpan });
        }

        let without_tail = TRAILING_PARTIAL_OBJECT.replace(span.as_str(), "");
        let candidate = close_fields_span(&without_tail);
        if let Some(value) = parse_object(&candidate) {
            debug!("recovered JSON after dropping a truncated field");
            return Ok(Recovered { value, strategy: RecoveryStrategy::TruncatedFieldsSpan });
        }
    }

    Err(ParseError::Exhausted { strategies: RecoveryStrategy::COUNT })
}

fn strip_fences(text: &str) -> String {
    let without_lead = LEADING_FENCE.replace(text, "");
    TRAILING_FENCE.replace(&without_lead, "").trim().to_string()
}

fn parse_object(text: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(text) {
        Ok(value) if value.is_object() => Some(value),
        _ => None,
    }
}

/// Turn `"fields": [ ...` into a parseable object: terminate a dangling
/// string, close the array and wrap the whole thing in braces.
fn close_fields_span(span: &str) -> String {
    let mut body = CONTROL_CHARS.replace_all(span.trim_end(), "").into_owned();
    if unescaped_quotes(&body) % 2 == 1 {
        body.push('"');
    }
    let body = body.trim_end().trim_end_matches(',').to_string();

    let mut closed = body;
    if !closed.trim_end().ends_with(']') {
        closed.push(']');
    }
    format!("{{{}}}", closed)
}

fn unescaped_quotes(text: &str) -> usize {
    let mut count = 0;
    let mut escaped = false;
    for ch in text.chars() {
        match ch {
            '\\' if !escaped => escaped = true,
            '"' if !escaped => count += 1,
            _ => escaped = false,
        }
        if ch != '\\' {
            escaped = false;
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn clean_json_uses_the_direct_strategy() {
        let recovered = recover(r#"{"response_type": "ragLink"}"#).unwrap();
        assert_eq!(recovered.strategy, RecoveryStrategy::Direct);
        assert_eq!(recovered.value, json!({"response_type": "ragLink"}));
    }

    #[test]
    fn fenced_json_is_still_direct() {
        let raw = "```json\n{\"a\": 1}\n```";
        let recovered = recover(raw).unwrap();
        assert_eq!(recovered.strategy, RecoveryStrategy::Direct);
        assert_eq!(recovered.value["a"], 1);
    }

    #[test]
    fn chatty_output_falls_back_to_object_span() {
        let raw = "Sure! Here is the classification:\n{\"category\": \"housing\"}\nHope this helps.";
        let recovered = recover(raw).unwrap();
        assert_eq!(recovered.strategy, RecoveryStrategy::BalancedObject);
        assert_eq!(recovered.value["category"], "housing");
    }

    #[test]
    fn truncated_field_array_keeps_the_complete_fields() {
        let raw = r#"{"fields": [{"name":"a","value":"1"},{"name":"b""#;
        let recovered = recover(raw).unwrap();
        assert_eq!(recovered.strategy, RecoveryStrategy::TruncatedFieldsSpan);
        let fields = recovered.value["fields"].as_array().unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0]["name"], "a");
    }

    #[test]
    fn array_missing_only_its_bracket_is_closed() {
        let raw = r#"Result: {"fields": [{"name": "ho_ten", "type": "text"}"#;
        let recovered = recover(raw).unwrap();
        assert_eq!(recovered.strategy, RecoveryStrategy::FieldsSpan);
        assert_eq!(recovered.value["fields"][0]["name"], "ho_ten");
    }

    #[test]
    fn control_characters_inside_strings_are_stripped() {
        let raw = "prefix {\"label\": \"Họ\tvà tên\"} suffix";
        let recovered = recover(raw).unwrap();
        assert_eq!(recovered.value["label"], "Họvà tên");
    }

    #[test]
    fn hopeless_input_exhausts_every_strategy() {
        assert_eq!(recover("no json here"), Err(ParseError::Exhausted { strategies: 4 }));
        assert_eq!(recover("   "), Err(ParseError::Empty));
    }

    #[test]
    fn escaped_quotes_do_not_count_as_terminators() {
        assert_eq!(unescaped_quotes(r#""a \"quoted\" b"#), 1);
    }
}

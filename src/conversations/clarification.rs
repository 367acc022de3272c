//! Decides whether a turn has enough detail to act on.

use std::sync::Arc;
use tracing::{debug, warn};

use super::types::{Message, ResponseType};
use crate::config::CompletionSettings;
use crate::llm::{CompletionInterface, CompletionRequest};
use crate::prompts;

const HELP_PHRASES: &[&str] = &[
    "help",
    "i have a problem",
    "what should i do",
    "what can i do",
    "giúp",
    "hỗ trợ",
    "tôi có vấn đề",
    "tôi nên làm gì",
];

const AFFIRMATIVE: &[&str] = &["yes", "y", "có", "co", "true", "đúng", "rồi"];
const NEGATIVE: &[&str] = &["no", "n", "không", "khong", "false", "chưa"];

pub fn token_count(message: &str) -> usize {
    message.split_whitespace().count()
}

/// Phrase occurs as whole words: "help" matches "help me" but not
/// "helpful" or "unhelpful".
fn contains_phrase(lowered: &str, phrase: &str) -> bool {
    lowered.match_indices(phrase).any(|(start, matched)| {
        let before = lowered[..start].chars().next_back();
        let after = lowered[start + matched.len()..].chars().next();
        before.map_or(true, |c| !c.is_alphanumeric()) && after.map_or(true, |c| !c.is_alphanumeric())
    })
}

/// Contains a generic help-seeking phrase.
pub fn is_help_seeking(message: &str) -> bool {
    let lowered = message.to_lowercase();
    HELP_PHRASES.iter().any(|p| contains_phrase(&lowered, p))
}

/// An opening message that is short or just asks for help.
pub fn forces_clarification(message: &str, turn_count: usize) -> bool {
    turn_count == 0 && (token_count(message) <= 3 || is_help_seeking(message))
}

pub struct ClarificationGate {
    completion: Arc<dyn CompletionInterface>,
    settings: CompletionSettings,
}

impl ClarificationGate {
    pub fn new(completion: Arc<dyn CompletionInterface>, settings: CompletionSettings) -> Self {
        Self { completion, settings }
    }

    /// `true` when the router may act on `proposed` now, `false` to spend
    /// this turn asking a clarifying question.
    pub async fn should_act(
        &self,
        message: &str,
        context: &[Message],
        proposed: ResponseType,
        turn_count: usize,
        max_turns: usize,
    ) -> bool {
        if forces_clarification(message, turn_count) {
            debug!("[gate] opening message too vague, clarifying");
            return false;
        }
        if turn_count >= max_turns {
            debug!("[gate] turn {} reached the cap of {}, acting", turn_count, max_turns);
            return true;
        }

        let request = CompletionRequest::new(prompts::clarification(message, context, proposed), self.settings);
        let verdict = match self.completion.try_complete(&request).await {
            Ok(reply) => parse_verdict(&reply),
            Err(e) => {
                warn!("[gate] sufficiency check failed: {}", e);
                None
            }
        };

        verdict.unwrap_or_else(|| {
            let fallback = proposed.is_lookup() && turn_count >= 2;
            warn!("[gate] no usable verdict, defaulting to {}", fallback);
            fallback
        })
    }
}

/// First word of the reply as yes/no, Vietnamese included.
fn parse_verdict(reply: &str) -> Option<bool> {
    let lowered = reply.trim().to_lowercase();
    let word: String = lowered
        .split(|c: char| c.is_whitespace() || c.is_ascii_punctuation())
        .find(|w| !w.is_empty())?
        .to_string();
    if AFFIRMATIVE.contains(&word.as_str()) {
        Some(true)
    } else if NEGATIVE.contains(&word.as_str()) {
        Some(false)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CompletionError;
    use crate::testing::ScriptedCompletion;

    fn gate(script: Vec<Result<String, CompletionError>>) -> (ClarificationGate, Arc<ScriptedCompletion>) {
        let completion = ScriptedCompletion::new(script);
        (ClarificationGate::new(completion.clone(), CompletionSettings::new(0.0, 10)), completion)
    }

    #[tokio::test]
    async fn short_vague_opening_forces_clarification() {
        let (gate, completion) = gate(vec![]);
        assert!(!gate.should_act("help", &[], ResponseType::DocumentLookup, 0, 5).await);
        assert_eq!(completion.call_count(), 0);
    }

    #[tokio::test]
    async fn turn_cap_forces_action() {
        let (gate, completion) = gate(vec![]);
        let context = vec![Message::user("đất"), Message::assistant("Bạn cần gì?")];
        assert!(gate.should_act("whatever you think", &context, ResponseType::FormLookup, 5, 5).await);
        assert_eq!(completion.call_count(), 0);
    }

    #[tokio::test]
    async fn model_verdict_decides_in_between() {
        let (gate, _) = gate(vec![Ok("YES.".into()), Ok("Không".into())]);
        let message = "I want the land use right certificate regulations for Hanoi";
        assert!(gate.should_act(message, &[], ResponseType::DocumentLookup, 1, 5).await);
        assert!(!gate.should_act(message, &[], ResponseType::DocumentLookup, 1, 5).await);
    }

    #[tokio::test]
    async fn failure_defaults_depend_on_type_and_turn() {
        let (gate, _) = gate(vec![
            Err(CompletionError::Exhausted),
            Err(CompletionError::Exhausted),
            Ok("maybe".into()),
        ]);
        let message = "the housing subsidy regulations please";
        assert!(gate.should_act(message, &[], ResponseType::FormLookup, 2, 5).await);
        assert!(!gate.should_act(message, &[], ResponseType::DocumentLookup, 1, 5).await);
        assert!(!gate.should_act(message, &[], ResponseType::Advisory, 3, 5).await);
    }

    #[test]
    fn help_phrases_match_whole_words_only() {
        assert!(is_help_seeking("Help!"));
        assert!(is_help_seeking("can you help me"));
        assert!(is_help_seeking("Tôi cần hỗ trợ về thuế"));
        assert!(!is_help_seeking("the helpline number for tax questions"));
        assert!(!is_help_seeking("that answer was helpful"));
        assert!(!is_help_seeking("the clerk was unhelpful"));

        assert!(!forces_clarification("the clerk at the ward office was unhelpful about my permit", 0));
    }

    #[test]
    fn verdict_parsing() {
        assert_eq!(parse_verdict("Yes, there is enough detail"), Some(true));
        assert_eq!(parse_verdict("có"), Some(true));
        assert_eq!(parse_verdict("NO"), Some(false));
        assert_eq!(parse_verdict("I think so"), None);
        assert_eq!(parse_verdict(""), None);
    }
}

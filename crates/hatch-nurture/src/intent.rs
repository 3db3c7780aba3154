//! Heuristic intent inference over the latest user message.
//!
//! Case-insensitive substring matching; at most one rule fires per turn.
//! Pure and synchronous so it can be exercised without a backend.

use crate::types::{ConversationState, FormatState, OutputFormat};

/// What the engine should do after a completed turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentDecision {
    /// Nothing changes.
    None,
    /// Ask the user which format they want.
    MarkPending,
    /// The user named a format.
    ChooseFormat(OutputFormat),
    /// The user confirmed; generate the document now.
    Generate(OutputFormat),
}

/// Format keywords in priority order. The first match wins.
const FORMAT_KEYWORDS: &[(&str, OutputFormat)] = &[
    ("checklist", OutputFormat::Checklist),
    ("guide", OutputFormat::Guide),
    ("prd", OutputFormat::Prd),
    ("product requirements", OutputFormat::Prd),
];

const AFFIRMATIVE_TOKENS: &[&str] = &["yes", "generate", "create"];

/// Decide the follow-up action for a completed turn.
///
/// `completed_exchanges` counts successful turns including this one.
pub fn infer_intent(
    state: &ConversationState,
    latest_user_text: &str,
    completed_exchanges: usize,
) -> IntentDecision {
    match state.format() {
        FormatState::Unset if completed_exchanges == 1 => IntentDecision::MarkPending,
        FormatState::Unset => IntentDecision::None,
        FormatState::Pending => match detect_format(latest_user_text) {
            Some(format) => IntentDecision::ChooseFormat(format),
            None => IntentDecision::None,
        },
        FormatState::Chosen(format) => {
            if state.generated().is_none() && is_affirmative(latest_user_text) {
                IntentDecision::Generate(format)
            } else {
                IntentDecision::None
            }
        }
    }
}

pub fn detect_format(text: &str) -> Option<OutputFormat> {
    let lower = text.to_lowercase();
    FORMAT_KEYWORDS
        .iter()
        .find(|(keyword, _)| lower.contains(keyword))
        .map(|(_, format)| *format)
}

pub fn is_affirmative(text: &str) -> bool {
    let lower = text.to_lowercase();
    AFFIRMATIVE_TOKENS.iter().any(|token| lower.contains(token))
}

//! Conversation state for one nurtured idea.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};

use crate::error::NurtureError;

/// Document formats the engine can generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Checklist,
    Guide,
    Prd,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Checklist => "checklist",
            OutputFormat::Guide => "guide",
            OutputFormat::Prd => "prd",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = NurtureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "checklist" => Ok(OutputFormat::Checklist),
            "guide" => Ok(OutputFormat::Guide),
            "prd" => Ok(OutputFormat::Prd),
            other => Err(NurtureError::InvalidInput(format!(
                "unknown output format: {}",
                other
            ))),
        }
    }
}

/// Progress towards a chosen output format.
///
/// Only moves forward: `Unset -> Pending -> Chosen(_)`. Once chosen the
/// format is fixed for the life of the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatState {
    #[default]
    Unset,
    Pending,
    Chosen(OutputFormat),
}

impl FormatState {
    fn rank(self) -> u8 {
        match self {
            FormatState::Unset => 0,
            FormatState::Pending => 1,
            FormatState::Chosen(_) => 2,
        }
    }

    /// Whether moving to `next` respects the forward-only ordering.
    pub fn can_advance_to(self, next: FormatState) -> bool {
        next.rank() == self.rank() + 1
    }

    pub fn chosen(self) -> Option<OutputFormat> {
        match self {
            FormatState::Chosen(format) => Some(format),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FormatState::Unset => "unset",
            FormatState::Pending => "pending",
            FormatState::Chosen(format) => format.as_str(),
        }
    }
}

impl Serialize for FormatState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message in the transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

/// A generated markdown document and the format it was generated in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedDocument {
    pub format: OutputFormat,
    pub markdown: String,
}

/// Per-idea, per-session conversation.
///
/// Turns are only ever appended. The engine is the only writer; everything
/// else reads through the accessors or a [`ConversationSnapshot`].
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    turns: Vec<ConversationTurn>,
    format: FormatState,
    generated: Option<GeneratedDocument>,
    completed_exchanges: usize,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn format(&self) -> FormatState {
        self.format
    }

    pub fn generated(&self) -> Option<&GeneratedDocument> {
        self.generated.as_ref()
    }

    pub fn generated_output(&self) -> Option<&str> {
        self.generated.as_ref().map(|d| d.markdown.as_str())
    }

    /// Turns that completed successfully (user message plus full reply).
    pub fn completed_exchanges(&self) -> usize {
        self.completed_exchanges
    }

    /// User messages before the latest one, in order, joined by single
    /// spaces. The latest message is the one being answered.
    pub fn prior_user_context(&self) -> String {
        let mut messages: Vec<&str> = self
            .turns
            .iter()
            .filter(|t| t.role == Role::User)
            .map(|t| t.content.as_str())
            .collect();
        messages.pop();
        messages.join(" ")
    }

    pub fn snapshot(&self) -> ConversationSnapshot {
        ConversationSnapshot {
            turns: self.turns.clone(),
            output_format: self.format,
            generated_output: self.generated_output().map(str::to_string),
        }
    }

    pub(crate) fn push_user(&mut self, content: String) {
        self.turns.push(ConversationTurn {
            role: Role::User,
            content,
        });
    }

    pub(crate) fn push_assistant(&mut self, turn: ConversationTurn) {
        debug_assert_eq!(turn.role, Role::Assistant);
        self.turns.push(turn);
    }

    pub(crate) fn record_exchange(&mut self) {
        self.completed_exchanges += 1;
    }

    /// Advance the format. Returns `false` (and changes nothing) for a
    /// backwards or skipping move.
    pub(crate) fn advance_format(&mut self, next: FormatState) -> bool {
        if !self.format.can_advance_to(next) {
            return false;
        }
        self.format = next;
        true
    }

    /// Store a generated document. Only accepted once a format is chosen and
    /// no document exists yet, and only for that format.
    pub(crate) fn store_document(&mut self, document: GeneratedDocument) -> bool {
        if self.generated.is_some() || self.format.chosen() != Some(document.format) {
            return false;
        }
        if document.markdown.is_empty() {
            return false;
        }
        self.generated = Some(document);
        true
    }
}

/// Serializable view of a conversation for the HTTP layer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSnapshot {
    pub turns: Vec<ConversationTurn>,
    pub output_format: FormatState,
    pub generated_output: Option<String>,
}

/// Accumulates the in-flight assistant reply.
///
/// Owned by the running turn, never shared with the relay; frozen into a
/// [`ConversationTurn`] when the turn completes, fails, or is dropped.
#[derive(Debug, Default)]
pub struct AssistantTurnBuilder {
    text: String,
}

impl AssistantTurnBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fragment: &str) {
        self.text.push_str(fragment);
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn freeze(self) -> ConversationTurn {
        ConversationTurn {
            role: Role::Assistant,
            content: self.text,
        }
    }
}

//! Conversation Engine for nurturing an idea into a document.
//!
//! Owns the multi-turn exchange for a single idea, infers the requested
//! output format from free text, and generates the final markdown document
//! once the user asks for it.

pub mod engine;
pub mod error;
pub mod intent;
pub mod prompts;
pub mod types;

pub use engine::{export_file_name, ConversationEngine, ExportedDocument, Turn, TurnOutcome};
pub use error::NurtureError;
pub use intent::{infer_intent, IntentDecision};
pub use types::{
    AssistantTurnBuilder, ConversationSnapshot, ConversationState, ConversationTurn, FormatState,
    GeneratedDocument, OutputFormat, Role,
};

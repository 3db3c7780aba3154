//! Prompt templates for nurturing and document generation.

use crate::types::OutputFormat;

/// System preamble for a nurturing turn about `idea_text`.
pub fn system_preamble(idea_text: &str) -> String {
    format!(
        "You are an AI assistant helping users develop their ideas. \
         The user has the following idea: \"{}\". \
         Your goal is to help them refine this idea, ask relevant questions, and provide guidance. \
         Be concise, helpful, and focus on practical next steps.",
        idea_text
    )
}

/// One-shot prompt for generating a document in `format`.
///
/// `context` is appended only when non-empty.
pub fn document_prompt(idea_text: &str, format: OutputFormat, context: &str) -> String {
    let mut prompt = format!(
        "Generate a detailed {} for the following idea: \"{}\". ",
        format, idea_text
    );

    let context = context.trim();
    if !context.is_empty() {
        prompt.push_str(&format!("Additional context from the user: {}. ", context));
    }

    prompt.push_str(match format {
        OutputFormat::Checklist => {
            "Format as a markdown checklist with main categories and specific tasks under each."
        }
        OutputFormat::Guide => "Format as a markdown guide with introduction, steps, and conclusion.",
        OutputFormat::Prd => {
            "Format as a markdown PRD with problem statement, target audience, solution overview, features, and success metrics."
        }
    });
    prompt
}

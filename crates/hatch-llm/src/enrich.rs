//! Automatic tagging and categorisation of captured ideas.
//!
//! Both helpers are best-effort: a backend failure never blocks capture,
//! it only leaves the idea untagged or uncategorised.

use tracing::warn;

use crate::backend::{CompletionRequest, TextGenerator};

pub const MAX_TAGS: usize = 5;
pub const UNCATEGORIZED: &str = "Uncategorized";
const MAX_CATEGORY_CHARS: usize = 40;

/// Ask the backend for 3-5 short tags describing `idea`.
pub async fn generate_tags(backend: &dyn TextGenerator, idea: &str) -> Vec<String> {
    let prompt = format!(
        "Generate 3-5 relevant tags for the following idea. Return only the tags as a JSON array of strings: \"{}\"",
        idea
    );
    match backend.complete(CompletionRequest::new(prompt, 0.7, 100)).await {
        Ok(raw) => parse_tags(&raw),
        Err(e) => {
            warn!(error = %e, "Tag generation failed");
            Vec::new()
        }
    }
}

/// Ask the backend for a single general category for `idea`.
pub async fn generate_category(backend: &dyn TextGenerator, idea: &str) -> String {
    let prompt = format!(
        "Categorize the following idea into a single general category (like \"Health\", \"Technology\", \"Education\", etc.). Return only the category name: \"{}\"",
        idea
    );
    match backend.complete(CompletionRequest::new(prompt, 0.3, 20)).await {
        Ok(raw) => parse_category(&raw),
        Err(e) => {
            warn!(error = %e, "Category generation failed");
            UNCATEGORIZED.to_string()
        }
    }
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop an optional language tag on the opening fence.
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    rest.trim_end().trim_end_matches("```").trim()
}

fn parse_tags(raw: &str) -> Vec<String> {
    let body = strip_code_fence(raw);
    let parsed: Vec<String> = match serde_json::from_str::<Vec<String>>(body) {
        Ok(tags) => tags,
        Err(e) => {
            warn!(error = %e, "Tag response was not a JSON string array");
            return Vec::new();
        }
    };

    let mut tags: Vec<String> = Vec::with_capacity(MAX_TAGS);
    for tag in parsed {
        let tag = tag.trim();
        if tag.is_empty() || tags.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
            continue;
        }
        tags.push(tag.to_string());
        if tags.len() == MAX_TAGS {
            break;
        }
    }
    tags
}

fn parse_category(raw: &str) -> String {
    let line = strip_code_fence(raw).lines().next().unwrap_or("");
    let category = line.trim().trim_matches(|c| c == '"' || c == '.' || c == '*').trim();
    if category.is_empty() {
        return UNCATEGORIZED.to_string();
    }
    category.chars().take(MAX_CATEGORY_CHARS).collect()
}

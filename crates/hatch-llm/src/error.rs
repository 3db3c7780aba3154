//! Error types for language-model backends.

use std::time::Duration;

use hatch_core::error::HatchError;

/// Errors from text-generation and transcription backends.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("backend misconfigured: {0}")]
    Config(String),
    #[error("request failed: {0}")]
    Request(String),
    #[error("backend returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed backend response: {0}")]
    Decode(String),
    #[error("backend reported an error: {0}")]
    Backend(String),
    #[error("no data from backend within {0:?}")]
    Timeout(Duration),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            LlmError::Decode(err.to_string())
        } else {
            LlmError::Request(err.to_string())
        }
    }
}

impl From<LlmError> for HatchError {
    fn from(err: LlmError) -> Self {
        HatchError::Upstream(err.to_string())
    }
}

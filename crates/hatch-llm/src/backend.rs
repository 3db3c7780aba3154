//! Backend traits for text generation and speech-to-text.
//!
//! Implementations are constructed once at startup and shared as
//! `Arc<dyn TextGenerator>` / `Arc<dyn Transcriber>`.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::Serialize;

use crate::error::LlmError;

/// A lazily-consumed sequence of text fragments from a streamed completion.
///
/// Fragment boundaries are arbitrary; only the concatenation is meaningful.
/// The sequence ends after its first `Err`.
pub type FragmentStream = BoxStream<'static, Result<String, LlmError>>;

/// Request for an incremental (streamed) completion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamRequest {
    pub system: String,
    pub prompt: String,
}

/// Request for a one-shot completion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>, temperature: f32, max_tokens: u32) -> Self {
        Self {
            prompt: prompt.into(),
            temperature,
            max_tokens,
        }
    }
}

/// Hosted text-generation backend.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Open one incremental completion and return its fragments.
    async fn stream(&self, request: StreamRequest) -> Result<FragmentStream, LlmError>;

    /// Run a one-shot completion and return the full text.
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError>;
}

/// Hosted speech-to-text backend.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: Vec<u8>, mime_type: &str) -> Result<String, LlmError>;
}

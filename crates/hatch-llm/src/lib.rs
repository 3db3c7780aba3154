//! Hosted language-model access for Hatch.
//!
//! Defines the backend traits the rest of the workspace depends on, an
//! OpenAI-compatible HTTP client, the server-sent-events decoder used for
//! streamed completions, the streaming relay that forwards fragments to a
//! consumer as they arrive, and the tag/category enrichment helpers.

pub mod backend;
pub mod enrich;
pub mod error;
pub mod mock;
pub mod openai;
pub mod relay;
pub mod sse;

pub use backend::{CompletionRequest, FragmentStream, StreamRequest, TextGenerator, Transcriber};
pub use error::LlmError;
pub use mock::{MockGenerator, MockTranscriber, StreamScript};
pub use openai::OpenAiClient;
pub use relay::{Fragments, Relay};
pub use sse::SseDecoder;

//! OpenAI-compatible HTTP backend.
//!
//! Talks to `{api_base}/chat/completions` (streamed and one-shot) and
//! `{api_base}/audio/transcriptions`. One client is built at startup and
//! shared; the underlying connection pool is reused across calls.

use std::collections::VecDeque;
use std::fmt::Display;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use hatch_core::config::LlmConfig;

use crate::backend::{CompletionRequest, FragmentStream, StreamRequest, TextGenerator, Transcriber};
use crate::error::LlmError;
use crate::sse::SseDecoder;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DONE_SENTINEL: &str = "[DONE]";

// ============================================================================
// Wire types
// ============================================================================

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequestBody<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ChatResponseBody {
    choices: Vec<ResponseChoice>,
}

#[derive(Deserialize)]
struct ResponseChoice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<StreamErrorBody>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamErrorBody {
    message: String,
}

#[derive(Deserialize)]
struct TranscriptionBody {
    text: String,
}

// ============================================================================
// Client
// ============================================================================

/// Client for an OpenAI-compatible API.
pub struct OpenAiClient {
    http: reqwest::Client,
    api_base: String,
    api_key: Option<String>,
    model: String,
    transcription_model: String,
    request_timeout: Duration,
}

impl OpenAiClient {
    /// Build a client from configuration.
    ///
    /// No overall timeout is set on the pool: streamed completions may run
    /// long and are bounded per fragment by the relay instead. One-shot
    /// requests carry `request_timeout_secs` individually.
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| LlmError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
            model: config.model.clone(),
            transcription_model: config.transcription_model.clone(),
            request_timeout: Duration::from_secs(config.request_timeout_secs.max(1)),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path)
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let builder = self.http.post(self.endpoint(path));
        match self.api_key {
            Some(ref key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn checked(response: reqwest::Response) -> Result<reqwest::Response, LlmError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), "Language-model backend rejected request");
        Err(LlmError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl TextGenerator for OpenAiClient {
    async fn stream(&self, request: StreamRequest) -> Result<FragmentStream, LlmError> {
        let body = ChatRequestBody {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            stream: true,
            temperature: None,
            max_tokens: None,
        };

        let response = self
            .post("chat/completions")
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&body)
            .send()
            .await?;
        let response = Self::checked(response).await?;
        debug!(model = %self.model, "Streamed completion opened");

        Ok(decode_completion_stream(response.bytes_stream()))
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        let body = ChatRequestBody {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &request.prompt,
            }],
            stream: false,
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
        };

        let response = self
            .post("chat/completions")
            .timeout(self.request_timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| timeout_or(e, self.request_timeout))?;
        let response = Self::checked(response).await?;

        let parsed: ChatResponseBody = response
            .json()
            .await
            .map_err(|e| timeout_or(e, self.request_timeout))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::Decode("completion had no content".to_string()))
    }
}

#[async_trait]
impl Transcriber for OpenAiClient {
    async fn transcribe(&self, audio: Vec<u8>, mime_type: &str) -> Result<String, LlmError> {
        let file_name = format!("recording.{}", extension_for(mime_type));
        let part = reqwest::multipart::Part::bytes(audio)
            .file_name(file_name)
            .mime_str(mime_type)
            .map_err(|e| LlmError::Request(format!("invalid audio mime type: {}", e)))?;
        let form = reqwest::multipart::Form::new()
            .text("model", self.transcription_model.clone())
            .part("file", part);

        let response = self
            .post("audio/transcriptions")
            .timeout(self.request_timeout)
            .multipart(form)
            .send()
            .await
            .map_err(|e| timeout_or(e, self.request_timeout))?;
        let response = Self::checked(response).await?;

        let parsed: TranscriptionBody = response
            .json()
            .await
            .map_err(|e| timeout_or(e, self.request_timeout))?;
        Ok(parsed.text)
    }
}

fn timeout_or(err: reqwest::Error, limit: Duration) -> LlmError {
    if err.is_timeout() {
        LlmError::Timeout(limit)
    } else {
        err.into()
    }
}

/// File extension the transcription endpoint uses to sniff the container.
fn extension_for(mime_type: &str) -> &'static str {
    let base = mime_type.split(';').next().unwrap_or("").trim();
    match base {
        "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" => "m4a",
        "audio/ogg" => "ogg",
        "audio/flac" => "flac",
        _ => "webm",
    }
}

// ============================================================================
// Streamed completion decoding
// ============================================================================

struct DecodeState<S> {
    bytes: S,
    decoder: SseDecoder,
    pending: VecDeque<Result<String, LlmError>>,
    finished: bool,
}

/// Turn a raw SSE byte stream from `/chat/completions` into text fragments.
///
/// Fragments are yielded as soon as the event carrying them is complete.
/// A transport error or an in-band error event ends the sequence after the
/// fragments that preceded it.
pub fn decode_completion_stream<S, B, E>(bytes: S) -> FragmentStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = DecodeState {
        bytes: Box::pin(bytes),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    futures_util::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.pending.pop_front() {
                return Some((item, st));
            }
            if st.finished {
                return None;
            }

            match st.bytes.next().await {
                Some(Ok(chunk)) => {
                    let events = st.decoder.feed(chunk.as_ref());
                    st.accept(events);
                }
                Some(Err(e)) => {
                    st.pending
                        .push_back(Err(LlmError::Request(format!("stream interrupted: {}", e))));
                    st.finished = true;
                }
                None => {
                    let tail = st.decoder.finish().into_iter().collect();
                    st.accept(tail);
                    st.finished = true;
                }
            }
        }
    })
    .boxed()
}

impl<S> DecodeState<S> {
    fn accept(&mut self, events: Vec<String>) {
        for event in events {
            if self.finished {
                return;
            }
            match parse_event(&event) {
                Ok(Some(text)) if !text.is_empty() => self.pending.push_back(Ok(text)),
                Ok(Some(_)) => {}
                Ok(None) => self.finished = true,
                Err(e) => {
                    self.pending.push_back(Err(e));
                    self.finished = true;
                }
            }
        }
    }
}

/// Parse one event payload. `Ok(None)` marks the end of the stream.
fn parse_event(payload: &str) -> Result<Option<String>, LlmError> {
    let payload = payload.trim();
    if payload == DONE_SENTINEL {
        return Ok(None);
    }
    let chunk: StreamChunk = serde_json::from_str(payload)
        .map_err(|e| LlmError::Decode(format!("bad stream event: {}", e)))?;
    if let Some(err) = chunk.error {
        return Err(LlmError::Backend(err.message));
    }
    let text = chunk
        .choices
        .into_iter()
        .filter_map(|c| c.delta.content)
        .collect::<String>();
    Ok(Some(text))
}

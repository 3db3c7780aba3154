//! Scripted backends for tests and offline development.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;

use crate::backend::{CompletionRequest, FragmentStream, StreamRequest, TextGenerator, Transcriber};
use crate::error::LlmError;

const DEFAULT_REPLY: [&str; 4] = ["Happy to help. ", "What matters ", "most to ", "you?"];
const DEFAULT_COMPLETION: &str = "# Plan\n\n- [ ] First step";

/// What one call to [`TextGenerator::stream`] produces.
#[derive(Debug, Clone)]
pub struct StreamScript {
    refuse: Option<String>,
    fragments: Vec<String>,
    fail: Option<String>,
    hang: bool,
}

impl StreamScript {
    pub fn fragments<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            refuse: None,
            fragments: fragments.into_iter().map(Into::into).collect(),
            fail: None,
            hang: false,
        }
    }

    /// `stream()` itself fails before any fragment.
    pub fn refuse(message: impl Into<String>) -> Self {
        Self {
            refuse: Some(message.into()),
            ..Self::fragments(Vec::<String>::new())
        }
    }

    /// Fail mid-stream after the scripted fragments.
    pub fn then_fail(mut self, message: impl Into<String>) -> Self {
        self.fail = Some(message.into());
        self
    }

    /// Never end after the scripted fragments.
    pub fn hang_after(mut self) -> Self {
        self.hang = true;
        self
    }
}

/// In-memory [`TextGenerator`] that replays queued scripts.
///
/// With nothing queued, streams reply with a short question and completions
/// return a small markdown plan.
#[derive(Default)]
pub struct MockGenerator {
    streams: Mutex<VecDeque<StreamScript>>,
    completions: Mutex<VecDeque<Result<String, LlmError>>>,
    stream_requests: Mutex<Vec<StreamRequest>>,
    completion_requests: Mutex<Vec<CompletionRequest>>,
    open: Arc<AtomicUsize>,
    completion_delay: Option<Duration>,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every one-shot completion take `delay` before answering.
    pub fn with_completion_delay(mut self, delay: Duration) -> Self {
        self.completion_delay = Some(delay);
        self
    }

    pub fn push_stream(&self, script: StreamScript) {
        self.streams.lock().unwrap_or_else(|e| e.into_inner()).push_back(script);
    }

    pub fn push_completion(&self, result: Result<String, LlmError>) {
        self.completions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(result);
    }

    pub fn stream_requests(&self) -> Vec<StreamRequest> {
        self.stream_requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn completion_requests(&self) -> Vec<CompletionRequest> {
        self.completion_requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn stream_calls(&self) -> usize {
        self.stream_requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn completion_calls(&self) -> usize {
        self.completion_requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Streams handed out and not yet dropped.
    pub fn open_streams(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}

struct OpenGuard(Arc<AtomicUsize>);

impl Drop for OpenGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn stream(&self, request: StreamRequest) -> Result<FragmentStream, LlmError> {
        self.stream_requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request);
        let script = self
            .streams
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| StreamScript::fragments(DEFAULT_REPLY));

        if let Some(message) = script.refuse {
            return Err(LlmError::Backend(message));
        }

        self.open.fetch_add(1, Ordering::SeqCst);
        let guard = OpenGuard(Arc::clone(&self.open));

        let mut items: Vec<Result<String, LlmError>> =
            script.fragments.into_iter().map(Ok).collect();
        if let Some(message) = script.fail {
            items.push(Err(LlmError::Backend(message)));
        }
        let head = futures_util::stream::iter(items);
        let tail = if script.hang {
            futures_util::stream::pending().boxed()
        } else {
            futures_util::stream::empty().boxed()
        };

        // The guard lives as long as the stream does.
        let stream = head.chain(tail).map(move |item| {
            let _held = &guard;
            item
        });
        Ok(stream.boxed())
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        self.completion_requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request);
        if let Some(delay) = self.completion_delay {
            tokio::time::sleep(delay).await;
        }
        self.completions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| Ok(DEFAULT_COMPLETION.to_string()))
    }
}

/// [`Transcriber`] returning fixed text, or a fixed failure.
pub struct MockTranscriber {
    result: Result<String, LlmError>,
    calls: AtomicUsize,
}

impl MockTranscriber {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            result: Ok(text.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(err: LlmError) -> Self {
        Self {
            result: Err(err),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(&self, audio: Vec<u8>, _mime_type: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if audio.is_empty() {
            return Err(LlmError::Request("empty audio".to_string()));
        }
        self.result.clone()
    }
}

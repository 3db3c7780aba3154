//! Streaming relay between a text-generation backend and one consumer.
//!
//! A spawned task pulls fragments from the backend and forwards them over a
//! bounded channel, so a slow consumer applies backpressure upstream. Every
//! wait on the backend is bounded by an idle timeout. Dropping the consumer
//! side aborts the task, which drops (and so closes) the upstream request.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use hatch_core::config::LlmConfig;

use crate::backend::{StreamRequest, TextGenerator};
use crate::error::LlmError;

/// Opens streamed completions on behalf of callers.
#[derive(Clone)]
pub struct Relay {
    backend: Arc<dyn TextGenerator>,
    buffer: usize,
    idle_timeout: Duration,
}

impl Relay {
    pub fn new(backend: Arc<dyn TextGenerator>, buffer: usize, idle_timeout: Duration) -> Self {
        Self {
            backend,
            buffer: buffer.max(1),
            idle_timeout,
        }
    }

    pub fn from_config(backend: Arc<dyn TextGenerator>, config: &LlmConfig) -> Self {
        Self::new(
            backend,
            config.relay_buffer,
            Duration::from_secs(config.stream_idle_timeout_secs.max(1)),
        )
    }

    /// Shared handle to the backend, for one-shot calls.
    pub fn backend(&self) -> &Arc<dyn TextGenerator> {
        &self.backend
    }

    /// Open one streamed completion.
    ///
    /// Must be called from within a Tokio runtime. Nothing is yielded until
    /// the backend produces it; the returned sequence ends after the backend
    /// finishes or after the first error.
    pub fn relay(&self, system: impl Into<String>, prompt: impl Into<String>) -> Fragments {
        let request = StreamRequest {
            system: system.into(),
            prompt: prompt.into(),
        };
        let (tx, rx) = mpsc::channel(self.buffer);
        let backend = Arc::clone(&self.backend);
        let idle = self.idle_timeout;

        let handle = tokio::spawn(pump(backend, request, tx, idle));

        Fragments {
            rx,
            abort: handle.abort_handle(),
            finished: false,
        }
    }
}

async fn pump(
    backend: Arc<dyn TextGenerator>,
    request: StreamRequest,
    tx: mpsc::Sender<Result<String, LlmError>>,
    idle: Duration,
) {
    let mut upstream = match tokio::time::timeout(idle, backend.stream(request)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            warn!(error = %e, "Backend refused streamed completion");
            let _ = tx.send(Err(e)).await;
            return;
        }
        Err(_) => {
            warn!(timeout = ?idle, "Backend did not open stream in time");
            let _ = tx.send(Err(LlmError::Timeout(idle))).await;
            return;
        }
    };

    let mut forwarded = 0usize;
    loop {
        let item = match tokio::time::timeout(idle, upstream.next()).await {
            Ok(Some(item)) => item,
            Ok(None) => break,
            Err(_) => {
                warn!(timeout = ?idle, forwarded, "Backend stream went idle");
                Err(LlmError::Timeout(idle))
            }
        };
        let failed = item.is_err();
        if tx.send(item).await.is_err() {
            debug!(forwarded, "Relay consumer went away");
            return;
        }
        if failed {
            return;
        }
        forwarded += 1;
    }
    debug!(forwarded, "Relay finished");
}

/// Consumer side of one relayed completion.
pub struct Fragments {
    rx: mpsc::Receiver<Result<String, LlmError>>,
    abort: AbortHandle,
    finished: bool,
}

impl Fragments {
    /// Next fragment, or `None` once the sequence has ended.
    pub async fn next_fragment(&mut self) -> Option<Result<String, LlmError>> {
        self.next().await
    }

    /// Stop the upstream request. Already-buffered fragments are discarded.
    pub fn cancel(&mut self) {
        self.abort.abort();
        self.rx.close();
        self.finished = true;
    }
}

impl Stream for Fragments {
    type Item = Result<String, LlmError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(Ok(text))) => Poll::Ready(Some(Ok(text))),
            Poll::Ready(Some(Err(e))) => {
                self.finished = true;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                self.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for Fragments {
    fn drop(&mut self) {
        self.abort.abort();
    }
}

impl std::fmt::Debug for Fragments {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fragments")
            .field("finished", &self.finished)
            .finish()
    }
}

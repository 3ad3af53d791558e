//! The streaming session client.
//!
//! [`StreamingClient::run`] drives one turn: it opens the completion stream,
//! applies frames to a [`TurnSink`] in arrival order, and reports how the turn
//! ended. Cancellation is observed between frames, so nothing is applied after
//! the token fires.

use std::sync::Arc;

use futures::StreamExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::backend::CompletionBackend;
use crate::observability::{STREAM_BYTES, STREAM_DELTAS, STREAM_ERRORS};
use crate::types::{ChatRequest, StreamEvent, Usage};
use crate::{Error, Result};

/// Receives the effects of a streaming turn.
pub trait TurnSink: Send + Sync {
    /// Append a chunk of assistant text.
    ///
    /// Returns false if the turn is no longer current, which ends it as
    /// aborted.
    fn append_text(&self, delta: &str) -> bool;

    /// Record structured data frames. Same return contract as
    /// [`TurnSink::append_text`].
    fn push_data(&self, data: Vec<Value>) -> bool;
}

/// How a turn ended.
#[derive(Debug, Clone)]
pub enum TurnOutcome {
    /// The backend sent its terminal frame, or closed the stream cleanly.
    Completed {
        /// Token usage for the turn.
        usage: Usage,
        /// Why generation ended.
        finish_reason: Option<String>,
    },
    /// The request or the stream failed.
    Failed(Error),
    /// The turn was cancelled.
    Aborted,
}

/// Runs turns against a completion backend.
#[derive(Clone)]
pub struct StreamingClient {
    backend: Arc<dyn CompletionBackend>,
}

impl StreamingClient {
    /// Create a client for `backend`.
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self { backend }
    }

    /// Run one turn to completion, failure, or cancellation.
    pub async fn run(
        &self,
        request: ChatRequest,
        cancel: CancellationToken,
        sink: &dyn TurnSink,
    ) -> TurnOutcome {
        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return TurnOutcome::Aborted,
            stream = self.backend.stream_chat(request) => match stream {
                Ok(stream) => stream,
                Err(err) => return TurnOutcome::Failed(err),
            },
        };

        let mut step_usage = Usage::default();
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return TurnOutcome::Aborted,
                next = stream.next() => next,
            };
            let event = match next {
                Some(Ok(event)) => event,
                Some(Err(err)) => {
                    STREAM_ERRORS.click();
                    return TurnOutcome::Failed(err);
                }
                None => {
                    return TurnOutcome::Completed {
                        usage: step_usage,
                        finish_reason: None,
                    };
                }
            };
            match apply(event, sink, &mut step_usage) {
                Ok(Some(outcome)) => return outcome,
                Ok(None) => {}
                Err(err) => {
                    STREAM_ERRORS.click();
                    return TurnOutcome::Failed(err);
                }
            }
        }
    }
}

fn apply(
    event: StreamEvent,
    sink: &dyn TurnSink,
    step_usage: &mut Usage,
) -> Result<Option<TurnOutcome>> {
    match event {
        StreamEvent::TextDelta(text) => {
            STREAM_DELTAS.click();
            STREAM_BYTES.count(text.len() as u64);
            if !sink.append_text(&text) {
                return Ok(Some(TurnOutcome::Aborted));
            }
        }
        StreamEvent::Data(values) => {
            if !sink.push_data(values) {
                return Ok(Some(TurnOutcome::Aborted));
            }
        }
        StreamEvent::Error(message) => return Err(Error::streaming(message, None)),
        StreamEvent::FinishStep { usage, .. } => {
            if let Some(usage) = usage {
                *step_usage = *step_usage + usage;
            }
        }
        StreamEvent::FinishMessage {
            finish_reason,
            usage,
        } => {
            return Ok(Some(TurnOutcome::Completed {
                usage: usage.unwrap_or(*step_usage),
                finish_reason,
            }));
        }
        StreamEvent::StartStep { message_id } => {
            tracing::trace!(component = "stream", action = "step", ?message_id);
        }
        StreamEvent::MessageAnnotations(_) | StreamEvent::Other { .. } => {}
    }
    Ok(None)
}

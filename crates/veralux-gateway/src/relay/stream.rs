//! Upstream-to-client streaming with cancellation
//!
//! The upstream server-sent-event body is read by a pump task that forwards
//! each text fragment, in order, over a bounded channel. The client-facing
//! [`RelayBody`] drains that channel and owns the pump's [`AbortHandle`]:
//! dropping the body before the stream finishes (the client went away)
//! aborts the pump, which drops the upstream response and closes its
//! connection.

use std::fmt::Display;
use std::io;
use std::ops::ControlFlow;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::future::{AbortHandle, Abortable};
use futures::stream::{Stream, StreamExt};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Fragments buffered between the pump and the client body
const RELAY_CHANNEL_CAPACITY: usize = 32;

/// Longest unterminated line accepted from the upstream
const MAX_PENDING_LINE_BYTES: usize = 256 * 1024;

/// A single interpreted line of the upstream event stream
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CompletionEvent {
    /// Incremental text to forward
    Delta(String),
    /// Upstream signalled completion
    Done,
    /// Upstream reported an error in-band
    Failed(String),
    /// Comments, keep-alives, role-only deltas and other non-text events
    Ignored,
}

/// Interpret one line of an OpenAI-style event stream
pub(crate) fn parse_event_line(line: &str) -> CompletionEvent {
    let Some(data) = line.strip_prefix("data:") else {
        return CompletionEvent::Ignored;
    };
    let data = data.strip_prefix(' ').unwrap_or(data).trim_end();

    if data == "[DONE]" {
        return CompletionEvent::Done;
    }

    let Ok(value) = serde_json::from_str::<Value>(data) else {
        return CompletionEvent::Ignored;
    };

    if let Some(err) = value.get("error") {
        let message = err
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("upstream stream error");
        return CompletionEvent::Failed(message.to_string());
    }

    match value
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
    {
        Some(text) if !text.is_empty() => CompletionEvent::Delta(text.to_string()),
        _ => CompletionEvent::Ignored,
    }
}

/// Upstream sent more than [`MAX_PENDING_LINE_BYTES`] without a newline
#[derive(Debug, Error, PartialEq)]
#[error("upstream line exceeded {limit} bytes without a newline")]
pub(crate) struct LineTooLong {
    limit: usize,
}

/// Reassembles lines from arbitrarily split byte chunks
#[derive(Debug)]
pub(crate) struct LineBuffer {
    pending: Vec<u8>,
    max_pending: usize,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::with_limit(MAX_PENDING_LINE_BYTES)
    }
}

impl LineBuffer {
    pub(crate) fn with_limit(max_pending: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_pending,
        }
    }

    /// Append a chunk and return every line it completed
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>, LineTooLong> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line[..line.len() - 1]);
            lines.push(text.trim_end_matches('\r').to_string());
        }

        if self.pending.len() > self.max_pending {
            self.pending.clear();
            return Err(LineTooLong {
                limit: self.max_pending,
            });
        }
        Ok(lines)
    }

    /// Take whatever is left once the upstream body ends
    pub(crate) fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(
            String::from_utf8_lossy(&rest)
                .trim_end_matches('\r')
                .to_string(),
        )
    }
}

/// How the pump stopped
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PumpOutcome {
    /// Upstream finished; `fragments` pieces of text were forwarded
    Completed { fragments: usize },
    /// Upstream failed after the response started
    Failed(String),
    /// The client body was dropped
    ClientGone,
}

type Outbound = mpsc::Sender<io::Result<Bytes>>;

/// Read the upstream body and forward text fragments until it ends
pub(crate) async fn pump<S, E>(upstream: S, tx: Outbound) -> PumpOutcome
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Display,
{
    let mut upstream = std::pin::pin!(upstream);
    let mut lines = LineBuffer::default();
    let mut fragments = 0usize;

    while let Some(chunk) = upstream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => return fail(&tx, e.to_string()).await,
        };

        let completed = match lines.push(&chunk) {
            Ok(completed) => completed,
            Err(e) => return fail(&tx, e.to_string()).await,
        };
        for line in completed {
            if let ControlFlow::Break(outcome) = forward(&line, &tx, &mut fragments).await {
                return outcome;
            }
        }
    }

    if let Some(line) = lines.finish() {
        if let ControlFlow::Break(outcome) = forward(&line, &tx, &mut fragments).await {
            return outcome;
        }
    }

    PumpOutcome::Completed { fragments }
}

async fn forward(line: &str, tx: &Outbound, fragments: &mut usize) -> ControlFlow<PumpOutcome> {
    match parse_event_line(line) {
        CompletionEvent::Delta(text) => {
            if tx.send(Ok(Bytes::from(text))).await.is_err() {
                return ControlFlow::Break(PumpOutcome::ClientGone);
            }
            *fragments += 1;
            ControlFlow::Continue(())
        }
        CompletionEvent::Done => ControlFlow::Break(PumpOutcome::Completed {
            fragments: *fragments,
        }),
        CompletionEvent::Failed(message) => ControlFlow::Break(fail(tx, message).await),
        CompletionEvent::Ignored => ControlFlow::Continue(()),
    }
}

async fn fail(tx: &Outbound, message: String) -> PumpOutcome {
    // Headers are already sent; an erroring body makes the server cut the
    // response instead of ending it cleanly.
    let _ = tx
        .send(Err(io::Error::other(format!("completion stream failed: {message}"))))
        .await;
    PumpOutcome::Failed(message)
}

/// Client-facing body of a relayed completion.
///
/// Aborts the upstream pump exactly once if dropped before the stream ends.
pub struct RelayBody {
    inner: ReceiverStream<io::Result<Bytes>>,
    abort: Option<AbortHandle>,
    request_id: Uuid,
}

impl RelayBody {
    pub fn new(
        inner: ReceiverStream<io::Result<Bytes>>,
        abort: AbortHandle,
        request_id: Uuid,
    ) -> Self {
        Self {
            inner,
            abort: Some(abort),
            request_id,
        }
    }

    /// Whether dropping this body would still abort the upstream
    pub fn is_armed(&self) -> bool {
        self.abort.is_some()
    }
}

impl Stream for RelayBody {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(None) => {
                this.abort = None;
                Poll::Ready(None)
            }
            Poll::Ready(Some(Err(e))) => {
                this.abort = None;
                Poll::Ready(Some(Err(e)))
            }
            other => other,
        }
    }
}

impl Drop for RelayBody {
    fn drop(&mut self) {
        if let Some(handle) = self.abort.take() {
            info!(
                request_id = %self.request_id,
                "Client disconnected before completion finished, aborting upstream request"
            );
            handle.abort();
        }
    }
}

/// Spawn the pump for `upstream` and return the body that drains it
pub fn relay_stream<S, E>(upstream: S, request_id: Uuid) -> RelayBody
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let (tx, rx) = mpsc::channel(RELAY_CHANNEL_CAPACITY);
    let (abort_handle, registration) = AbortHandle::new_pair();

    tokio::spawn(async move {
        match Abortable::new(pump(upstream, tx), registration).await {
            Ok(PumpOutcome::Completed { fragments }) => {
                info!(%request_id, fragments, "Completion stream finished");
            }
            Ok(PumpOutcome::Failed(message)) => {
                error!(%request_id, error_message = %message, "Completion stream failed mid-response");
            }
            Ok(PumpOutcome::ClientGone) => {
                debug!(%request_id, "Client body closed while forwarding");
            }
            Err(_aborted) => {
                debug!(%request_id, "Upstream completion aborted");
            }
        }
    });

    RelayBody::new(ReceiverStream::new(rx), abort_handle, request_id)
}

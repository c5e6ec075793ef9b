//! Async stream that turns chat-completions SSE chunks into [`StreamEvent`]s.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use cirrus_types::{ApiError, ChatCompletionChunk, StreamEvent};
use futures_core::Stream;
use pin_project_lite::pin_project;

use crate::sse::SseDecoder;

const DONE_SENTINEL: &str = "[DONE]";

type ByteStream = Pin<Box<dyn Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send>>;

pin_project! {
    /// Typed events from one streaming chat-completions response.
    ///
    /// The stream ends at `data: [DONE]` or when the body closes, whichever
    /// comes first.
    pub struct ChatStream {
        #[pin]
        inner: ByteStream,
        decoder: SseDecoder,
        pending: VecDeque<Result<StreamEvent, ApiError>>,
        done: bool,
    }
}

impl ChatStream {
    pub fn new(
        byte_stream: impl Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static,
    ) -> Self {
        Self {
            inner: Box::pin(byte_stream),
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
            done: false,
        }
    }
}

impl Stream for ChatStream {
    type Item = Result<StreamEvent, ApiError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            if let Some(item) = this.pending.pop_front() {
                return Poll::Ready(Some(item));
            }
            if *this.done {
                return Poll::Ready(None);
            }

            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    let text = String::from_utf8_lossy(&bytes);
                    for payload in this.decoder.feed(&text) {
                        if decode_payload(&payload, this.pending) {
                            *this.done = true;
                            break;
                        }
                    }
                }
                Poll::Ready(Some(Err(e))) => {
                    *this.done = true;
                    return Poll::Ready(Some(Err(ApiError::Network(e.to_string()))));
                }
                Poll::Ready(None) => {
                    if let Some(payload) = this.decoder.finish() {
                        decode_payload(&payload, this.pending);
                    }
                    *this.done = true;
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Decode one SSE payload into `out`. Returns `true` when the stream is over.
fn decode_payload(payload: &str, out: &mut VecDeque<Result<StreamEvent, ApiError>>) -> bool {
    let payload = payload.trim();
    if payload == DONE_SENTINEL {
        return true;
    }
    if payload.is_empty() {
        return false;
    }

    let value: serde_json::Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(e) => {
            out.push_back(Err(ApiError::StreamParse(format!("{e}: {payload}"))));
            return true;
        }
    };

    if let Some(error) = value.get("error") {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        out.push_back(Err(ApiError::Server {
            status: 500,
            message,
        }));
        return true;
    }

    match serde_json::from_value::<ChatCompletionChunk>(value) {
        Ok(chunk) => {
            out.extend(chunk_events(chunk).into_iter().map(Ok));
            false
        }
        Err(e) => {
            out.push_back(Err(ApiError::StreamParse(e.to_string())));
            true
        }
    }
}

fn chunk_events(chunk: ChatCompletionChunk) -> Vec<StreamEvent> {
    let mut events = Vec::new();

    for choice in chunk.choices {
        if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
            events.push(StreamEvent::TextDelta(text));
        }
        for call in choice.delta.tool_calls.unwrap_or_default() {
            let function = call.function.unwrap_or_default();
            events.push(StreamEvent::ToolCallDelta {
                index: call.index,
                id: call.id,
                name: function.name,
                arguments: function.arguments,
            });
        }
        if let Some(reason) = choice.finish_reason {
            events.push(StreamEvent::Finish(reason));
        }
    }

    if let Some(usage) = chunk.usage {
        events.push(StreamEvent::Usage(usage));
    }

    events
}

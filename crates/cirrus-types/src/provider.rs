//! Provider trait for chat-completions backends.

use crate::{ApiError, ChatRequest, StreamEvent};
use futures_core::Stream;
use std::future::Future;
use std::pin::Pin;

/// A boxed async stream of events from an LLM provider.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, ApiError>> + Send>>;

/// Trait for LLM API providers (Azure OpenAI, OpenAI-compatible, test mocks).
///
/// Dyn-compatible so agents can hold an `Arc<dyn Provider>`.
pub trait Provider: Send + Sync {
    /// Send a streaming chat request, returning a stream of canonical events.
    fn create_chat_stream<'a>(
        &'a self,
        request: &'a ChatRequest,
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, ApiError>> + Send + 'a>>;

    /// Provider name for logging/display (e.g., "azure-openai").
    fn name(&self) -> &str;
}

//! Chat-completions client with SSE streaming for Cirrus.
//!
//! Speaks both the Azure OpenAI deployment API and plain OpenAI-compatible
//! endpoints. Both stream `chat.completion.chunk` payloads over SSE.

mod client;
mod provider;
mod retry;
mod sse;
mod stream;

pub use client::{ApiFlavor, ChatClient, DEFAULT_API_VERSION};
pub use provider::ChatProvider;
pub use retry::RetryConfig;
pub use stream::ChatStream;

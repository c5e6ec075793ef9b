//! [`Provider`] implementation backed by [`ChatClient`].

use std::future::Future;
use std::pin::Pin;

use cirrus_types::provider::{EventStream, Provider};
use cirrus_types::{ApiError, ChatRequest};

use crate::client::{ApiFlavor, ChatClient};
use crate::retry::RetryConfig;

/// Hosted chat-completions provider.
#[derive(Clone)]
pub struct ChatProvider {
    client: ChatClient,
}

impl ChatProvider {
    pub fn new(
        api_key: impl Into<String>,
        endpoint: impl AsRef<str>,
        flavor: ApiFlavor,
    ) -> Result<Self, ApiError> {
        Ok(Self {
            client: ChatClient::new(api_key, endpoint, flavor)?,
        })
    }

    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.client = self.client.with_retry_config(config);
        self
    }
}

impl Provider for ChatProvider {
    fn create_chat_stream<'a>(
        &'a self,
        request: &'a ChatRequest,
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, ApiError>> + Send + 'a>> {
        Box::pin(async move {
            let stream = self.client.create_chat_stream(request).await?;
            Ok(Box::pin(stream) as EventStream)
        })
    }

    fn name(&self) -> &str {
        match self.client.flavor() {
            ApiFlavor::Azure { .. } => "azure-openai",
            ApiFlavor::OpenAi => "openai",
        }
    }
}

//! Chat-completions HTTP client for Azure OpenAI and OpenAI-compatible hosts.

use cirrus_types::{ApiError, ChatRequest};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};

use crate::retry::{RetryConfig, is_retryable, server_delay};
use crate::stream::ChatStream;

/// API version used when none is configured.
pub const DEFAULT_API_VERSION: &str = "2024-12-01-preview";

/// Which URL layout and auth header the endpoint expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiFlavor {
    /// `{endpoint}/openai/deployments/{deployment}/chat/completions?api-version=..`
    /// with an `api-key` header.
    Azure {
        deployment: String,
        api_version: String,
    },
    /// `{base}/chat/completions` with a bearer token.
    OpenAi,
}

/// Client for a streaming chat-completions endpoint.
#[derive(Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
    flavor: ApiFlavor,
    retry_config: RetryConfig,
}

impl ChatClient {
    pub fn new(
        api_key: impl Into<String>,
        endpoint: impl AsRef<str>,
        flavor: ApiFlavor,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Ok(Self {
            http,
            api_key: api_key.into(),
            endpoint: normalize_endpoint(endpoint.as_ref()),
            flavor,
            retry_config: RetryConfig::default(),
        })
    }

    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    pub fn flavor(&self) -> &ApiFlavor {
        &self.flavor
    }

    /// Full URL the request is posted to.
    pub fn url(&self) -> String {
        match &self.flavor {
            ApiFlavor::Azure {
                deployment,
                api_version,
            } => format!(
                "{}/openai/deployments/{deployment}/chat/completions?api-version={api_version}",
                self.endpoint
            ),
            ApiFlavor::OpenAi => format!("{}/chat/completions", self.endpoint),
        }
    }

    fn headers(&self) -> Result<HeaderMap, ApiError> {
        let invalid_key = |_| ApiError::Auth {
            message: "API key contains invalid header characters".into(),
        };

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        match self.flavor {
            ApiFlavor::Azure { .. } => {
                headers.insert(
                    "api-key",
                    HeaderValue::from_str(&self.api_key).map_err(invalid_key)?,
                );
            }
            ApiFlavor::OpenAi => {
                headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                        .map_err(invalid_key)?,
                );
            }
        }
        Ok(headers)
    }

    /// Send a streaming request and return the event stream once the server
    /// has accepted it. Transient failures before that point are retried.
    pub async fn create_chat_stream(&self, request: &ChatRequest) -> Result<ChatStream, ApiError> {
        let url = self.url();
        let headers = self.headers()?;
        let body = serde_json::to_string(request).map_err(|e| ApiError::BadRequest {
            message: format!("Failed to serialize request: {e}"),
        })?;

        let mut attempt = 0;
        loop {
            tracing::debug!(
                "POST {url} (attempt {}/{})",
                attempt + 1,
                self.retry_config.max_retries + 1
            );

            let err = match self
                .http
                .post(&url)
                .headers(headers.clone())
                .body(body.clone())
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => {
                    return Ok(ChatStream::new(response.bytes_stream()));
                }
                Ok(response) => {
                    let status = response.status().as_u16();
                    let retry_after = parse_retry_after(response.headers());
                    let body_text = response.text().await.unwrap_or_default();
                    classify_error(status, &body_text, retry_after)
                }
                Err(e) if e.is_timeout() => ApiError::Timeout,
                Err(e) => ApiError::Network(e.to_string()),
            };

            if !is_retryable(&err) || attempt >= self.retry_config.max_retries {
                return Err(err);
            }

            let delay = self.retry_config.delay_for(attempt, server_delay(&err));
            tracing::warn!(
                "Retryable API error (attempt {}/{}): {err}. Retrying in {}ms...",
                attempt + 1,
                self.retry_config.max_retries + 1,
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

/// Prefix `https://` when no scheme is given and drop trailing slashes.
pub(crate) fn normalize_endpoint(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    }
}

/// `Retry-After` in seconds (integer or fractional) as milliseconds.
fn parse_retry_after(headers: &HeaderMap) -> Option<u64> {
    headers
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|secs| *secs >= 0.0)
        .map(|secs| (secs * 1000.0) as u64)
}

fn classify_error(status: u16, body: &str, retry_after: Option<u64>) -> ApiError {
    #[derive(serde::Deserialize)]
    struct ErrorBody {
        error: Option<ErrorDetail>,
    }
    #[derive(serde::Deserialize)]
    struct ErrorDetail {
        message: Option<String>,
    }

    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .and_then(|e| e.message)
        .unwrap_or_else(|| body.to_string());

    match status {
        401 | 403 => ApiError::Auth { message },
        400 | 404 | 422 => ApiError::BadRequest { message },
        429 => ApiError::RateLimited {
            retry_after_ms: retry_after,
        },
        503 => ApiError::Overloaded,
        _ => ApiError::Server { status, message },
    }
}

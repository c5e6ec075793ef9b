//! Retry behaviour of `ChatClient` against a raw TCP server.
//!
//! Each accepted connection receives the next canned HTTP response, so the
//! connection counter tells how many attempts the client made.

use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};

use cirrus_api::{ApiFlavor, ChatClient, ChatStream, RetryConfig};
use cirrus_types::{ApiError, ChatRequest, Message, StreamEvent};
use futures_util::StreamExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

const SSE_SUCCESS_BODY: &str = "\
data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Retried OK\"}}]}\n\
\n\
data: {\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\
\n\
data: [DONE]\n\
\n";

fn json_response(status_line: &str, extra_headers: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status_line}\r\n\
         Content-Type: application/json\r\n\
         {extra_headers}\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {body}",
        body.len()
    )
}

fn http_429_response() -> String {
    json_response(
        "429 Too Many Requests",
        "Retry-After: 0.01\r\n",
        r#"{"error":{"code":"429","message":"Rate limit exceeded"}}"#,
    )
}

fn http_500_response() -> String {
    json_response(
        "500 Internal Server Error",
        "",
        r#"{"error":{"message":"internal error"}}"#,
    )
}

fn http_401_response() -> String {
    json_response(
        "401 Unauthorized",
        "",
        r#"{"error":{"code":"401","message":"Access denied due to invalid subscription key"}}"#,
    )
}

fn http_404_response() -> String {
    json_response(
        "404 Not Found",
        "",
        r#"{"error":{"code":"DeploymentNotFound","message":"The API deployment for this resource does not exist."}}"#,
    )
}

fn http_200_sse_response() -> String {
    format!(
        "HTTP/1.1 200 OK\r\n\
         Content-Type: text/event-stream\r\n\
         Connection: close\r\n\
         \r\n\
         {SSE_SUCCESS_BODY}"
    )
}

struct TestServer {
    base_url: String,
    connections: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<String>>>,
}

/// One canned response per incoming connection, in order.
async fn start_test_server(responses: Vec<String>) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connections = Arc::new(AtomicUsize::new(0));
    let requests = Arc::new(Mutex::new(Vec::new()));

    let counter = Arc::clone(&connections);
    let seen = Arc::clone(&requests);
    tokio::spawn(async move {
        let responses = Arc::new(responses);
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let idx = counter.fetch_add(1, Ordering::SeqCst);
            let responses = Arc::clone(&responses);
            let seen = Arc::clone(&seen);

            tokio::spawn(async move {
                let mut buf = vec![0u8; 16 * 1024];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                seen.lock()
                    .unwrap()
                    .push(String::from_utf8_lossy(&buf[..n]).into_owned());

                if let Some(response) = responses.get(idx) {
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.flush().await;
                }
                let _ = socket.shutdown().await;
            });
        }
    });

    TestServer {
        base_url: format!("http://{addr}"),
        connections,
        requests,
    }
}

fn fast_retries() -> RetryConfig {
    RetryConfig {
        max_retries: 2,
        initial_delay_ms: 10,
        max_delay_ms: 100,
        backoff_factor: 2.0,
    }
}

fn azure_client(base_url: &str) -> ChatClient {
    ChatClient::new(
        "test-key",
        base_url,
        ApiFlavor::Azure {
            deployment: "gpt-4o".into(),
            api_version: "2024-12-01-preview".into(),
        },
    )
    .unwrap()
    .with_retry_config(fast_retries())
}

fn test_request() -> ChatRequest {
    ChatRequest {
        model: "gpt-4o".into(),
        messages: vec![Message::user("list my subscriptions")],
        tools: None,
        temperature: None,
        max_tokens: Some(100),
        stream: true,
        stream_options: None,
    }
}

async fn collect_events(mut stream: ChatStream) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    while let Some(result) = stream.next().await {
        events.push(result.expect("stream event should parse"));
    }
    events
}

#[tokio::test]
async fn azure_request_shape() {
    let server = start_test_server(vec![http_200_sse_response()]).await;
    let stream = azure_client(&server.base_url)
        .create_chat_stream(&test_request())
        .await
        .unwrap();
    collect_events(stream).await;

    let requests = server.requests.lock().unwrap();
    let head = requests[0].to_lowercase();
    assert!(
        head.starts_with(
            "post /openai/deployments/gpt-4o/chat/completions?api-version=2024-12-01-preview"
        ),
        "unexpected request line: {head}"
    );
    assert!(head.contains("api-key: test-key"));
}

#[tokio::test]
async fn retry_on_429_then_success() {
    let server = start_test_server(vec![http_429_response(), http_200_sse_response()]).await;

    let stream = azure_client(&server.base_url)
        .create_chat_stream(&test_request())
        .await
        .expect("should succeed after retry");
    assert_eq!(server.connections.load(Ordering::SeqCst), 2);

    let events = collect_events(stream).await;
    assert_eq!(events[0], StreamEvent::TextDelta("Retried OK".into()));
}

#[tokio::test]
async fn retry_on_500_then_success() {
    let server = start_test_server(vec![http_500_response(), http_200_sse_response()]).await;

    let result = azure_client(&server.base_url)
        .create_chat_stream(&test_request())
        .await;
    assert!(result.is_ok());
    assert_eq!(server.connections.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn retries_exhausted() {
    let server = start_test_server(vec![
        http_429_response(),
        http_429_response(),
        http_429_response(),
    ])
    .await;

    let result = azure_client(&server.base_url)
        .create_chat_stream(&test_request())
        .await;
    assert!(matches!(result, Err(ApiError::RateLimited { .. })));
    assert_eq!(server.connections.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn no_retry_on_401() {
    let server = start_test_server(vec![http_401_response(), http_200_sse_response()]).await;

    let result = azure_client(&server.base_url)
        .create_chat_stream(&test_request())
        .await;
    match result {
        Err(ApiError::Auth { message }) => assert!(message.contains("invalid subscription key")),
        Err(e) => panic!("expected Auth, got {e:?}"),
        Ok(_) => panic!("expected an error"),
    }
    assert_eq!(server.connections.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn missing_deployment_is_a_bad_request() {
    let server = start_test_server(vec![http_404_response()]).await;

    let result = azure_client(&server.base_url)
        .create_chat_stream(&test_request())
        .await;
    assert!(matches!(result, Err(ApiError::BadRequest { .. })));
    assert_eq!(server.connections.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn openai_flavor_sends_bearer_token() {
    let server = start_test_server(vec![http_200_sse_response()]).await;
    let client = ChatClient::new("sk-test", format!("{}/v1", server.base_url), ApiFlavor::OpenAi)
        .unwrap()
        .with_retry_config(RetryConfig::none());

    let stream = client.create_chat_stream(&test_request()).await.unwrap();
    collect_events(stream).await;

    let requests = server.requests.lock().unwrap();
    let head = requests[0].to_lowercase();
    assert!(head.starts_with("post /v1/chat/completions "), "{head}");
    assert!(head.contains("authorization: bearer sk-test"));
}

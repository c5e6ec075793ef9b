//! Scripted provider, fake launcher and request helpers for relay tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, header};
use cirrus_core::{AgentSettings, Driver, Mode};
use cirrus_server::{AppState, RelayEvent, router};
use cirrus_tools::{
    Catalog, CatalogOptions, LaunchError, ProviderLauncher, ProviderSession, ToolCategory,
};
use cirrus_types::{
    ApiError, ChatRequest, FinishReason, StreamEvent, Tool, ToolDefinition, ToolError,
    ToolOutput, Usage,
    provider::{EventStream, Provider},
};
use futures_util::stream;
use tower::ServiceExt;

/// One scripted model response.
pub enum Reply {
    Events(Vec<(StreamEvent, u64)>),
    Fail(ApiError),
}

#[derive(Default)]
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::default(),
        })
    }

    pub fn request(&self, index: usize) -> ChatRequest {
        self.requests.lock().unwrap()[index].clone()
    }
}

impl Provider for ScriptedProvider {
    fn create_chat_stream<'a>(
        &'a self,
        request: &'a ChatRequest,
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, ApiError>> + Send + 'a>> {
        Box::pin(async move {
            self.requests.lock().unwrap().push(request.clone());
            let events = match self.replies.lock().unwrap().pop_front() {
                Some(Reply::Events(events)) => events,
                Some(Reply::Fail(err)) => return Err(err),
                None => {
                    return Err(ApiError::BadRequest {
                        message: "script exhausted".into(),
                    });
                }
            };
            let stream = stream::unfold(events.into_iter(), |mut iter| async move {
                let (event, delay_ms) = iter.next()?;
                if delay_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
                Some((Ok(event), iter))
            });
            Ok(Box::pin(stream) as EventStream)
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// A text answer streamed word by word, `delay_ms` apart.
pub fn text_with_delay(answer: &str, delay_ms: u64) -> Reply {
    let mut events: Vec<(StreamEvent, u64)> = answer
        .split_inclusive(' ')
        .map(|word| (StreamEvent::TextDelta(word.to_string()), delay_ms))
        .collect();
    events.push((StreamEvent::Finish(FinishReason::Stop), 0));
    events.push((
        StreamEvent::Usage(Usage {
            prompt_tokens: 9,
            completion_tokens: 1,
            total_tokens: 10,
        }),
        0,
    ));
    Reply::Events(events)
}

pub fn text(answer: &str) -> Reply {
    text_with_delay(answer, 0)
}

pub fn tool_call(id: &str, name: &str, arguments: &str) -> Reply {
    Reply::Events(vec![
        (
            StreamEvent::ToolCallDelta {
                index: 0,
                id: Some(id.to_string()),
                name: Some(name.to_string()),
                arguments: Some(arguments.to_string()),
            },
            0,
        ),
        (StreamEvent::Finish(FinishReason::ToolCalls), 0),
    ])
}

struct EchoTool(&'static str);

impl Tool for EchoTool {
    fn name(&self) -> &str {
        self.0
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.0.to_string(),
            description: format!("{} tool", self.0),
            parameters: serde_json::json!({"type": "object"}),
        }
    }

    fn execute(
        &self,
        input: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<ToolOutput, ToolError>> + Send + '_>> {
        Box::pin(async move { Ok(ToolOutput::text(format!("{} ok: {input}", self.0))) })
    }
}

struct FakeSession {
    category: String,
    tools: Vec<&'static str>,
    shutdowns: Arc<Mutex<Vec<String>>>,
}

impl ProviderSession for FakeSession {
    fn tools(&self) -> Vec<Arc<dyn Tool>> {
        self.tools
            .iter()
            .map(|name| Arc::new(EchoTool(*name)) as Arc<dyn Tool>)
            .collect()
    }

    fn shutdown(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            self.shutdowns.lock().unwrap().push(self.category.clone());
        })
    }
}

/// Azure serves `subscription_list` and `group_list`; every other
/// category serves nothing. Launches and shutdowns are recorded.
#[derive(Default)]
pub struct FakeLauncher {
    pub launches: Mutex<Vec<String>>,
    shutdowns: Arc<Mutex<Vec<String>>>,
}

impl FakeLauncher {
    pub fn shutdowns(&self) -> Vec<String> {
        self.shutdowns.lock().unwrap().clone()
    }
}

impl ProviderLauncher for FakeLauncher {
    fn launch<'a>(
        &'a self,
        category: &'a ToolCategory,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn ProviderSession>, LaunchError>> + Send + 'a>>
    {
        Box::pin(async move {
            self.launches.lock().unwrap().push(category.name.clone());
            let tools = match category.name.as_str() {
                "azure" => vec!["subscription_list", "group_list"],
                _ => Vec::new(),
            };
            Ok(Box::new(FakeSession {
                category: category.name.clone(),
                tools,
                shutdowns: Arc::clone(&self.shutdowns),
            }) as Box<dyn ProviderSession>)
        })
    }
}

/// Relay state over the built-in catalog with `launcher` starting tools.
pub fn app_state(
    mode: Mode,
    provider: &Arc<ScriptedProvider>,
    launcher: &Arc<FakeLauncher>,
) -> AppState {
    let driver = Driver::new(
        mode,
        Arc::clone(provider) as Arc<dyn Provider>,
        AgentSettings::new("gpt-4o"),
    );
    let catalog = Arc::new(Catalog::builtin(&CatalogOptions::default()));
    AppState::new(
        driver,
        catalog,
        Arc::clone(launcher) as Arc<dyn ProviderLauncher>,
    )
}

pub fn state(mode: Mode, provider: &Arc<ScriptedProvider>) -> Arc<AppState> {
    Arc::new(app_state(
        mode,
        provider,
        &Arc::new(FakeLauncher::default()),
    ))
}

pub fn app(state: &Arc<AppState>) -> Router {
    router(Arc::clone(state), &["http://localhost:3000".to_string()])
}

pub fn chat_request(body: serde_json::Value) -> Request<Body> {
    Request::post("/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn send(app: Router, request: Request<Body>) -> Response<Body> {
    app.oneshot(request).await.unwrap()
}

/// Read a whole NDJSON body into events.
pub async fn events(response: Response<Body>) -> Vec<RelayEvent> {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    bytes
        .split(|b| *b == b'\n')
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_slice(line).unwrap())
        .collect()
}

pub async fn json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn chunks(events: &[RelayEvent]) -> String {
    events
        .iter()
        .filter_map(|e| match e {
            RelayEvent::Chunk { content } => Some(content.as_str()),
            _ => None,
        })
        .collect()
}

pub fn session_id(events: &[RelayEvent]) -> uuid::Uuid {
    match events.first() {
        Some(RelayEvent::Session { session_id }) => *session_id,
        other => panic!("expected a session event first, got {other:?}"),
    }
}

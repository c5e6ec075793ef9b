//! Scripted provider, fake tool launcher and event capture shared by the
//! integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cirrus_core::{AgentEvent, Session};
use cirrus_tools::{
    Catalog, CatalogOptions, LaunchError, ProviderLauncher, ProviderSession, ToolCategory,
    ToolManager,
};
use cirrus_types::{
    ApiError, ChatRequest, FinishReason, Message, Role, StreamEvent, Tool, ToolDefinition,
    ToolError, ToolOutput, Usage,
    provider::{EventStream, Provider},
};
use futures_util::stream;

// ---------------------------------------------------------------------------
// ScriptedProvider
// ---------------------------------------------------------------------------

/// One scripted model response.
pub enum Reply {
    Events(Vec<(StreamEvent, Option<u64>)>),
    Fail(ApiError),
}

/// Answers each request with the next scripted reply and records every
/// request it receives.
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

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
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
            let reply = self.replies.lock().unwrap().pop_front();
            let events = match reply {
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
                if let Some(ms) = delay_ms {
                    tokio::time::sleep(Duration::from_millis(ms)).await;
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

fn usage(total: u64) -> StreamEvent {
    StreamEvent::Usage(Usage {
        prompt_tokens: total - 1,
        completion_tokens: 1,
        total_tokens: total,
    })
}

/// A plain text answer streamed in one delta per word.
pub fn text(answer: &str) -> Reply {
    let mut events: Vec<(StreamEvent, Option<u64>)> = answer
        .split_inclusive(' ')
        .map(|word| (StreamEvent::TextDelta(word.to_string()), None))
        .collect();
    events.push((StreamEvent::Finish(FinishReason::Stop), None));
    events.push((usage(10), None));
    Reply::Events(events)
}

/// A single tool call whose arguments arrive in two fragments.
pub fn tool_call(id: &str, name: &str, arguments: &str) -> Reply {
    tool_calls(&[(id, name, arguments)])
}

/// Parallel tool calls, fragments interleaved by index.
pub fn tool_calls(calls: &[(&str, &str, &str)]) -> Reply {
    let mut events = Vec::new();
    for (index, (id, name, _)) in calls.iter().enumerate() {
        events.push((
            StreamEvent::ToolCallDelta {
                index,
                id: Some(id.to_string()),
                name: Some(name.to_string()),
                arguments: Some(String::new()),
            },
            None,
        ));
    }
    for half in 0..2 {
        for (index, (_, _, arguments)) in calls.iter().enumerate() {
            let mid = arguments.len() / 2;
            let part = if half == 0 { &arguments[..mid] } else { &arguments[mid..] };
            events.push((
                StreamEvent::ToolCallDelta {
                    index,
                    id: None,
                    name: None,
                    arguments: Some(part.to_string()),
                },
                None,
            ));
        }
    }
    events.push((StreamEvent::Finish(FinishReason::ToolCalls), None));
    events.push((usage(5), None));
    Reply::Events(events)
}

/// A text answer whose deltas arrive `delay_ms` apart.
pub fn slow_text(words: &[&str], delay_ms: u64) -> Reply {
    let mut events: Vec<(StreamEvent, Option<u64>)> = words
        .iter()
        .map(|w| (StreamEvent::TextDelta(w.to_string()), Some(delay_ms)))
        .collect();
    events.push((StreamEvent::Finish(FinishReason::Stop), None));
    Reply::Events(events)
}

// ---------------------------------------------------------------------------
// Fake tools and launcher
// ---------------------------------------------------------------------------

/// Replies `"<name> ok: <input>"`. The tool named `slow` sleeps for
/// `sleep_ms` first.
struct EchoTool(String);

impl Tool for EchoTool {
    fn name(&self) -> &str {
        &self.0
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.0.clone(),
            description: format!("{} tool", self.0),
            parameters: serde_json::json!({"type": "object"}),
        }
    }

    fn execute(
        &self,
        input: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<ToolOutput, ToolError>> + Send + '_>> {
        Box::pin(async move {
            if self.0 == "slow" {
                let ms = input.get("sleep_ms").and_then(|v| v.as_u64()).unwrap_or(5000);
                tokio::time::sleep(Duration::from_millis(ms)).await;
            }
            if self.0 == "broken" {
                return Err(ToolError::ExecutionFailed("backend unreachable".into()));
            }
            Ok(ToolOutput::text(format!("{} ok: {input}", self.0)))
        })
    }
}

struct FakeSession(Vec<String>);

impl ProviderSession for FakeSession {
    fn tools(&self) -> Vec<Arc<dyn Tool>> {
        self.0
            .iter()
            .map(|name| Arc::new(EchoTool(name.clone())) as Arc<dyn Tool>)
            .collect()
    }

    fn shutdown(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async {})
    }
}

/// Launches categories instantly with a fixed tool list each.
#[derive(Default)]
pub struct FakeLauncher {
    tools: HashMap<String, Vec<String>>,
    pub launches: Mutex<Vec<String>>,
}

impl FakeLauncher {
    pub fn standard() -> Arc<Self> {
        let mut tools = HashMap::new();
        tools.insert(
            "azure".to_string(),
            vec!["subscription_list".into(), "group_list".into(), "slow".into(), "broken".into()],
        );
        tools.insert("github".to_string(), vec!["get_me".into(), "list_issues".into()]);
        tools.insert("playwright".to_string(), vec!["browser_navigate".into()]);
        Arc::new(Self {
            tools,
            launches: Mutex::default(),
        })
    }

    pub fn launches(&self) -> Vec<String> {
        self.launches.lock().unwrap().clone()
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
            let tools = self.tools.get(&category.name).cloned().unwrap_or_default();
            Ok(Box::new(FakeSession(tools)) as Box<dyn ProviderSession>)
        })
    }
}

/// A session over the built-in catalog. GitHub is available only with a
/// token.
pub fn session(launcher: &Arc<FakeLauncher>, with_github: bool) -> Session {
    let catalog = Catalog::builtin(&CatalogOptions {
        github_token: with_github.then(|| "ghp_test".to_string()),
        ..CatalogOptions::default()
    });
    let tools = ToolManager::new(
        Arc::new(catalog),
        Arc::clone(launcher) as Arc<dyn ProviderLauncher>,
    );
    Session::new(tools)
}

// ---------------------------------------------------------------------------
// EventCapture
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct EventCapture {
    pub events: Vec<AgentEvent>,
}

impl EventCapture {
    pub fn callback(capture: Arc<Mutex<Self>>) -> impl FnMut(AgentEvent) {
        move |event| capture.lock().unwrap().events.push(event)
    }

    pub fn text(&self) -> String {
        self.events
            .iter()
            .filter_map(|e| match e {
                AgentEvent::TextDelta(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn statuses(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|e| match e {
                AgentEvent::Status(s) => Some(s.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn agents(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|e| match e {
                AgentEvent::AgentStarted { agent } => Some(agent.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn saw(&self, pred: impl Fn(&AgentEvent) -> bool) -> bool {
        self.events.iter().any(pred)
    }
}

/// Names of the tools offered in a request.
pub fn offered_tools(request: &ChatRequest) -> Vec<String> {
    request
        .tools
        .iter()
        .flatten()
        .map(|t| t.function.name.clone())
        .collect()
}

/// The system prompt of a request, if any.
pub fn system_prompt(request: &ChatRequest) -> Option<String> {
    request
        .messages
        .first()
        .filter(|m| m.role == Role::System)
        .map(|m| m.text().to_string())
}

/// The last message of a request.
pub fn last_message(request: &ChatRequest) -> Message {
    request.messages.last().cloned().unwrap()
}

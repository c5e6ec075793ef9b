//! The agent loop: stream a completion, run the tools it asks for, repeat.

use std::collections::BTreeMap;
use std::sync::Arc;

use cirrus_tools::{ToolManager, ToolScope};
use cirrus_types::{
    ChatRequest, CirrusError, FinishReason, FunctionTool, Message, StreamEvent, StreamOptions,
    ToolCall, ToolError, ToolOutput, Usage, provider::Provider, truncate_for_display,
};
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Model round-trips allowed per turn before the loop gives up.
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 10;

/// Tool output in events is cut to this many characters. The model always
/// receives the full text.
const EVENT_OUTPUT_CHARS: usize = 2000;

/// Events emitted while a turn runs.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// Progress information (provider activation, routing decisions).
    Status(String),
    /// A named agent takes over the turn.
    AgentStarted { agent: String },
    /// A text delta from the model.
    TextDelta(String),
    /// The model requested a tool call.
    ToolCall {
        id: String,
        name: String,
        arguments: String,
    },
    /// A tool call finished.
    ToolResult {
        id: String,
        name: String,
        output: String,
        is_error: bool,
    },
    /// The model called a tool no active provider declares.
    UnknownTool { id: String, name: String },
    /// Token usage for the whole turn.
    Usage(Usage),
    /// The turn completed.
    Done,
    /// The turn was cancelled.
    Cancelled,
    /// A non-fatal problem.
    Error(String),
}

/// Model parameters shared by every agent a driver builds.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSettings {
    pub model: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub max_tool_rounds: usize,
}

impl AgentSettings {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            max_tokens: None,
            temperature: None,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }
}

/// Result of one [`Agent::run_turn`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnOutput {
    /// Text of the final model response.
    pub text: String,
    pub usage: Usage,
}

/// A named model persona: a system prompt plus model parameters.
#[derive(Clone)]
pub struct Agent {
    name: String,
    provider: Arc<dyn Provider>,
    settings: AgentSettings,
    system_prompt: Option<String>,
}

#[derive(Debug, Default)]
struct PendingCall {
    id: String,
    name: String,
    arguments: String,
}

impl Agent {
    pub fn new(name: impl Into<String>, provider: Arc<dyn Provider>, settings: AgentSettings) -> Self {
        Self {
            name: name.into(),
            provider,
            settings,
            system_prompt: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.settings.temperature = temperature;
        self
    }

    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.settings.max_tool_rounds = rounds.max(1);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    /// Run one turn over `messages`: request a completion with the tools in
    /// `scope`, execute any tool calls it makes, and repeat until the model
    /// answers without tools.
    ///
    /// Assistant and tool messages are appended to `messages`. On
    /// cancellation the round in flight is discarded.
    pub async fn run_turn<F>(
        &self,
        messages: &mut Vec<Message>,
        tools: &ToolManager,
        scope: &ToolScope,
        cancel: &CancellationToken,
        mut on_event: F,
    ) -> Result<TurnOutput, CirrusError>
    where
        F: FnMut(AgentEvent),
    {
        let mut usage = Usage::default();
        let mut text = String::new();

        for round in 0..self.settings.max_tool_rounds {
            let definitions = tools.definitions(scope);
            tracing::debug!(
                agent = %self.name,
                round,
                tools = definitions.len(),
                "Requesting completion"
            );

            let mut outgoing = Vec::with_capacity(messages.len() + 1);
            if let Some(system) = &self.system_prompt {
                outgoing.push(Message::system(system.clone()));
            }
            let offset = outgoing.len();
            outgoing.append(messages);

            let mut request = ChatRequest {
                model: self.settings.model.clone(),
                messages: outgoing,
                tools: if definitions.is_empty() {
                    None
                } else {
                    Some(definitions.into_iter().map(FunctionTool::from).collect())
                },
                temperature: self.settings.temperature,
                max_tokens: self.settings.max_tokens,
                stream: true,
                stream_options: Some(StreamOptions {
                    include_usage: true,
                }),
            };

            let stream_result = tokio::select! {
                _ = cancel.cancelled() => None,
                result = self.provider.create_chat_stream(&request) => Some(result),
            };

            // Hand the history back before anything can return early.
            messages.extend(request.messages.drain(offset..));

            let Some(stream_result) = stream_result else {
                on_event(AgentEvent::Cancelled);
                return Err(CirrusError::Cancelled);
            };
            let mut stream = stream_result?;

            text.clear();
            let mut pending: BTreeMap<usize, PendingCall> = BTreeMap::new();
            let mut finish = None;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        on_event(AgentEvent::Cancelled);
                        return Err(CirrusError::Cancelled);
                    }
                    event = stream.next() => match event {
                        Some(Ok(StreamEvent::TextDelta(delta))) => {
                            text.push_str(&delta);
                            on_event(AgentEvent::TextDelta(delta));
                        }
                        Some(Ok(StreamEvent::ToolCallDelta { index, id, name, arguments })) => {
                            let call = pending.entry(index).or_default();
                            if let Some(id) = id.filter(|id| !id.is_empty()) {
                                call.id = id;
                            }
                            if let Some(name) = name.filter(|name| !name.is_empty()) {
                                call.name = name;
                            }
                            if let Some(arguments) = arguments {
                                call.arguments.push_str(&arguments);
                            }
                        }
                        Some(Ok(StreamEvent::Finish(reason))) => finish = Some(reason),
                        Some(Ok(StreamEvent::Usage(u))) => usage.add(&u),
                        Some(Err(e)) => return Err(CirrusError::Api(e)),
                        None => break,
                    }
                }
            }

            if finish == Some(FinishReason::Length) {
                tracing::warn!(agent = %self.name, "Response cut off at max_tokens");
            }

            let tool_calls: Vec<ToolCall> = pending
                .into_values()
                .filter(|call| !call.name.is_empty())
                .map(|call| {
                    let id = if call.id.is_empty() {
                        format!("call_{}", Uuid::new_v4().simple())
                    } else {
                        call.id
                    };
                    ToolCall::new(id, call.name, call.arguments)
                })
                .collect();

            if tool_calls.is_empty() {
                if !text.is_empty() {
                    messages.push(Message::assistant(text.clone()));
                }
                return Ok(TurnOutput { text, usage });
            }

            let checkpoint = messages.len();
            messages.push(Message::assistant_with_tools(text.clone(), tool_calls.clone()));

            let mut results = Vec::with_capacity(tool_calls.len());
            for call in tool_calls {
                let ToolCall { id, function, .. } = call;
                let name = function.name;
                on_event(AgentEvent::ToolCall {
                    id: id.clone(),
                    name: name.clone(),
                    arguments: function.arguments.clone(),
                });

                let input = match parse_arguments(&function.arguments) {
                    Ok(input) => input,
                    Err(message) => {
                        let message = format!("Invalid arguments for tool {name}: {message}");
                        on_event(AgentEvent::ToolResult {
                            id: id.clone(),
                            name: name.clone(),
                            output: message.clone(),
                            is_error: true,
                        });
                        results.push(Message::tool_result(id, name, message));
                        continue;
                    }
                };

                let routable = tools
                    .category_of(&name)
                    .is_some_and(|category| scope.includes(category));
                if !routable {
                    let err = ToolError::UnknownTool { name: name.clone() };
                    tracing::warn!(agent = %self.name, "{err}");
                    on_event(AgentEvent::UnknownTool {
                        id: id.clone(),
                        name: name.clone(),
                    });
                    results.push(Message::tool_result(id, name, format!("Error: {err}")));
                    continue;
                }

                tracing::debug!(agent = %self.name, tool = %name, "Executing tool");
                let result = tokio::select! {
                    _ = cancel.cancelled() => {
                        messages.truncate(checkpoint);
                        on_event(AgentEvent::Cancelled);
                        return Err(CirrusError::Cancelled);
                    }
                    result = tools.execute(&name, input) => result,
                };
                let output = result.unwrap_or_else(|e| ToolOutput::error(e.to_string()));
                let content = output.to_text();

                on_event(AgentEvent::ToolResult {
                    id: id.clone(),
                    name: name.clone(),
                    output: truncate_for_display(&content, EVENT_OUTPUT_CHARS),
                    is_error: output.is_error,
                });
                results.push(Message::tool_result(id, name, content));
            }
            messages.extend(results);
        }

        on_event(AgentEvent::Error(format!(
            "Stopped after {} tool rounds",
            self.settings.max_tool_rounds
        )));
        Ok(TurnOutput { text, usage })
    }
}

/// Decode a tool call's argument string. Empty means no arguments.
fn parse_arguments(raw: &str) -> Result<serde_json::Value, String> {
    if raw.trim().is_empty() {
        return Ok(serde_json::Value::Object(serde_json::Map::new()));
    }
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value @ serde_json::Value::Object(_)) => Ok(value),
        Ok(_) => Err("arguments must be a JSON object".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_arguments_mean_empty_object() {
        assert_eq!(parse_arguments("").unwrap(), serde_json::json!({}));
        assert_eq!(parse_arguments("  ").unwrap(), serde_json::json!({}));
    }

    #[test]
    fn object_arguments_pass_through() {
        let value = parse_arguments(r#"{"command":"list"}"#).unwrap();
        assert_eq!(value["command"], "list");
    }

    #[test]
    fn malformed_arguments_are_rejected() {
        assert!(parse_arguments(r#"{"command":"#).is_err());
        assert_eq!(
            parse_arguments("[1,2]").unwrap_err(),
            "arguments must be a JSON object"
        );
    }

    #[test]
    fn settings_default_rounds() {
        let settings = AgentSettings::new("gpt-4o");
        assert_eq!(settings.max_tool_rounds, DEFAULT_MAX_TOOL_ROUNDS);
        assert!(settings.temperature.is_none());
    }

    #[test]
    fn cancelled_error_display() {
        assert_eq!(CirrusError::Cancelled.to_string(), "Operation cancelled");
    }
}

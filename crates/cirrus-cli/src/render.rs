//! Terminal rendering of agent and relay events.

use std::io::{self, Write};

use cirrus_core::AgentEvent;
use cirrus_server::RelayEvent;
use cirrus_types::{Usage, truncate_for_display};

const PREVIEW_CHARS: usize = 200;

/// Print one in-process agent event. Answer text goes to stdout, progress to
/// stderr.
pub fn agent_event(event: AgentEvent) {
    match event {
        AgentEvent::Status(message) => status(&message),
        AgentEvent::AgentStarted { agent } => status(&format!("{agent} is working")),
        AgentEvent::TextDelta(text) => chunk(&text),
        AgentEvent::ToolCall {
            name, arguments, ..
        } => tool_call(&name, &arguments),
        AgentEvent::ToolResult {
            name,
            output,
            is_error,
            ..
        } => tool_result(&name, &output, is_error),
        AgentEvent::UnknownTool { name, .. } => {
            error(&format!("Tool {name} not found in any active tool category"))
        }
        AgentEvent::Usage(_) => {}
        AgentEvent::Done => finish_line(),
        AgentEvent::Cancelled => {
            finish_line();
            error("cancelled");
        }
        AgentEvent::Error(message) => error(&message),
    }
}

/// Print one relay event received from a remote server.
pub fn relay_event(event: &RelayEvent) {
    match event {
        RelayEvent::Session { .. } => {}
        RelayEvent::Status { message } => status(message),
        RelayEvent::Chunk { content } => chunk(content),
        RelayEvent::ToolCall {
            name, arguments, ..
        } => tool_call(name, arguments),
        RelayEvent::ToolResult {
            name,
            content,
            is_error,
            ..
        } => tool_result(name, content, *is_error),
        RelayEvent::Error { message, fatal } => {
            if *fatal {
                finish_line();
            }
            error(message);
        }
        RelayEvent::Done { usage } => {
            finish_line();
            print_usage(usage);
        }
    }
}

fn status(message: &str) {
    let _ = writeln!(io::stderr(), "\x1b[2m  [{message}]\x1b[0m");
}

fn chunk(text: &str) {
    let mut out = io::stdout().lock();
    let _ = write!(out, "{text}");
    let _ = out.flush();
}

fn tool_call(name: &str, arguments: &str) {
    let mut out = io::stdout().lock();
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "  [tool: {name} {}]",
        truncate_for_display(arguments, PREVIEW_CHARS)
    );
}

fn tool_result(name: &str, output: &str, is_error: bool) {
    let preview = truncate_for_display(output, PREVIEW_CHARS);
    let mut out = io::stdout().lock();
    if is_error {
        let _ = writeln!(out, "  [tool {name} error: {preview}]");
    } else {
        let _ = writeln!(out, "  [tool {name} done: {preview}]");
    }
}

fn error(message: &str) {
    let _ = writeln!(io::stderr(), "Error: {message}");
}

fn finish_line() {
    let _ = writeln!(io::stdout());
}

pub fn print_usage(usage: &Usage) {
    eprintln!(
        "Tokens: prompt {}, completion {}, total {}",
        usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
    );
}

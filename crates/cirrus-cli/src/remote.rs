//! Terminal client for a running relay.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result, bail};
use cirrus_server::RelayEvent;
use futures_util::StreamExt;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::render;

/// Splits a byte stream into complete NDJSON lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: Vec<u8>,
}

impl LineBuffer {
    /// Append `chunk` and return every line it completed, without the
    /// trailing newline. Blank lines are skipped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if !line.iter().all(u8::is_ascii_whitespace) {
                lines.push(line);
            }
        }
        lines
    }
}

pub async fn run(url: &str) -> Result<()> {
    let base = url.trim_end_matches('/');
    let http = reqwest::Client::new();

    let health: Value = http
        .get(format!("{base}/health"))
        .send()
        .await
        .with_context(|| format!("Relay at {base} is unreachable"))?
        .error_for_status()
        .context("Relay health check failed")?
        .json()
        .await
        .context("Relay health response is not JSON")?;
    eprintln!("{}", describe_health(base, &health));
    eprintln!("Type your message. Type 'exit' or press Ctrl+D to leave.\n");

    let stdin = io::stdin();
    let mut session_id: Option<Uuid> = None;
    loop {
        eprint!("> ");
        io::stderr().flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            eprintln!();
            break;
        }
        let input = input.trim();
        match input {
            "" => continue,
            "exit" | "quit" => break,
            _ => {}
        }

        if let Err(e) = send_turn(&http, base, input, &mut session_id).await {
            eprintln!("\nError: {e:#}");
        }
        println!();
    }

    if let Some(id) = session_id {
        let _ = http.delete(format!("{base}/sessions/{id}")).send().await;
    }
    Ok(())
}

async fn send_turn(
    http: &reqwest::Client,
    base: &str,
    message: &str,
    session_id: &mut Option<Uuid>,
) -> Result<()> {
    let response = http
        .post(format!("{base}/chat"))
        .json(&json!({ "message": message, "session_id": session_id }))
        .send()
        .await
        .context("Failed to reach the relay")?;

    let status = response.status();
    if !status.is_success() {
        let body: Value = response.json().await.unwrap_or_default();
        let reason = body["error"].as_str().unwrap_or("no details");
        bail!("Relay returned {status}: {reason}");
    }

    let mut lines = LineBuffer::default();
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.context("Relay stream interrupted")?;
        for line in lines.push(&chunk) {
            let event: RelayEvent =
                serde_json::from_slice(&line).context("Malformed relay event")?;
            if let RelayEvent::Session { session_id: id } = &event {
                *session_id = Some(*id);
            }
            render::relay_event(&event);
        }
    }
    Ok(())
}

fn describe_health(base: &str, health: &Value) -> String {
    let mode = health["mode"].as_str().unwrap_or("unknown");
    let categories: Vec<&str> = health["categories"]
        .as_array()
        .map(|all| {
            all.iter()
                .filter(|c| c["available"].as_bool().unwrap_or(false))
                .filter_map(|c| c["label"].as_str())
                .collect()
        })
        .unwrap_or_default();
    let tools = if health["tools_enabled"].as_bool().unwrap_or(false) {
        format!("tools: {}", categories.join(", "))
    } else {
        "tools disabled".to_string()
    };
    format!("Connected to {base} ({mode} mode, {tools})")
}

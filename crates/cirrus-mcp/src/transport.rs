//! Stdio transport for MCP servers.
//!
//! Spawns the server as a child process and exchanges newline-delimited
//! JSON-RPC over its stdin/stdout. Stderr is forwarded to the log.

use crate::config::McpServerConfig;
use crate::error::McpError;
use crate::jsonrpc::{
    Incoming, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, METHOD_NOT_FOUND,
    OutgoingResponse,
};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;

/// Async stdio channel to one MCP server process.
pub struct StdioTransport {
    name: String,
    next_id: AtomicU64,
    write_tx: Mutex<Option<mpsc::Sender<String>>>,
    pending: Pending,
    closed: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
    child: Mutex<Child>,
    timeout_ms: u64,
}

impl StdioTransport {
    /// Spawn the server and start the background reader, writer and stderr tasks.
    pub fn spawn(name: &str, config: &McpServerConfig) -> Result<Self, McpError> {
        let mut child = Command::new(&config.command)
            .args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| McpError::SpawnFailed {
                name: name.to_string(),
                source,
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::Protocol("child stdin was not captured".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::Protocol("child stdout was not captured".into()))?;
        let stderr = child.stderr.take();

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let (write_tx, mut write_rx) = mpsc::channel::<String>(64);
        let mut tasks = Vec::with_capacity(3);

        // Writer: channel → stdin. Dropping every sender closes stdin.
        tasks.push(tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(msg) = write_rx.recv().await {
                if stdin.write_all(msg.as_bytes()).await.is_err()
                    || stdin.write_all(b"\n").await.is_err()
                    || stdin.flush().await.is_err()
                {
                    break;
                }
            }
        }));

        // Reader: stdout → pending requests, and answers to server requests.
        let reader_pending = Arc::clone(&pending);
        let reader_closed = Arc::clone(&closed);
        let reply_tx = write_tx.clone();
        let reader_name = name.to_string();
        tasks.push(tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match Incoming::parse(line) {
                    Ok(Incoming::Response(resp)) => {
                        let Some(id) = resp.id else {
                            tracing::warn!(server = %reader_name, "MCP response without id: {line}");
                            continue;
                        };
                        if let Some(tx) = reader_pending.lock().await.remove(&id) {
                            let _ = tx.send(resp);
                        }
                    }
                    Ok(Incoming::Request { id, method }) => {
                        let reply = if method == "ping" {
                            OutgoingResponse::result(id, serde_json::json!({}))
                        } else {
                            tracing::debug!(server = %reader_name, "Rejecting server request '{method}'");
                            OutgoingResponse::error(
                                id,
                                METHOD_NOT_FOUND,
                                format!("Method not found: {method}"),
                            )
                        };
                        if let Ok(serialized) = serde_json::to_string(&reply) {
                            let _ = reply_tx.send(serialized).await;
                        }
                    }
                    Ok(Incoming::Notification { method }) => {
                        tracing::trace!(server = %reader_name, "MCP notification: {method}");
                    }
                    Err(e) => {
                        tracing::warn!(server = %reader_name, "Unparseable MCP output: {e}: {line}");
                    }
                }
            }
            // Process gone: fail everything still waiting.
            reader_closed.store(true, Ordering::SeqCst);
            reader_pending.lock().await.clear();
            tracing::debug!(server = %reader_name, "MCP server stdout closed");
        }));

        if let Some(stderr) = stderr {
            let stderr_name = name.to_string();
            tasks.push(tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(server = %stderr_name, "{line}");
                }
            }));
        }

        Ok(Self {
            name: name.to_string(),
            next_id: AtomicU64::new(1),
            write_tx: Mutex::new(Some(write_tx)),
            pending,
            closed,
            tasks,
            child: Mutex::new(child),
            timeout_ms: config.timeout_ms,
        })
    }

    async fn send_line(&self, line: String) -> Result<(), McpError> {
        let tx = self
            .write_tx
            .lock()
            .await
            .clone()
            .ok_or_else(|| McpError::ServerNotRunning {
                name: self.name.clone(),
            })?;
        tx.send(line).await.map_err(|_| McpError::ServerNotRunning {
            name: self.name.clone(),
        })
    }

    /// Send a request and wait for its response, up to the configured timeout.
    pub async fn send_request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let serialized = serde_json::to_string(&JsonRpcRequest::new(id, method, params))?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        if self.closed.load(Ordering::SeqCst) {
            self.pending.lock().await.remove(&id);
            return Err(McpError::ServerNotRunning {
                name: self.name.clone(),
            });
        }
        if let Err(e) = self.send_line(serialized).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(Duration::from_millis(self.timeout_ms), rx).await {
            Ok(Ok(resp)) => Ok(resp),
            Ok(Err(_)) => Err(McpError::ServerNotRunning {
                name: self.name.clone(),
            }),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(McpError::Timeout {
                    server: self.name.clone(),
                    method: method.to_string(),
                    timeout_ms: self.timeout_ms,
                })
            }
        }
    }

    /// Send a notification. Nothing is awaited beyond the write queue.
    pub async fn send_notification(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), McpError> {
        let serialized = serde_json::to_string(&JsonRpcNotification::new(method, params))?;
        self.send_line(serialized).await
    }

    /// Close stdin, give the process a grace period to exit, then kill it.
    /// Safe to call more than once.
    pub async fn shutdown(&self) {
        self.write_tx.lock().await.take();

        let mut child = self.child.lock().await;
        if tokio::time::timeout(SHUTDOWN_GRACE, child.wait())
            .await
            .is_err()
        {
            tracing::debug!(server = %self.name, "MCP server ignored stdin close, killing it");
            let _ = child.kill().await;
        }

        for task in &self.tasks {
            task.abort();
        }
    }
}

//! HTTP handlers.

use std::convert::Infallible;
use std::sync::Arc;

use axum::Json;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::relay::{EventMapper, RelayEvent};
use crate::state::{AppState, SharedSession};

const INDEX_HTML: &str = include_str!("../static/index.html");

pub(crate) const NDJSON: &str = "application/x-ndjson";

#[derive(Debug, Deserialize)]
pub(crate) struct ChatBody {
    #[serde(alias = "prompt")]
    message: String,
    #[serde(default)]
    session_id: Option<Uuid>,
}

pub(crate) async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub(crate) async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let categories: Vec<Value> = state
        .catalog()
        .iter()
        .map(|c| {
            let reason = match &c.availability {
                cirrus_tools::Availability::Available => None,
                cirrus_tools::Availability::Unavailable { reason } => Some(reason.clone()),
            };
            json!({
                "name": c.name,
                "label": c.label,
                "available": c.is_available(),
                "reason": reason,
            })
        })
        .collect();

    Json(json!({
        "status": "ok",
        "mode": state.driver().mode(),
        "tools_enabled": state.tools_enabled(),
        "categories": categories,
        "sessions": state.session_count().await,
    }))
}

/// Stream one user turn as NDJSON. The turn runs on its own task; dropping
/// the response body cancels it.
pub(crate) async fn chat(State(state): State<Arc<AppState>>, Json(body): Json<ChatBody>) -> Response {
    let message = body.message.trim().to_string();
    if message.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Message must not be empty");
    }

    let (session_id, session) = state.session(body.session_id).await;
    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    tokio::spawn(run_turn(
        state,
        session_id,
        session,
        message,
        tx,
        cancel.clone(),
    ));

    let guard = cancel.drop_guard();
    let lines = UnboundedReceiverStream::new(rx).map(move |event| {
        let _alive = &guard;
        Ok::<_, Infallible>(event.to_line())
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, NDJSON)
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(lines))
        .unwrap_or_else(|e| {
            tracing::error!("Failed to build chat response: {e}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        })
}

async fn run_turn(
    state: Arc<AppState>,
    session_id: Uuid,
    session: SharedSession,
    message: String,
    tx: mpsc::UnboundedSender<RelayEvent>,
    cancel: CancellationToken,
) {
    let _ = tx.send(RelayEvent::Session { session_id });

    let mut session = match session.clone().try_lock_owned() {
        Ok(guard) => guard,
        Err(_) => {
            let _ = tx.send(RelayEvent::status("Waiting for the previous turn to finish"));
            tokio::select! {
                _ = cancel.cancelled() => return,
                guard = session.lock_owned() => guard,
            }
        }
    };

    let mode = state.driver().mode();
    let _ = tx.send(RelayEvent::status(format!("Processing with {mode} mode")));

    let mut mapper = EventMapper::default();
    let result = state
        .driver()
        .respond(&mut session, &message, &cancel, |event| {
            if let Some(relay) = mapper.map(event) {
                let _ = tx.send(relay);
            }
        })
        .await;

    match result {
        Ok(usage) => {
            tracing::info!(%session_id, total_tokens = usage.total_tokens, "Turn finished");
        }
        Err(e) => {
            tracing::warn!(%session_id, "Turn failed: {e}");
            let _ = tx.send(RelayEvent::fatal(e.to_string()));
        }
    }
    state.touch(session_id).await;
}

pub(crate) async fn session_tools(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Response {
    let Some(session) = state.find(id).await else {
        return error_response(StatusCode::NOT_FOUND, "Unknown session");
    };
    let session = session.lock().await;
    Json(json!({
        "session_id": id,
        "active": session.tools.active_categories(),
        "tool_count": session.tools.tool_count(),
        "summary": session.tools.summary(),
    }))
    .into_response()
}

pub(crate) async fn close_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Response {
    if state.close(id).await {
        StatusCode::NO_CONTENT.into_response()
    } else {
        error_response(StatusCode::NOT_FOUND, "Unknown session")
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

//! HTTP relay for Cirrus.
//!
//! `POST /chat` runs one user turn and streams its events back as
//! newline-delimited JSON. `GET /` serves a small chat page that consumes
//! that stream.

mod relay;
mod routes;
mod state;

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderValue, Method, header};
use axum::routing::{delete, get, post};
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use relay::{EventMapper, RelayEvent};
pub use state::{AppState, DEFAULT_IDLE_TIMEOUT, SharedSession};

/// Build the relay's routes over `state`. `origins` lists the front-end
/// origins allowed by CORS; `"*"` allows any.
pub fn router(state: Arc<AppState>, origins: &[String]) -> Router {
    Router::new()
        .route("/", get(routes::index))
        .route("/health", get(routes::health))
        .route("/chat", post(routes::chat))
        .route("/run", post(routes::chat))
        .route("/sessions/{id}/tools", get(routes::session_tools))
        .route("/sessions/{id}", delete(routes::close_session))
        .layer(cors_layer(origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `shutdown` resolves, then stop every session's providers.
/// Idle sessions are closed in the background while serving.
pub async fn serve<F>(
    listener: TcpListener,
    state: Arc<AppState>,
    origins: &[String],
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(Arc::clone(&state), origins);
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("Relay listening on http://{addr}");
    }
    let sweeper = state.spawn_idle_sweeper();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await;
    sweeper.abort();
    state.shutdown().await;
    served
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE]);

    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{origin}'");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

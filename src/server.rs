//! Health and metrics endpoint
//!
//! Small axum router served on the status address. `/health` answers 200
//! `GOOD` once the first pull cycle has completed and 500 before that, so
//! orchestrators don't route traffic to a replica still doing its initial
//! sync. `/metrics` exposes the process prometheus registry in text form.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, TextEncoder};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
struct AppState {
    ready: Arc<AtomicBool>,
}

/// Build the status router around the readiness flag
pub fn build_router(ready: Arc<AtomicBool>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(AppState { ready })
}

/// Bind the status address and serve until the process exits
pub async fn serve(addr: SocketAddr, ready: Arc<AtomicBool>) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "serving health check endpoints");
    axum::serve(listener, build_router(ready)).await
}

async fn health(State(state): State<AppState>) -> Response {
    if state.ready.load(Ordering::SeqCst) {
        (StatusCode::OK, "GOOD").into_response()
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "Pull not finished").into_response()
    }
}

async fn metrics() -> Response {
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    match TextEncoder::new().encode(&families, &mut buffer) {
        Ok(()) => (StatusCode::OK, String::from_utf8_lossy(&buffer).into_owned()).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_reflects_readiness() {
        let ready = Arc::new(AtomicBool::new(false));
        let state = AppState {
            ready: Arc::clone(&ready),
        };

        let resp = health(State(state.clone())).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        ready.store(true, Ordering::SeqCst);
        let resp = health(State(state)).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_renders_text_exposition() {
        let resp = metrics().await;
        assert_eq!(resp.status(), StatusCode::OK);
    }
}

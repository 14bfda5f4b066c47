//! HTTP liveness endpoint for container orchestration
//!
//! Runs on its own task and never talks to Paperless, so a stalled request
//! to the document service cannot make the bot look dead.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info};

#[derive(Clone)]
struct HealthState {
    start_time: Instant,
}

/// Router exposing `GET /health`
pub fn router() -> Router {
    let state = HealthState {
        start_time: Instant::now(),
    };
    Router::new()
        .route("/health", get(health_handler))
        .with_state(Arc::new(state))
}

/// Serve the health endpoint on an already bound listener
pub async fn serve(listener: TcpListener) -> std::io::Result<()> {
    axum::serve(listener, router()).await
}

/// Bind `addr` and serve on a background task
///
/// Returns once the socket is listening, so callers can rely on the endpoint
/// answering before any other startup work runs.
pub async fn start(addr: SocketAddr) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;
    info!(addr = %local, "Health endpoint listening");

    let handle = tokio::spawn(async move {
        if let Err(e) = serve(listener).await {
            error!(addr = %local, error = %e, "Health endpoint stopped");
        }
    });
    Ok((local, handle))
}

async fn health_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let body = serde_json::json!({
        "status": "ok",
        "uptime_seconds": state.start_time.elapsed().as_secs(),
        "version": env!("CARGO_PKG_VERSION"),
    });
    (StatusCode::OK, Json(body))
}

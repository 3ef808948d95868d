use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use tracing::info;

use crate::platform::ChatSession;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health(State(session): State<Arc<dyn ChatSession>>) -> Json<HealthResponse> {
    let status = if session.is_connected() {
        "connected"
    } else {
        "disconnected"
    };
    Json(HealthResponse { status })
}

pub fn router(session: Arc<dyn ChatSession>) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(session)
}

/// Serve the health endpoint until `shutdown` resolves.
pub async fn serve<F>(session: Arc<dyn ChatSession>, port: u16, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind health check port {}", port))?;

    info!("Health check on port {}", port);

    axum::serve(listener, router(session))
        .with_graceful_shutdown(shutdown)
        .await
        .context("Health server error")?;

    Ok(())
}

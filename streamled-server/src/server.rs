//! Axum server setup and router configuration.

use crate::api;
use crate::state::AppState;
use axum::{Json, Router, response::IntoResponse, routing::get};
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// Build the main application router.
///
/// `POST /eventsub` is only mounted when the webhook is configured.
pub fn build_router(state: AppState) -> Router {
    let mut router = Router::new()
        // Health check endpoint
        .route("/health", get(health_check));

    if state.webhook.is_some() {
        router = router.merge(api::eventsub::router());
    }

    router.with_state(state)
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Simple health check - returns OK if the server is running.
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Bind the listening socket.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener, std::io::Error> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);
    Ok(listener)
}

/// Serve until `shutdown` completes, then drain in-flight requests.
pub async fn run_server<F>(router: Router, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

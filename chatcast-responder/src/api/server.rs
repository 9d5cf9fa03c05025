//! HTTP server setup and routing

use crate::error::{Error, Result};
use crate::pipeline::PipelineController;
use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared state passed to all handlers
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<PipelineController>,
    /// Author used for comments submitted without one
    pub default_author: String,
}

impl AppState {
    pub fn new(controller: Arc<PipelineController>, default_author: impl Into<String>) -> Self {
        Self {
            controller,
            default_author: default_author.into(),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(super::handlers::health))
        .route("/status", get(super::handlers::status))
        .route("/comments", post(super::handlers::post_comments))
        .route("/cancel/requests", post(super::handlers::cancel_requests))
        .route("/cancel/playback", post(super::handlers::cancel_playback))
        .route("/cancel/all", post(super::handlers::cancel_all))
        .route("/backend/test", get(super::handlers::backend_test))
        .route("/events", get(super::sse::event_stream))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serve the API until `shutdown` resolves
pub async fn serve<F>(state: AppState, port: u16, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Transport(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Internal(format!("Server error: {}", e)))?;

    Ok(())
}

//! HTTP server implementation using Axum.

use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use sitechat_chat::ChatOrchestrator;
use sitechat_core::config::GatewayConfig;
use sitechat_core::error::Result;
use sitechat_rag::IngestPipeline;
use sitechat_store::ChatStore;

/// Shared state for the gateway server.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ChatOrchestrator>,
    pub pipeline: Arc<IngestPipeline>,
    pub store: Arc<ChatStore>,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(super::routes::health_check))
        .route("/api/chat/message", post(super::routes::chat_message))
        .route("/api/chat/stream", post(super::routes::chat_stream))
        .route("/api/chat/sessions", get(super::routes::list_sessions))
        .route(
            "/api/chat/sessions/{id}/messages",
            get(super::routes::session_messages),
        )
        .route("/api/documents", get(super::routes::list_documents))
        .route("/api/documents/text", post(super::routes::add_text_document))
        .route("/api/documents/{id}", delete(super::routes::delete_document))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server and block until it exits.
pub async fn serve(state: Arc<AppState>, config: &GatewayConfig) -> Result<()> {
    let app = build_router(state);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Gateway listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

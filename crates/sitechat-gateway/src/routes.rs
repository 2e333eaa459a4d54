//! HTTP route handlers.
//!
//! User identity comes from the `x-user-id` header, set by the fronting
//! proxy after authentication. Requests without one fall back to user 1 for
//! single-user deployments.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;

use sitechat_chat::user_facing_message;
use sitechat_core::error::SiteChatError;

use super::server::AppState;

const DEFAULT_USER_ID: i64 = 1;

fn user_id_from(headers: &HeaderMap) -> i64 {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_USER_ID)
}

fn error_response(err: &SiteChatError, local_enabled: bool) -> Response {
    let (status, message) = match err {
        SiteChatError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        SiteChatError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            user_facing_message(err, local_enabled),
        ),
    };
    (status, Json(json!({ "error": message }))).into_response()
}

pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(rename = "sessionId")]
    pub session_id: Option<i64>,
}

/// Blocking chat: the full answer in one JSON response.
pub async fn chat_message(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>,
) -> Response {
    let user_id = user_id_from(&headers);
    match state
        .orchestrator
        .answer(user_id, req.session_id, &req.message)
        .await
    {
        Ok(reply) => Json(json!({
            "response": reply.text,
            "sessionId": reply.session_id,
        }))
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Chat error");
            error_response(&e, state.orchestrator.local_enabled())
        }
    }
}

/// Streaming chat over SSE: `{"text":...}` deltas, then `{"done":true,
/// "sessionId":N}`, or a terminal `{"error":...}` event.
pub async fn chat_stream(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>,
) -> Response {
    let user_id = user_id_from(&headers);
    match state
        .orchestrator
        .answer_stream(user_id, req.session_id, &req.message)
        .await
    {
        Ok(stream) => {
            let events = stream
                .map(|event| Ok::<_, Infallible>(Event::default().data(event.to_json())));
            Sse::new(events).keep_alive(KeepAlive::default()).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "Chat stream error");
            error_response(&e, state.orchestrator.local_enabled())
        }
    }
}

pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    let user_id = user_id_from(&headers);
    match state.orchestrator.list_sessions(user_id) {
        Ok(sessions) => {
            let sessions: Vec<_> = sessions
                .iter()
                .map(|s| json!({ "id": s.id, "title": s.title, "created_at": s.created_at }))
                .collect();
            Json(json!({ "sessions": sessions })).into_response()
        }
        Err(e) => error_response(&e, state.orchestrator.local_enabled()),
    }
}

pub async fn session_messages(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(session_id): Path<i64>,
) -> Response {
    let user_id = user_id_from(&headers);
    match state.orchestrator.session_messages(user_id, session_id) {
        Ok(messages) => Json(json!({ "messages": messages })).into_response(),
        Err(e) => error_response(&e, state.orchestrator.local_enabled()),
    }
}

pub async fn list_documents(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    let user_id = user_id_from(&headers);
    match state.store.list_documents(user_id) {
        Ok(docs) => {
            let documents: Vec<_> = docs
                .iter()
                .map(|d| json!({ "id": d.id, "name": d.name, "created_at": d.created_at }))
                .collect();
            Json(json!({ "documents": documents })).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "List documents error");
            error_response(&e, state.orchestrator.local_enabled())
        }
    }
}

#[derive(Deserialize)]
pub struct AddTextRequest {
    pub title: Option<String>,
    pub content: String,
}

/// Add raw text to the knowledge base: creates a document row, then chunks
/// and embeds its content. Chunks persisted before an embedding failure stay
/// in place; re-adding the document is the recovery path.
pub async fn add_text_document(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<AddTextRequest>,
) -> Response {
    let user_id = user_id_from(&headers);
    if req.content.trim().chars().count() < 10 {
        return error_response(
            &SiteChatError::Validation("Content must be at least 10 characters.".into()),
            state.orchestrator.local_enabled(),
        );
    }

    let name = format!("{}.txt", req.title.as_deref().unwrap_or("Untitled"));
    let document_id = match state.store.create_document(user_id, &name, &req.content) {
        Ok(id) => id,
        Err(e) => return error_response(&e, state.orchestrator.local_enabled()),
    };

    match state.pipeline.ingest(document_id, &req.content).await {
        Ok(chunks) => (
            StatusCode::CREATED,
            Json(json!({
                "message": "Content added to knowledge base.",
                "document": { "id": document_id, "name": name },
                "chunks": chunks,
            })),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, document_id, "Ingestion failed");
            error_response(&e, state.orchestrator.local_enabled())
        }
    }
}

pub async fn delete_document(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(document_id): Path<i64>,
) -> Response {
    let user_id = user_id_from(&headers);
    match state.store.delete_document(document_id, user_id) {
        Ok(true) => Json(json!({ "message": "Document deleted." })).into_response(),
        Ok(false) => error_response(
            &SiteChatError::NotFound("Document not found.".into()),
            state.orchestrator.local_enabled(),
        ),
        Err(e) => error_response(&e, state.orchestrator.local_enabled()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_user_id_header_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(user_id_from(&headers), 1);

        headers.insert("x-user-id", HeaderValue::from_static("42"));
        assert_eq!(user_id_from(&headers), 42);

        headers.insert("x-user-id", HeaderValue::from_static("not-a-number"));
        assert_eq!(user_id_from(&headers), 1);
    }
}

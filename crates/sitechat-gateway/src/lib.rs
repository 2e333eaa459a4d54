//! HTTP gateway: REST + SSE surface over the chat and ingestion services.

pub mod routes;
pub mod server;

pub use server::{build_router, serve, AppState};

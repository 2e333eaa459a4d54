//! # SiteChat Providers
//!
//! Embedding and chat-completion backends. There are exactly two: the Gemini
//! cloud API and a local Ollama server. Each capability gets a router
//! (`EmbeddingRouter`, `GenerationRouter`) that picks a backend per call from
//! a cached reachability probe and wraps cloud calls in the rate-limit
//! retry/failover controller.

pub mod failover;
pub mod gemini;
pub(crate) mod lines;
pub mod ollama;
pub mod probe;
pub mod retry;

use std::sync::Arc;

use sitechat_core::config::SiteChatConfig;
use sitechat_core::error::Result;
use sitechat_core::traits::{Embedder, Generator};

/// Build the embedding and generation routers from configuration.
///
/// The two routers carry independent availability caches: a rate-limited chat
/// call re-probing Ollama must not flip embedding traffic mid-ingest.
pub fn create_providers(
    config: &SiteChatConfig,
) -> Result<(Arc<dyn Embedder>, Arc<dyn Generator>)> {
    let embedder = failover::EmbeddingRouter::new(config)?;
    let generator = failover::GenerationRouter::new(config)?;
    Ok((Arc::new(embedder), Arc::new(generator)))
}

/// Normalize text before embedding: collapse newlines to spaces and truncate
/// to 8000 characters.
pub(crate) fn sanitize_embed_input(text: &str) -> String {
    text.replace('\n', " ").chars().take(8000).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_collapses_newlines() {
        assert_eq!(sanitize_embed_input("a\nb\nc"), "a b c");
    }

    #[test]
    fn test_sanitize_truncates_to_8000_chars() {
        let long = "xé".repeat(8000);
        let cleaned = sanitize_embed_input(&long);
        assert_eq!(cleaned.chars().count(), 8000);
    }
}

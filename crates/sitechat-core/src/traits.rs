//! Provider traits.
//!
//! Each capability (embedding, generation) gets one trait with a small closed
//! set of implementations: the Gemini cloud client, the local Ollama client,
//! and a router that picks between them per call from a cached availability
//! probe.

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use crate::error::Result;
use crate::types::Message;

/// A lazy, finite, forward-only sequence of response text deltas.
/// Dropping the stream cancels forwarding; the upstream call is not aborted.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Turns text into fixed-dimensionality embedding vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts in one provider call. Must return exactly one
    /// vector per input or fail with `EmbeddingCountMismatch`.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Produces chat completions from a message history plus a grounding
/// instruction passed out-of-band from the history.
#[async_trait]
pub trait Generator: Send + Sync {
    fn name(&self) -> &str;

    /// Single-shot completion.
    async fn complete(&self, messages: &[Message], system: &str) -> Result<String>;

    /// Streaming completion. The caller concatenates deltas to reconstruct
    /// the full response and forwards each delta as it arrives.
    async fn complete_stream(&self, messages: &[Message], system: &str) -> Result<TextStream>;
}

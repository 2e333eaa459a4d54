//! SiteChat error taxonomy.
//!
//! Rate-limit detection is substring-based against the rendered message
//! because both Gemini and Ollama surface throttling as free-form text
//! ("429", "RESOURCE_EXHAUSTED", "quota", "rate limit") rather than a
//! structured code.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SiteChatError>;

#[derive(Debug, Error)]
pub enum SiteChatError {
    #[error("Config error: {0}")]
    Config(String),

    /// Rejected input — never retried.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Error surfaced by an LLM provider API (non-2xx body, missing fields).
    #[error("{0}")]
    Provider(String),

    /// Transport-level failure (connect, timeout, body decode).
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API key missing for provider '{0}'")]
    ApiKeyMissing(String),

    #[error("Store error: {0}")]
    Store(String),

    /// Upload content could not be turned into text; ingestion never starts.
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Provider returned fewer vectors than texts sent. Aborts the batch —
    /// silently padding would associate chunks with the wrong vectors.
    #[error("embedding count mismatch: sent {sent}, received {received}")]
    EmbeddingCountMismatch { sent: usize, received: usize },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SiteChatError {
    /// Whether this error looks like provider throttling.
    ///
    /// Case-insensitive substring match on the display message; an explicit
    /// HTTP 429 ends up in the message text via the provider clients.
    pub fn is_rate_limit(&self) -> bool {
        let msg = self.to_string().to_lowercase();
        msg.contains("429")
            || msg.contains("resource_exhausted")
            || msg.contains("quota")
            || msg.contains("rate limit")
    }

    /// Whether this error indicates bad or missing credentials.
    pub fn is_auth_error(&self) -> bool {
        if matches!(self, SiteChatError::ApiKeyMissing(_)) {
            return true;
        }
        let msg = self.to_string();
        msg.contains("API key") || msg.contains("API_KEY") || msg.contains("401")
    }
}

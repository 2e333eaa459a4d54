//! SiteChat configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteChatConfig {
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

impl Default for SiteChatConfig {
    fn default() -> Self {
        Self {
            gemini: GeminiConfig::default(),
            ollama: OllamaConfig::default(),
            retrieval: RetrievalConfig::default(),
            ingest: IngestConfig::default(),
            retry: RetryConfig::default(),
            gateway: GatewayConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl SiteChatConfig {
    /// Load config from the default path (~/.sitechat/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::SiteChatError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| crate::SiteChatError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::SiteChatError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the SiteChat home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".sitechat")
    }
}

/// Gemini (cloud) provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// Resolved at provider construction; falls back to GEMINI_API_KEY.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_embed_model")]
    pub embed_model: String,
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".into()
}
fn default_chat_model() -> String {
    "gemini-2.5-flash".into()
}
fn default_embed_model() -> String {
    "gemini-embedding-001".into()
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_gemini_base_url(),
            chat_model: default_chat_model(),
            embed_model: default_embed_model(),
        }
    }
}

/// Ollama (local) provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Whether local fallback is allowed at all (SITECHAT_USE_OLLAMA).
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_ollama_host")]
    pub host: String,
    #[serde(default = "default_ollama_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_ollama_embed_model")]
    pub embed_model: String,
    /// Bounded-time reachability probe.
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    #[serde(default = "default_embed_timeout_secs")]
    pub embed_timeout_secs: u64,
    #[serde(default = "default_chat_timeout_secs")]
    pub chat_timeout_secs: u64,
}

fn default_ollama_host() -> String {
    "http://localhost:11434".into()
}
fn default_ollama_chat_model() -> String {
    "llama3.2".into()
}
fn default_ollama_embed_model() -> String {
    "nomic-embed-text".into()
}
fn default_probe_timeout_secs() -> u64 {
    2
}
fn default_embed_timeout_secs() -> u64 {
    60
}
fn default_chat_timeout_secs() -> u64 {
    120
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_ollama_host(),
            chat_model: default_ollama_chat_model(),
            embed_model: default_ollama_embed_model(),
            probe_timeout_secs: default_probe_timeout_secs(),
            embed_timeout_secs: default_embed_timeout_secs(),
            chat_timeout_secs: default_chat_timeout_secs(),
        }
    }
}

/// Retrieval ranking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    /// Session history window passed to the model.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_top_k() -> usize {
    10
}
fn default_similarity_threshold() -> f32 {
    0.15
}
fn default_history_limit() -> usize {
    20
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            similarity_threshold: default_similarity_threshold(),
            history_limit: default_history_limit(),
        }
    }
}

/// Document ingestion configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_min_chunk_len")]
    pub min_chunk_len: usize,
    /// Only the first N chunks of a document are embedded (cost/latency cap).
    #[serde(default = "default_max_chunks")]
    pub max_chunks: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Throttle between embedding batches to stay under provider rate limits.
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
}

fn default_chunk_size() -> usize {
    800
}
fn default_chunk_overlap() -> usize {
    50
}
fn default_min_chunk_len() -> usize {
    20
}
fn default_max_chunks() -> usize {
    15
}
fn default_batch_size() -> usize {
    5
}
fn default_batch_delay_ms() -> u64 {
    1500
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            min_chunk_len: default_min_chunk_len(),
            max_chunks: default_max_chunks(),
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay_ms(),
        }
    }
}

/// Rate-limit retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Fixed wait between retries; chosen to exceed Gemini's ~32s backoff hint.
    #[serde(default = "default_retry_wait_secs")]
    pub wait_secs: u64,
}

fn default_max_retries() -> u32 {
    3
}
fn default_retry_wait_secs() -> u64 {
    35
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            wait_secs: default_retry_wait_secs(),
        }
    }
}

/// Gateway (HTTP server) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    3000
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self { port: default_port(), host: default_host() }
    }
}

/// Persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Empty string means ~/.sitechat/chatbot.db.
    #[serde(default)]
    pub db_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { db_path: String::new() }
    }
}

impl StoreConfig {
    pub fn resolved_path(&self) -> PathBuf {
        if self.db_path.is_empty() {
            SiteChatConfig::home_dir().join("chatbot.db")
        } else {
            PathBuf::from(&self.db_path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SiteChatConfig::default();
        assert_eq!(config.gemini.chat_model, "gemini-2.5-flash");
        assert_eq!(config.gemini.embed_model, "gemini-embedding-001");
        assert_eq!(config.ollama.host, "http://localhost:11434");
        assert!(!config.ollama.enabled);
        assert_eq!(config.retrieval.top_k, 10);
        assert!((config.retrieval.similarity_threshold - 0.15).abs() < f32::EPSILON);
        assert_eq!(config.ingest.chunk_size, 800);
        assert_eq!(config.ingest.max_chunks, 15);
        assert_eq!(config.retry.wait_secs, 35);
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            [gemini]
            chat_model = "gemini-2.5-pro"

            [ollama]
            enabled = true
            chat_model = "qwen2.5"

            [retrieval]
            top_k = 5
        "#;

        let config: SiteChatConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.gemini.chat_model, "gemini-2.5-pro");
        assert!(config.ollama.enabled);
        assert_eq!(config.ollama.chat_model, "qwen2.5");
        assert_eq!(config.retrieval.top_k, 5);
        // Untouched sections keep defaults
        assert_eq!(config.ingest.batch_size, 5);
        assert_eq!(config.gateway.port, 3000);
    }

    #[test]
    fn test_config_missing_fields_use_defaults() {
        let config: SiteChatConfig = toml::from_str("").unwrap();
        assert_eq!(config.ingest.chunk_overlap, 50);
        assert_eq!(config.retry.max_retries, 3);
    }

    #[test]
    fn test_home_dir() {
        let home = SiteChatConfig::home_dir();
        assert!(home.to_string_lossy().contains("sitechat"));
    }
}

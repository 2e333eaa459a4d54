//! Local Ollama backend.
//!
//! `/api/embed` for embeddings (60s timeout), `/api/chat` for completions
//! (120s timeout, NDJSON when streaming). The grounding instruction is
//! prepended as a system message — unlike Gemini, Ollama takes it in-band,
//! and system-role history entries are kept.

use std::time::Duration;

use futures::StreamExt;
use serde_json::{json, Value};

use sitechat_core::config::OllamaConfig;
use sitechat_core::error::{Result, SiteChatError};
use sitechat_core::traits::TextStream;
use sitechat_core::types::Message;

use crate::lines::line_stream;

#[derive(Clone)]
pub struct OllamaClient {
    host: String,
    chat_model: String,
    embed_model: String,
    embed_timeout: Duration,
    chat_timeout: Duration,
    client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(config: &OllamaConfig) -> Self {
        let host = std::env::var("OLLAMA_HOST").unwrap_or_else(|_| config.host.clone());
        Self {
            host: host.trim_end_matches('/').to_string(),
            chat_model: config.chat_model.clone(),
            embed_model: config.embed_model.clone(),
            embed_timeout: Duration::from_secs(config.embed_timeout_secs),
            chat_timeout: Duration::from_secs(config.chat_timeout_secs),
            client: reqwest::Client::new(),
        }
    }

    async fn post(&self, path: &str, body: &Value, timeout: Duration) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.host, path);
        let resp = self
            .client
            .post(&url)
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| SiteChatError::Http(format!("ollama connection failed ({url}): {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            let detail = if text.is_empty() {
                format!("ollama request failed: {status}")
            } else {
                text
            };
            return Err(SiteChatError::Provider(detail));
        }
        Ok(resp)
    }

    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = json!({ "model": self.embed_model, "input": texts });
        let resp = self.post("/api/embed", &body, self.embed_timeout).await?;
        let data: Value = resp
            .json()
            .await
            .map_err(|e| SiteChatError::Http(e.to_string()))?;
        Ok(parse_embeddings(&data))
    }

    pub async fn complete(&self, messages: &[Message], system: &str) -> Result<String> {
        let body = json!({
            "model": self.chat_model,
            "messages": with_system(messages, system),
            "stream": false,
        });
        let resp = self.post("/api/chat", &body, self.chat_timeout).await?;
        let data: Value = resp
            .json()
            .await
            .map_err(|e| SiteChatError::Http(e.to_string()))?;
        Ok(data["message"]["content"].as_str().unwrap_or_default().to_string())
    }

    pub async fn complete_stream(&self, messages: &[Message], system: &str) -> Result<TextStream> {
        let body = json!({
            "model": self.chat_model,
            "messages": with_system(messages, system),
            "stream": true,
        });
        let resp = self.post("/api/chat", &body, self.chat_timeout).await?;

        let deltas = line_stream(resp).filter_map(|line| {
            let item = match line {
                Err(e) => Some(Err(e)),
                Ok(line) => parse_ndjson_delta(&line).map(Ok),
            };
            futures::future::ready(item)
        });
        Ok(Box::pin(deltas))
    }
}

/// Prepend the grounding instruction as a system turn.
fn with_system(messages: &[Message], system: &str) -> Vec<Value> {
    let mut out = Vec::with_capacity(messages.len() + 1);
    if !system.is_empty() {
        out.push(json!({ "role": "system", "content": system }));
    }
    for m in messages {
        out.push(json!({ "role": m.role.as_str(), "content": m.content }));
    }
    out
}

/// `/api/embed` returns `embeddings: [[..]]`; older servers return a single
/// `embedding: [..]`.
fn parse_embeddings(data: &Value) -> Vec<Vec<f32>> {
    let to_vec = |values: &Vec<Value>| {
        values
            .iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect::<Vec<f32>>()
    };
    if let Some(rows) = data["embeddings"].as_array() {
        return rows
            .iter()
            .filter_map(|row| row.as_array().map(to_vec))
            .collect();
    }
    if let Some(single) = data["embedding"].as_array() {
        return vec![to_vec(single)];
    }
    Vec::new()
}

/// One NDJSON chat line → its content delta, if any.
fn parse_ndjson_delta(line: &str) -> Option<String> {
    let json: Value = serde_json::from_str(line.trim()).ok()?;
    let delta = json["message"]["content"].as_str()?;
    (!delta.is_empty()).then(|| delta.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_system_prepends_instruction() {
        let messages = vec![Message::user("q"), Message::assistant("a")];
        let wire = with_system(&messages, "be terse");
        assert_eq!(wire.len(), 3);
        assert_eq!(wire[0]["role"], "system");
        assert_eq!(wire[0]["content"], "be terse");
        assert_eq!(wire[1]["role"], "user");
        assert_eq!(wire[2]["role"], "assistant");
    }

    #[test]
    fn test_with_system_keeps_history_system_entries() {
        let messages = vec![Message::system("earlier note"), Message::user("q")];
        let wire = with_system(&messages, "instruction");
        assert_eq!(wire.len(), 3);
        assert_eq!(wire[1]["role"], "system");
        assert_eq!(wire[1]["content"], "earlier note");
    }

    #[test]
    fn test_parse_embeddings_batched_and_legacy() {
        let batched = serde_json::json!({ "embeddings": [[1.0, 2.0], [3.0, 4.0]] });
        assert_eq!(parse_embeddings(&batched), vec![vec![1.0, 2.0], vec![3.0, 4.0]]);

        let legacy = serde_json::json!({ "embedding": [0.5, 0.25] });
        assert_eq!(parse_embeddings(&legacy), vec![vec![0.5, 0.25]]);

        assert!(parse_embeddings(&serde_json::json!({})).is_empty());
    }

    #[test]
    fn test_parse_ndjson_delta() {
        assert_eq!(
            parse_ndjson_delta(r#"{"message":{"content":"tok"}}"#).unwrap(),
            "tok"
        );
        assert!(parse_ndjson_delta(r#"{"done":true}"#).is_none());
        assert!(parse_ndjson_delta("not json").is_none());
    }
}

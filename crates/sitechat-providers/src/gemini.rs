//! Gemini cloud backend.
//!
//! Uses the native Generative Language REST API: `batchEmbedContents` for
//! embeddings, `generateContent` / `streamGenerateContent?alt=sse` for chat.
//! The grounding instruction travels out-of-band as `systemInstruction`;
//! system-role history entries are dropped and `assistant` maps to the API's
//! `model` role.

use futures::StreamExt;
use serde_json::{json, Value};

use sitechat_core::config::GeminiConfig;
use sitechat_core::error::{Result, SiteChatError};
use sitechat_core::traits::TextStream;
use sitechat_core::types::{Message, Role};

use crate::lines::line_stream;

#[derive(Clone)]
pub struct GeminiClient {
    api_key: String,
    base_url: String,
    chat_model: String,
    embed_model: String,
    client: reqwest::Client,
}

impl GeminiClient {
    /// API key resolution: config > GEMINI_API_KEY > GOOGLE_API_KEY > empty.
    /// An empty key is not an error until a call is made.
    pub fn new(config: &GeminiConfig) -> Result<Self> {
        let api_key = if !config.api_key.is_empty() {
            config.api_key.clone()
        } else {
            ["GEMINI_API_KEY", "GOOGLE_API_KEY"]
                .iter()
                .find_map(|key| std::env::var(key).ok())
                .unwrap_or_default()
        };

        Ok(Self {
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            chat_model: config.chat_model.clone(),
            embed_model: config.embed_model.clone(),
            client: reqwest::Client::new(),
        })
    }

    fn require_key(&self) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(SiteChatError::ApiKeyMissing("gemini".into()));
        }
        Ok(())
    }

    async fn post(&self, url: &str, body: &Value) -> Result<reqwest::Response> {
        let resp = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| SiteChatError::Http(format!("gemini connection failed ({url}): {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(SiteChatError::Provider(format!(
                "gemini API error {status}: {text}"
            )));
        }
        Ok(resp)
    }

    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.require_key()?;
        let requests: Vec<Value> = texts
            .iter()
            .map(|t| {
                json!({
                    "model": format!("models/{}", self.embed_model),
                    "content": { "parts": [{ "text": t }] },
                })
            })
            .collect();

        let url = format!(
            "{}/models/{}:batchEmbedContents",
            self.base_url, self.embed_model
        );
        let resp = self.post(&url, &json!({ "requests": requests })).await?;
        let body: Value = resp
            .json()
            .await
            .map_err(|e| SiteChatError::Http(e.to_string()))?;

        let embeddings = body["embeddings"]
            .as_array()
            .ok_or_else(|| SiteChatError::Provider("No embeddings returned from gemini".into()))?;
        Ok(embeddings
            .iter()
            .filter_map(|e| {
                let values = e["values"].as_array()?;
                Some(
                    values
                        .iter()
                        .filter_map(|v| v.as_f64().map(|f| f as f32))
                        .collect::<Vec<f32>>(),
                )
            })
            .collect())
    }

    pub async fn complete(&self, messages: &[Message], system: &str) -> Result<String> {
        self.require_key()?;
        let url = format!("{}/models/{}:generateContent", self.base_url, self.chat_model);
        let resp = self.post(&url, &chat_body(messages, system)).await?;
        let body: Value = resp
            .json()
            .await
            .map_err(|e| SiteChatError::Http(e.to_string()))?;
        Ok(extract_text(&body))
    }

    pub async fn complete_stream(&self, messages: &[Message], system: &str) -> Result<TextStream> {
        self.require_key()?;
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.chat_model
        );
        let resp = self.post(&url, &chat_body(messages, system)).await?;

        let deltas = line_stream(resp).filter_map(|line| {
            let item = match line {
                Err(e) => Some(Err(e)),
                Ok(line) => parse_sse_delta(&line).map(Ok),
            };
            futures::future::ready(item)
        });
        Ok(Box::pin(deltas))
    }
}

/// Build the generateContent request. System-role entries are dropped from
/// history; the instruction rides in `systemInstruction` instead.
fn chat_body(messages: &[Message], system: &str) -> Value {
    let contents: Vec<Value> = messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| {
            let role = match m.role {
                Role::Assistant => "model",
                _ => "user",
            };
            json!({ "role": role, "parts": [{ "text": m.content }] })
        })
        .collect();

    json!({
        "contents": contents,
        "systemInstruction": { "parts": [{ "text": system }] },
    })
}

/// Parse one SSE line into a text delta, skipping non-data and empty frames.
fn parse_sse_delta(line: &str) -> Option<String> {
    let payload = line.strip_prefix("data:")?.trim();
    let json: Value = serde_json::from_str(payload).ok()?;
    let delta = extract_text(&json);
    (!delta.is_empty()).then_some(delta)
}

/// Concatenate candidate text parts from a generateContent(-stream) payload.
fn extract_text(body: &Value) -> String {
    body["candidates"][0]["content"]["parts"]
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p["text"].as_str())
                .collect::<String>()
        })
        .unwrap_or_default()
}

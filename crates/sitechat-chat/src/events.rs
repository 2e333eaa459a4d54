//! Wire-level chat stream events and user-facing error mapping.

use serde_json::json;

use sitechat_core::error::SiteChatError;

/// One event on a streamed chat response.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Incremental answer text.
    Delta(String),
    /// Terminal success marker, carrying the session the turn landed in.
    Done { session_id: i64 },
    /// Terminal failure with a user-facing message.
    Error(String),
}

impl StreamEvent {
    /// JSON payload as sent over SSE.
    pub fn to_json(&self) -> String {
        match self {
            StreamEvent::Delta(text) => json!({ "text": text }).to_string(),
            StreamEvent::Done { session_id } => {
                json!({ "done": true, "sessionId": session_id }).to_string()
            }
            StreamEvent::Error(message) => json!({ "error": message }).to_string(),
        }
    }
}

/// Map an internal error to a message safe and useful to show end users.
/// Raw provider errors leak through only truncated, never with credentials.
pub fn user_facing_message(err: &SiteChatError, local_enabled: bool) -> String {
    if err.is_auth_error() {
        return "Gemini API key is missing or invalid. Get a free key at \
                aistudio.google.com/apikey"
            .to_string();
    }
    if err.is_rate_limit() {
        return if local_enabled {
            "Gemini rate limit and Ollama is not running. Start Ollama: run \
             \"ollama serve\" then \"ollama pull llama3.2\" and \
             \"ollama pull nomic-embed-text\"."
                .to_string()
        } else {
            "Gemini rate limit or quota exceeded. Try again later, or enable the \
             local Ollama fallback in the configuration."
                .to_string()
        };
    }
    let raw = err.to_string();
    if raw.is_empty() {
        return "Failed to get response.".to_string();
    }
    if raw.chars().count() > 300 {
        let truncated: String = raw.chars().take(300).collect();
        format!("{truncated}...")
    } else {
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_shapes() {
        assert_eq!(
            StreamEvent::Delta("hi".into()).to_json(),
            r#"{"text":"hi"}"#
        );
        let done = StreamEvent::Done { session_id: 7 }.to_json();
        assert!(done.contains(r#""done":true"#));
        assert!(done.contains(r#""sessionId":7"#));
        assert_eq!(
            StreamEvent::Error("nope".into()).to_json(),
            r#"{"error":"nope"}"#
        );
    }

    #[test]
    fn test_auth_errors_get_key_guidance() {
        let msg = user_facing_message(&SiteChatError::ApiKeyMissing("gemini".into()), false);
        assert!(msg.contains("aistudio.google.com"));
    }

    #[test]
    fn test_rate_limit_message_depends_on_local_fallback() {
        let err = SiteChatError::Provider("gemini API error 429: quota".into());
        assert!(user_facing_message(&err, true).contains("ollama serve"));
        assert!(user_facing_message(&err, false).contains("Try again later"));
    }

    #[test]
    fn test_long_errors_are_truncated() {
        let err = SiteChatError::Provider("x".repeat(500));
        let msg = user_facing_message(&err, false);
        assert!(msg.ends_with("..."));
        assert_eq!(msg.chars().count(), 303);
    }
}

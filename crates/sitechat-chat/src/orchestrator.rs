//! Turn orchestration: session resolution, retrieval, generation, persistence.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use sitechat_core::config::RetrievalConfig;
use sitechat_core::error::{Result, SiteChatError};
use sitechat_core::traits::{Embedder, Generator};
use sitechat_core::types::{Message, Role};
use sitechat_rag::rank_chunks;
use sitechat_store::{ChatStore, MessageRecord, SessionRecord};

use crate::events::{user_facing_message, StreamEvent};
use crate::grounding::build_system_instruction;

const EMPTY_REPLY: &str = "Sorry, I could not generate a response.";

/// Session titles are cut from the first message at this many characters.
const TITLE_LEN: usize = 50;

#[derive(Debug, Clone)]
pub struct ChatReply {
    pub text: String,
    pub session_id: i64,
}

pub struct ChatOrchestrator {
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    store: Arc<ChatStore>,
    retrieval: RetrievalConfig,
    local_enabled: bool,
}

impl ChatOrchestrator {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        store: Arc<ChatStore>,
        retrieval: RetrievalConfig,
        local_enabled: bool,
    ) -> Self {
        Self { embedder, generator, store, retrieval, local_enabled }
    }

    pub fn local_enabled(&self) -> bool {
        self.local_enabled
    }

    /// Run one blocking chat turn: retrieve context, generate, persist both
    /// sides of the exchange.
    pub async fn answer(
        &self,
        user_id: i64,
        session_id: Option<i64>,
        message: &str,
    ) -> Result<ChatReply> {
        let message = validate_message(message)?;
        let session = self.resolve_session(user_id, session_id, message)?;
        let history = self.build_history(session.id, message)?;
        self.store.append_message(session.id, Role::User, message)?;

        let chunks = self.retrieve_context(user_id, message).await;
        let system = build_system_instruction(&chunks);

        let text = self.generator.complete(&history, &system).await?;
        let text = if text.trim().is_empty() { EMPTY_REPLY.to_string() } else { text };

        self.store.append_message(session.id, Role::Assistant, &text)?;
        Ok(ChatReply { text, session_id: session.id })
    }

    /// Run one streamed chat turn. Errors before any generation start (bad
    /// input, unknown session, storage) are returned; generation failures
    /// arrive in-band as a terminal [`StreamEvent::Error`].
    pub async fn answer_stream(
        &self,
        user_id: i64,
        session_id: Option<i64>,
        message: &str,
    ) -> Result<ReceiverStream<StreamEvent>> {
        let message = validate_message(message)?;
        let session = self.resolve_session(user_id, session_id, message)?;
        let history = self.build_history(session.id, message)?;
        self.store.append_message(session.id, Role::User, message)?;

        let chunks = self.retrieve_context(user_id, message).await;
        let system = build_system_instruction(&chunks);

        let (tx, rx) = mpsc::channel(32);
        let generator = self.generator.clone();
        let store = self.store.clone();
        let local_enabled = self.local_enabled;
        let session_id = session.id;

        tokio::spawn(async move {
            let mut stream = match generator.complete_stream(&history, &system).await {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::error!(error = %e, "Chat stream failed to start");
                    let _ = tx
                        .send(StreamEvent::Error(user_facing_message(&e, local_enabled)))
                        .await;
                    return;
                }
            };

            let mut full = String::new();
            while let Some(item) = stream.next().await {
                match item {
                    Ok(delta) => {
                        full.push_str(&delta);
                        if tx.send(StreamEvent::Delta(delta)).await.is_err() {
                            // client disconnected; keep the partial turn
                            record_assistant(&store, session_id, &full);
                            return;
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Chat stream failed mid-response");
                        let _ = tx
                            .send(StreamEvent::Error(user_facing_message(&e, local_enabled)))
                            .await;
                        return;
                    }
                }
            }

            let text = if full.trim().is_empty() { EMPTY_REPLY.to_string() } else { full };
            record_assistant(&store, session_id, &text);
            let _ = tx.send(StreamEvent::Done { session_id }).await;
        });

        Ok(ReceiverStream::new(rx))
    }

    pub fn list_sessions(&self, user_id: i64) -> Result<Vec<SessionRecord>> {
        self.store.list_sessions(user_id)
    }

    /// Full transcript of a session owned by `user_id`.
    pub fn session_messages(&self, user_id: i64, session_id: i64) -> Result<Vec<MessageRecord>> {
        match self.store.get_session(session_id, user_id)? {
            Some(session) => self.store.list_messages(session.id),
            None => Err(SiteChatError::NotFound("Session not found.".into())),
        }
    }

    /// Reuse the caller's session when it exists and is theirs, otherwise
    /// start a new one titled after the first message.
    fn resolve_session(
        &self,
        user_id: i64,
        session_id: Option<i64>,
        message: &str,
    ) -> Result<SessionRecord> {
        if let Some(id) = session_id {
            if let Some(session) = self.store.get_session(id, user_id)? {
                return Ok(session);
            }
        }
        let title = session_title(message);
        let id = self.store.create_session(user_id, &title)?;
        Ok(SessionRecord {
            id,
            user_id,
            title,
            created_at: String::new(),
        })
    }

    /// Prior turns plus the incoming user message, oldest first. Read before
    /// the new message is persisted so the current turn appears exactly once.
    fn build_history(&self, session_id: i64, message: &str) -> Result<Vec<Message>> {
        let mut history: Vec<Message> = self
            .store
            .recent_messages(session_id, self.retrieval.history_limit)?
            .into_iter()
            .map(|m| Message { role: m.role, content: m.content })
            .collect();
        history.push(Message::user(message));
        Ok(history)
    }

    /// Rank the user's stored chunks against the query. Retrieval failures
    /// degrade to an empty context rather than failing the turn.
    async fn retrieve_context(&self, user_id: i64, message: &str) -> Vec<String> {
        let chunks = match self.store.chunks_for_user(user_id) {
            Ok(chunks) => chunks,
            Err(e) => {
                tracing::error!(error = %e, "Chunk load failed, continuing without context");
                return Vec::new();
            }
        };
        if chunks.is_empty() {
            return Vec::new();
        }
        match self.embedder.embed(message).await {
            Ok(query) => rank_chunks(&query, &chunks, &self.retrieval),
            Err(e) => {
                tracing::error!(error = %e, "Query embedding failed, continuing without context");
                Vec::new()
            }
        }
    }
}

fn validate_message(message: &str) -> Result<&str> {
    if message.trim().is_empty() {
        return Err(SiteChatError::Validation("Message is required.".into()));
    }
    Ok(message)
}

fn session_title(message: &str) -> String {
    let mut title: String = message.chars().take(TITLE_LEN).collect();
    if message.chars().count() > TITLE_LEN {
        title.push_str("...");
    }
    title
}

fn record_assistant(store: &ChatStore, session_id: i64, text: &str) {
    if let Err(e) = store.append_message(session_id, Role::Assistant, text) {
        tracing::error!(error = %e, session_id, "Failed to record assistant message");
    }
}

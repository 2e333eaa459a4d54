//! # SiteChat Store
//!
//! SQLite persistence for the retrieval core: documents, their embedded
//! chunks, chat sessions, and the per-session message log.
//!
//! Every read path is scoped by the owning user id — cross-user retrieval is
//! prevented here, by the queries, not by the ranker downstream. Embedding
//! vectors are stored as JSON text; a malformed vector deserializes to an
//! empty one and simply scores 0 during ranking.

use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;

use sitechat_core::error::{Result, SiteChatError};
use sitechat_core::types::Role;

/// A document owned by one user. Content is immutable once stored.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DocumentRecord {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub created_at: String,
}

/// A chunk loaded for ranking: text plus its stored embedding.
#[derive(Debug, Clone)]
pub struct StoredChunk {
    pub document_id: i64,
    pub content: String,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SessionRecord {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub created_at: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MessageRecord {
    pub role: Role,
    pub content: String,
    pub created_at: String,
}

/// SiteChat database — all chat and retrieval state behind one connection.
pub struct ChatStore {
    conn: Mutex<Connection>,
}

/// Stored document text is capped; retrieval reads chunks, the document row
/// keeps a bounded reference copy.
const MAX_DOCUMENT_CHARS: usize = 15_000;

impl ChatStore {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(store_err)?;
        // WAL for better concurrent read behavior under the gateway.
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();
        let store = Self { conn: Mutex::new(conn) };
        store.migrate()?;
        Ok(store)
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(store_err)?;
        let store = Self { conn: Mutex::new(conn) };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS documents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                content TEXT,
                created_at TEXT DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS document_chunks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                document_id INTEGER NOT NULL,
                content TEXT NOT NULL,
                embedding TEXT NOT NULL,
                created_at TEXT DEFAULT (datetime('now')),
                FOREIGN KEY (document_id) REFERENCES documents(id)
            );

            CREATE TABLE IF NOT EXISTS chat_sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                title TEXT DEFAULT 'New Chat',
                created_at TEXT DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS chat_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id INTEGER NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT DEFAULT (datetime('now')),
                FOREIGN KEY (session_id) REFERENCES chat_sessions(id)
            );

            CREATE INDEX IF NOT EXISTS idx_document_chunks_document ON document_chunks(document_id);
            CREATE INDEX IF NOT EXISTS idx_chat_sessions_user ON chat_sessions(user_id);
            CREATE INDEX IF NOT EXISTS idx_chat_messages_session ON chat_messages(session_id);",
        )
        .map_err(store_err)?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| SiteChatError::Store(format!("lock poisoned: {e}")))
    }

    // ── Documents ────────────────────────────────────────────────────────

    /// Insert a document and return its generated id. Content beyond
    /// `MAX_DOCUMENT_CHARS` is dropped from the stored row (chunks are built
    /// from the full text by the caller before this cap applies).
    pub fn create_document(&self, user_id: i64, name: &str, content: &str) -> Result<i64> {
        let content: String = content.chars().take(MAX_DOCUMENT_CHARS).collect();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO documents (user_id, name, content) VALUES (?1, ?2, ?3)",
            params![user_id, name, content],
        )
        .map_err(store_err)?;
        Ok(conn.last_insert_rowid())
    }

    pub fn list_documents(&self, user_id: i64) -> Result<Vec<DocumentRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, name, created_at FROM documents
                 WHERE user_id = ?1 ORDER BY created_at DESC",
            )
            .map_err(store_err)?;
        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok(DocumentRecord {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    name: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })
            .map_err(store_err)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn get_document(&self, document_id: i64, user_id: i64) -> Result<Option<DocumentRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, name, created_at FROM documents
                 WHERE id = ?1 AND user_id = ?2",
            )
            .map_err(store_err)?;
        let record = stmt
            .query_row(params![document_id, user_id], |row| {
                Ok(DocumentRecord {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    name: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })
            .ok();
        Ok(record)
    }

    /// Delete a document and its chunks (children first). Returns false when
    /// the document doesn't exist or belongs to another user.
    pub fn delete_document(&self, document_id: i64, user_id: i64) -> Result<bool> {
        let conn = self.lock()?;
        let owned: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM documents WHERE id = ?1 AND user_id = ?2",
                params![document_id, user_id],
                |r| r.get(0),
            )
            .map_err(store_err)?;
        if owned == 0 {
            return Ok(false);
        }
        conn.execute(
            "DELETE FROM document_chunks WHERE document_id = ?1",
            params![document_id],
        )
        .map_err(store_err)?;
        conn.execute("DELETE FROM documents WHERE id = ?1", params![document_id])
            .map_err(store_err)?;
        Ok(true)
    }

    // ── Chunks ───────────────────────────────────────────────────────────

    pub fn insert_chunk(&self, document_id: i64, content: &str, embedding: &[f32]) -> Result<i64> {
        let vector_json = serde_json::to_string(embedding)
            .map_err(|e| SiteChatError::Store(format!("embedding serialize: {e}")))?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO document_chunks (document_id, content, embedding) VALUES (?1, ?2, ?3)",
            params![document_id, content, vector_json],
        )
        .map_err(store_err)?;
        Ok(conn.last_insert_rowid())
    }

    /// All chunks across all documents owned by `user_id`. This is the full
    /// candidate set for every query — brute-force scoring, no index.
    pub fn chunks_for_user(&self, user_id: i64) -> Result<Vec<StoredChunk>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT dc.document_id, dc.content, dc.embedding
                 FROM document_chunks dc
                 JOIN documents d ON d.id = dc.document_id
                 WHERE d.user_id = ?1",
            )
            .map_err(store_err)?;
        let rows = stmt
            .query_map(params![user_id], |row| {
                let raw: String = row.get(2)?;
                Ok(StoredChunk {
                    document_id: row.get(0)?,
                    content: row.get(1)?,
                    // Legacy/malformed vectors become empty and score 0.
                    embedding: serde_json::from_str(&raw).unwrap_or_default(),
                })
            })
            .map_err(store_err)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn chunk_count(&self, document_id: i64) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM document_chunks WHERE document_id = ?1",
                params![document_id],
                |r| r.get(0),
            )
            .map_err(store_err)?;
        Ok(count as usize)
    }

    // ── Sessions ─────────────────────────────────────────────────────────

    pub fn create_session(&self, user_id: i64, title: &str) -> Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO chat_sessions (user_id, title) VALUES (?1, ?2)",
            params![user_id, title],
        )
        .map_err(store_err)?;
        Ok(conn.last_insert_rowid())
    }

    /// Look up a session only if it belongs to `user_id`.
    pub fn get_session(&self, session_id: i64, user_id: i64) -> Result<Option<SessionRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, title, created_at FROM chat_sessions
                 WHERE id = ?1 AND user_id = ?2",
            )
            .map_err(store_err)?;
        let record = stmt
            .query_row(params![session_id, user_id], |row| {
                Ok(SessionRecord {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    title: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })
            .ok();
        Ok(record)
    }

    pub fn list_sessions(&self, user_id: i64) -> Result<Vec<SessionRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, title, created_at FROM chat_sessions
                 WHERE user_id = ?1 ORDER BY created_at DESC, id DESC",
            )
            .map_err(store_err)?;
        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok(SessionRecord {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    title: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })
            .map_err(store_err)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    // ── Messages ─────────────────────────────────────────────────────────

    pub fn append_message(&self, session_id: i64, role: Role, content: &str) -> Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO chat_messages (session_id, role, content) VALUES (?1, ?2, ?3)",
            params![session_id, role.as_str(), content],
        )
        .map_err(store_err)?;
        Ok(conn.last_insert_rowid())
    }

    /// The last `limit` messages of a session, in chronological order.
    /// Ordered by rowid — `created_at` has one-second resolution and turns
    /// within the same second must keep append order.
    pub fn recent_messages(&self, session_id: i64, limit: usize) -> Result<Vec<MessageRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT role, content, created_at FROM (
                     SELECT id, role, content, created_at FROM chat_messages
                     WHERE session_id = ?1 ORDER BY id DESC LIMIT ?2
                 ) ORDER BY id ASC",
            )
            .map_err(store_err)?;
        let rows = stmt
            .query_map(params![session_id, limit as i64], row_to_message)
            .map_err(store_err)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// The full message log of a session, in chronological order.
    pub fn list_messages(&self, session_id: i64) -> Result<Vec<MessageRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT role, content, created_at FROM chat_messages
                 WHERE session_id = ?1 ORDER BY id ASC",
            )
            .map_err(store_err)?;
        let rows = stmt
            .query_map(params![session_id], row_to_message)
            .map_err(store_err)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRecord> {
    let role_str: String = row.get(0)?;
    Ok(MessageRecord {
        role: role_str.parse().unwrap_or(Role::User),
        content: row.get(1)?,
        created_at: row.get(2)?,
    })
}

fn store_err(e: rusqlite::Error) -> SiteChatError {
    SiteChatError::Store(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_chunks_cascade_delete() {
        let store = ChatStore::open_in_memory().unwrap();
        let doc = store.create_document(1, "warranty.txt", "full text").unwrap();
        store.insert_chunk(doc, "chunk one", &[0.1, 0.2]).unwrap();
        store.insert_chunk(doc, "chunk two", &[0.3, 0.4]).unwrap();
        assert_eq!(store.chunk_count(doc).unwrap(), 2);

        assert!(store.delete_document(doc, 1).unwrap());
        assert_eq!(store.chunk_count(doc).unwrap(), 0);
        assert!(store.list_documents(1).unwrap().is_empty());
    }

    #[test]
    fn test_document_content_stored_truncated() {
        let store = ChatStore::open_in_memory().unwrap();
        let long = "x".repeat(MAX_DOCUMENT_CHARS + 5_000);
        let doc = store.create_document(1, "big.txt", &long).unwrap();

        let conn = store.conn.lock().unwrap();
        let stored: String = conn
            .query_row(
                "SELECT content FROM documents WHERE id = ?1",
                params![doc],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(stored.chars().count(), MAX_DOCUMENT_CHARS);
    }

    #[test]
    fn test_delete_document_requires_owner() {
        let store = ChatStore::open_in_memory().unwrap();
        let doc = store.create_document(1, "a.txt", "text").unwrap();
        assert!(!store.delete_document(doc, 2).unwrap());
        assert_eq!(store.list_documents(1).unwrap().len(), 1);
    }

    #[test]
    fn test_chunks_scoped_by_user() {
        let store = ChatStore::open_in_memory().unwrap();
        let mine = store.create_document(1, "mine.txt", "").unwrap();
        let theirs = store.create_document(2, "theirs.txt", "").unwrap();
        store.insert_chunk(mine, "my chunk", &[1.0]).unwrap();
        store.insert_chunk(theirs, "their chunk", &[1.0]).unwrap();

        let chunks = store.chunks_for_user(1).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "my chunk");
    }

    #[test]
    fn test_malformed_embedding_loads_as_empty() {
        let store = ChatStore::open_in_memory().unwrap();
        let doc = store.create_document(1, "old.txt", "").unwrap();
        {
            let conn = store.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO document_chunks (document_id, content, embedding) VALUES (?1, ?2, ?3)",
                params![doc, "legacy chunk", "not-json"],
            )
            .unwrap();
        }
        let chunks = store.chunks_for_user(1).unwrap();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].embedding.is_empty());
    }

    #[test]
    fn test_session_lookup_scoped_by_user() {
        let store = ChatStore::open_in_memory().unwrap();
        let sid = store.create_session(1, "Hello...").unwrap();
        assert!(store.get_session(sid, 1).unwrap().is_some());
        assert!(store.get_session(sid, 2).unwrap().is_none());
    }

    #[test]
    fn test_messages_keep_append_order() {
        let store = ChatStore::open_in_memory().unwrap();
        let sid = store.create_session(1, "t").unwrap();
        store.append_message(sid, Role::User, "q1").unwrap();
        store.append_message(sid, Role::Assistant, "a1").unwrap();
        store.append_message(sid, Role::User, "q2").unwrap();
        store.append_message(sid, Role::Assistant, "a2").unwrap();

        let all = store.list_messages(sid).unwrap();
        let contents: Vec<&str> = all.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["q1", "a1", "q2", "a2"]);
        assert_eq!(all[0].role, Role::User);
        assert_eq!(all[1].role, Role::Assistant);
    }

    #[test]
    fn test_recent_messages_returns_tail_chronologically() {
        let store = ChatStore::open_in_memory().unwrap();
        let sid = store.create_session(1, "t").unwrap();
        for i in 0..25 {
            store.append_message(sid, Role::User, &format!("m{i}")).unwrap();
        }
        let recent = store.recent_messages(sid, 20).unwrap();
        assert_eq!(recent.len(), 20);
        assert_eq!(recent.first().unwrap().content, "m5");
        assert_eq!(recent.last().unwrap().content, "m24");
    }
}

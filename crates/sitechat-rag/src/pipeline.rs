//! Document ingestion: chunk, embed in throttled batches, persist.

use std::sync::Arc;
use std::time::Duration;

use sitechat_core::config::IngestConfig;
use sitechat_core::error::Result;
use sitechat_core::traits::Embedder;
use sitechat_store::ChatStore;

use crate::chunker::chunk_text;

pub struct IngestPipeline {
    embedder: Arc<dyn Embedder>,
    store: Arc<ChatStore>,
    config: IngestConfig,
}

impl IngestPipeline {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<ChatStore>, config: IngestConfig) -> Self {
        Self { embedder, store, config }
    }

    /// Chunk `content`, embed the first `max_chunks` chunks in batches, and
    /// persist each chunk with its vector under `document_id`. Returns the
    /// number of chunks stored.
    ///
    /// Batches already persisted survive a mid-ingest failure; callers decide
    /// whether to delete the document on error.
    pub async fn ingest(&self, document_id: i64, content: &str) -> Result<usize> {
        let chunks: Vec<String> = chunk_text(content, &self.config)
            .into_iter()
            .take(self.config.max_chunks)
            .collect();
        if chunks.is_empty() {
            tracing::warn!(document_id, "No usable chunks extracted from document");
            return Ok(0);
        }
        tracing::info!(document_id, chunks = chunks.len(), "Embedding document chunks");

        let mut stored = 0usize;
        for (i, batch) in chunks.chunks(self.config.batch_size).enumerate() {
            if i > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.batch_delay_ms)).await;
            }
            let vectors = self.embedder.embed_batch(batch).await?;
            for (chunk, vector) in batch.iter().zip(vectors.iter()) {
                self.store.insert_chunk(document_id, chunk, vector)?;
                stored += 1;
            }
        }

        tracing::info!(document_id, stored, "Document ingested");
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sitechat_core::error::SiteChatError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    /// Deterministic embedder that counts batch calls and can fail on a
    /// chosen call.
    struct FakeEmbedder {
        calls: AtomicU32,
        fail_on_call: Option<u32>,
    }

    impl FakeEmbedder {
        fn new() -> Self {
            Self { calls: AtomicU32::new(0), fail_on_call: None }
        }

        fn failing_on(call: u32) -> Self {
            Self { calls: AtomicU32::new(0), fail_on_call: Some(call) }
        }
    }

    #[async_trait]
    impl Embedder for FakeEmbedder {
        fn name(&self) -> &str {
            "fake"
        }

        async fn embed(&self, _text: &str) -> sitechat_core::error::Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }

        async fn embed_batch(
            &self,
            texts: &[String],
        ) -> sitechat_core::error::Result<Vec<Vec<f32>>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on_call == Some(call) {
                return Err(SiteChatError::Provider(
                    "gemini API error 429: quota exceeded".into(),
                ));
            }
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    fn setup(embedder: FakeEmbedder) -> (IngestPipeline, Arc<ChatStore>, Arc<FakeEmbedder>, i64) {
        let store = Arc::new(ChatStore::open_in_memory().unwrap());
        let doc_id = store.create_document(1, "manual.pdf", "content").unwrap();
        let embedder = Arc::new(embedder);
        let pipeline =
            IngestPipeline::new(embedder.clone(), store.clone(), IngestConfig::default());
        (pipeline, store, embedder, doc_id)
    }

    /// Text that chunks into well over `max_chunks` pieces.
    fn long_text() -> String {
        "every sentence here carries enough words to survive the length filter ".repeat(300)
    }

    #[tokio::test(start_paused = true)]
    async fn test_ingest_caps_chunks_and_throttles_batches() {
        let (pipeline, store, embedder, doc_id) = setup(FakeEmbedder::new());
        let started = Instant::now();

        let stored = pipeline.ingest(doc_id, &long_text()).await.unwrap();

        // capped at 15 chunks, embedded as 3 batches of 5
        assert_eq!(stored, 15);
        assert_eq!(store.chunk_count(doc_id).unwrap(), 15);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
        // 2 inter-batch delays of 1.5s
        assert_eq!(started.elapsed(), Duration::from_millis(3000));
    }

    #[tokio::test]
    async fn test_ingest_empty_content_stores_nothing() {
        let (pipeline, store, _, doc_id) = setup(FakeEmbedder::new());
        assert_eq!(pipeline.ingest(doc_id, "").await.unwrap(), 0);
        assert_eq!(pipeline.ingest(doc_id, "tiny").await.unwrap(), 0);
        assert_eq!(store.chunk_count(doc_id).unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ingest_failure_keeps_earlier_batches() {
        let (pipeline, store, _, doc_id) = setup(FakeEmbedder::failing_on(2));

        let err = pipeline.ingest(doc_id, &long_text()).await.unwrap_err();
        assert!(err.is_rate_limit());
        // first batch of 5 was persisted before the failure
        assert_eq!(store.chunk_count(doc_id).unwrap(), 5);
    }

    #[tokio::test]
    async fn test_ingest_single_batch_has_no_delay() {
        let (pipeline, store, _, doc_id) = setup(FakeEmbedder::new());
        let text = "a single paragraph of reasonable length that fits one chunk easily";
        let stored = pipeline.ingest(doc_id, text).await.unwrap();
        assert_eq!(stored, 1);
        assert_eq!(store.chunk_count(doc_id).unwrap(), 1);
    }
}

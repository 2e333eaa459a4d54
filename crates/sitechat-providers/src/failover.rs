//! Per-call backend selection and rate-limit failover.
//!
//! Each router owns its own availability cache: if the local backend was
//! reachable at first probe, every call routes there (no retry beyond the
//! transport timeout). Otherwise the cloud backend handles the call under
//! the retry policy; when retries exhaust on a rate limit, the probe is
//! reset and re-run, and a reachable local backend gets exactly one attempt.
//! A still-unreachable local backend surfaces the original cloud error.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use sitechat_core::config::SiteChatConfig;
use sitechat_core::error::{Result, SiteChatError};
use sitechat_core::traits::{Embedder, Generator, TextStream};
use sitechat_core::types::Message;

use crate::gemini::GeminiClient;
use crate::ollama::OllamaClient;
use crate::probe::LocalProbe;
use crate::retry::{with_retry, RetryPolicy};
use crate::sanitize_embed_input;

/// Cloud attempt under the retry policy, then a single local attempt if the
/// exhausted error is a rate limit and the (re-probed) local backend is up.
pub(crate) async fn run_with_failover<T, C, FC, L, FL>(
    retry: &RetryPolicy,
    probe: &LocalProbe,
    what: &str,
    mut cloud: C,
    local: L,
) -> Result<T>
where
    C: FnMut() -> FC,
    FC: Future<Output = Result<T>>,
    L: FnOnce() -> FL,
    FL: Future<Output = Result<T>>,
{
    match with_retry(retry, &mut cloud).await {
        Ok(value) => Ok(value),
        Err(e) if e.is_rate_limit() => {
            probe.reset();
            if probe.is_available().await {
                tracing::info!("Failover: gemini → ollama ({what})");
                local().await
            } else {
                Err(e)
            }
        }
        Err(e) => Err(e),
    }
}

// ── Embeddings ───────────────────────────────────────────────────────────

pub struct EmbeddingRouter {
    gemini: GeminiClient,
    ollama: OllamaClient,
    probe: Arc<LocalProbe>,
    retry: RetryPolicy,
}

impl EmbeddingRouter {
    pub fn new(config: &SiteChatConfig) -> Result<Self> {
        Ok(Self {
            gemini: GeminiClient::new(&config.gemini)?,
            ollama: OllamaClient::new(&config.ollama),
            probe: Arc::new(LocalProbe::new(&config.ollama)),
            retry: RetryPolicy::from(&config.retry),
        })
    }
}

#[async_trait]
impl Embedder for EmbeddingRouter {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let inputs = [text.to_string()];
        let mut vectors = self.embed_batch(&inputs).await?;
        vectors
            .pop()
            .ok_or_else(|| SiteChatError::Provider("No embedding returned".into()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let inputs: Vec<String> = texts.iter().map(|t| sanitize_embed_input(t)).collect();

        let vectors = if self.probe.is_available().await {
            self.ollama.embed_batch(&inputs).await?
        } else {
            run_with_failover(
                &self.retry,
                &self.probe,
                "embeddings",
                || self.gemini.embed_batch(&inputs),
                || self.ollama.embed_batch(&inputs),
            )
            .await?
        };
        ensure_count(inputs.len(), vectors)
    }
}

/// One vector per input or the whole batch fails.
fn ensure_count(sent: usize, vectors: Vec<Vec<f32>>) -> Result<Vec<Vec<f32>>> {
    if vectors.len() != sent {
        return Err(SiteChatError::EmbeddingCountMismatch { sent, received: vectors.len() });
    }
    Ok(vectors)
}

// ── Generation ───────────────────────────────────────────────────────────

pub struct GenerationRouter {
    gemini: GeminiClient,
    ollama: OllamaClient,
    probe: Arc<LocalProbe>,
    retry: RetryPolicy,
}

impl GenerationRouter {
    pub fn new(config: &SiteChatConfig) -> Result<Self> {
        Ok(Self {
            gemini: GeminiClient::new(&config.gemini)?,
            ollama: OllamaClient::new(&config.ollama),
            probe: Arc::new(LocalProbe::new(&config.ollama)),
            retry: RetryPolicy::from(&config.retry),
        })
    }
}

#[async_trait]
impl Generator for GenerationRouter {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn complete(&self, messages: &[Message], system: &str) -> Result<String> {
        if self.probe.is_available().await {
            return self.ollama.complete(messages, system).await;
        }
        run_with_failover(
            &self.retry,
            &self.probe,
            "chat",
            || self.gemini.complete(messages, system),
            || self.ollama.complete(messages, system),
        )
        .await
    }

    async fn complete_stream(&self, messages: &[Message], system: &str) -> Result<TextStream> {
        if self.probe.is_available().await {
            return self.ollama.complete_stream(messages, system).await;
        }

        let (tx, rx) = mpsc::channel(32);
        let gemini = self.gemini.clone();
        let ollama = self.ollama.clone();
        let probe = self.probe.clone();
        let retry = self.retry.clone();
        let messages = messages.to_vec();
        let system = system.to_string();

        tokio::spawn(async move {
            pump_with_failover(
                retry,
                probe,
                || gemini.complete_stream(&messages, &system),
                || ollama.complete_stream(&messages, &system),
                tx,
            )
            .await;
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

/// Drive a cloud stream into `tx`, failing over to the local backend only
/// while nothing has been emitted yet. A mid-stream failure is terminal —
/// switching backends after partial output would replay content.
async fn pump_with_failover<C, FC, L, FL>(
    retry: RetryPolicy,
    probe: Arc<LocalProbe>,
    mut cloud: C,
    local: L,
    tx: mpsc::Sender<Result<String>>,
) where
    C: FnMut() -> FC,
    FC: Future<Output = Result<TextStream>>,
    L: FnOnce() -> FL,
    FL: Future<Output = Result<TextStream>>,
{
    let pre_output_err = match with_retry(&retry, &mut cloud).await {
        Ok(mut stream) => {
            let mut emitted = false;
            let mut failed = None;
            while let Some(item) = stream.next().await {
                match item {
                    Ok(delta) => {
                        emitted = true;
                        if tx.send(Ok(delta)).await.is_err() {
                            return; // consumer went away
                        }
                    }
                    Err(e) => {
                        failed = Some(e);
                        break;
                    }
                }
            }
            match failed {
                None => return,
                Some(e) if !emitted && e.is_rate_limit() => e,
                Some(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            }
        }
        Err(e) if e.is_rate_limit() => e,
        Err(e) => {
            let _ = tx.send(Err(e)).await;
            return;
        }
    };

    probe.reset();
    if !probe.is_available().await {
        let _ = tx.send(Err(pre_output_err)).await;
        return;
    }
    tracing::info!("Failover: gemini → ollama (chat stream)");
    match local().await {
        Ok(mut stream) => {
            while let Some(item) = stream.next().await {
                if tx.send(item).await.is_err() {
                    return;
                }
            }
        }
        Err(e) => {
            let _ = tx.send(Err(e)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn policy() -> RetryPolicy {
        RetryPolicy { max_retries: 3, wait: Duration::from_secs(35) }
    }

    fn rate_limited() -> SiteChatError {
        SiteChatError::Provider("gemini API error 429: RESOURCE_EXHAUSTED".into())
    }

    #[tokio::test(start_paused = true)]
    async fn test_failover_runs_local_after_exhausted_rate_limit() {
        let cloud_calls = AtomicU32::new(0);
        let local_calls = AtomicU32::new(0);
        let probe = LocalProbe::forced(true);
        let started = tokio::time::Instant::now();

        let out = run_with_failover(
            &policy(),
            &probe,
            "test",
            || {
                cloud_calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<&str, _>(rate_limited()) }
            },
            || {
                local_calls.fetch_add(1, Ordering::SeqCst);
                async { Ok("local answer") }
            },
        )
        .await;

        assert_eq!(out.unwrap(), "local answer");
        assert_eq!(cloud_calls.load(Ordering::SeqCst), 4); // 1 + 3 retries
        assert_eq!(local_calls.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::from_secs(105));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failover_surfaces_original_error_when_local_down() {
        let local_calls = AtomicU32::new(0);
        let probe = LocalProbe::forced(false);

        let out: Result<()> = run_with_failover(
            &policy(),
            &probe,
            "test",
            || async { Err(rate_limited()) },
            || {
                local_calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            },
        )
        .await;

        let err = out.unwrap_err();
        assert!(err.is_rate_limit());
        assert_eq!(local_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failover_skips_local_on_non_rate_limit() {
        let cloud_calls = AtomicU32::new(0);
        let local_calls = AtomicU32::new(0);
        let probe = LocalProbe::forced(true);

        let out: Result<()> = run_with_failover(
            &policy(),
            &probe,
            "test",
            || {
                cloud_calls.fetch_add(1, Ordering::SeqCst);
                async { Err(SiteChatError::Provider("gemini API error 500: oops".into())) }
            },
            || {
                local_calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            },
        )
        .await;

        assert!(out.is_err());
        assert_eq!(cloud_calls.load(Ordering::SeqCst), 1);
        assert_eq!(local_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_ensure_count_mismatch() {
        let err = ensure_count(5, vec![vec![0.0]; 3]).unwrap_err();
        assert!(matches!(
            err,
            SiteChatError::EmbeddingCountMismatch { sent: 5, received: 3 }
        ));
        assert!(ensure_count(2, vec![vec![0.0]; 2]).is_ok());
    }

    fn stream_of(items: Vec<Result<String>>) -> TextStream {
        Box::pin(futures::stream::iter(items))
    }

    async fn collect(mut rx: mpsc::Receiver<Result<String>>) -> Vec<Result<String>> {
        let mut out = Vec::new();
        while let Some(item) = rx.recv().await {
            out.push(item);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_failover_before_first_delta() {
        let (tx, rx) = mpsc::channel(32);
        let probe = Arc::new(LocalProbe::forced(true));

        pump_with_failover(
            policy(),
            probe,
            || async { Ok(stream_of(vec![Err(rate_limited())])) },
            || async { Ok(stream_of(vec![Ok("from local".to_string())])) },
            tx,
        )
        .await;

        let items = collect(rx).await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap(), "from local");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_error_after_output_is_terminal() {
        let (tx, rx) = mpsc::channel(32);
        let probe = Arc::new(LocalProbe::forced(true));

        pump_with_failover(
            policy(),
            probe,
            || async {
                Ok(stream_of(vec![Ok("partial".to_string()), Err(rate_limited())]))
            },
            || async { Ok(stream_of(vec![Ok("never".to_string())])) },
            tx,
        )
        .await;

        let items = collect(rx).await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "partial");
        assert!(items[1].is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_acquisition_retries_then_local() {
        let cloud_calls = Arc::new(AtomicU32::new(0));
        let (tx, rx) = mpsc::channel(32);
        let probe = Arc::new(LocalProbe::forced(true));
        let calls = cloud_calls.clone();
        let started = tokio::time::Instant::now();

        pump_with_failover(
            policy(),
            probe,
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(rate_limited()) }
            },
            || async { Ok(stream_of(vec![Ok("ok".to_string())])) },
            tx,
        )
        .await;

        let items = collect(rx).await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap(), "ok");
        assert_eq!(cloud_calls.load(Ordering::SeqCst), 4);
        assert_eq!(started.elapsed(), Duration::from_secs(105));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_terminal_error_when_local_down() {
        let (tx, rx) = mpsc::channel(32);
        let probe = Arc::new(LocalProbe::forced(false));

        pump_with_failover(
            policy(),
            probe,
            || async { Ok(stream_of(vec![Err(rate_limited())])) },
            || async { Ok(stream_of(vec![Ok("never".to_string())])) },
            tx,
        )
        .await;

        let items = collect(rx).await;
        assert_eq!(items.len(), 1);
        assert!(items[0].as_ref().unwrap_err().is_rate_limit());
    }
}

//! Rate-limit retry with a fixed wait.
//!
//! Gemini's 429 responses hint at a ~32s backoff, so the wait is fixed at 35s
//! rather than exponential. Only rate-limit-classified errors are retried;
//! anything else propagates immediately.

use std::future::Future;
use std::time::Duration;

use sitechat_core::config::RetryConfig;
use sitechat_core::error::Result;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub wait: Duration,
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            wait: Duration::from_secs(config.wait_secs),
        }
    }
}

/// Run `op`, retrying up to `policy.max_retries` times on rate-limit errors
/// with the fixed wait between attempts. The wait blocks only the calling
/// task.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.max_retries && e.is_rate_limit() => {
                attempt += 1;
                tracing::warn!(
                    "Rate limited, waiting {}s before retry {}/{}",
                    policy.wait.as_secs(),
                    attempt,
                    policy.max_retries
                );
                tokio::time::sleep(policy.wait).await;
            }
            Err(e) => return Err(e),
        }
    }
}

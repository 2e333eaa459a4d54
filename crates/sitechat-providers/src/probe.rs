//! Cached local-backend reachability probe.
//!
//! The probe runs once per process (bounded to ~2s) and the boolean result is
//! cached until `reset()`. The cache is a pair of relaxed atomics: racing
//! requests may at worst probe twice, which is harmless and idempotent.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use sitechat_core::config::OllamaConfig;

pub struct LocalProbe {
    /// Local fallback disabled entirely when false.
    enabled: bool,
    url: String,
    timeout: Duration,
    checked: AtomicBool,
    available: AtomicBool,
    client: reqwest::Client,
    /// Test hook: bypasses the HTTP probe when set.
    force: Option<bool>,
}

impl LocalProbe {
    pub fn new(config: &OllamaConfig) -> Self {
        let host = std::env::var("OLLAMA_HOST").unwrap_or_else(|_| config.host.clone());
        Self {
            enabled: config.enabled,
            url: format!("{}/api/tags", host.trim_end_matches('/')),
            timeout: Duration::from_secs(config.probe_timeout_secs),
            checked: AtomicBool::new(false),
            available: AtomicBool::new(false),
            client: reqwest::Client::new(),
            force: None,
        }
    }

    /// Whether the local backend should receive traffic. First call probes,
    /// later calls read the cached result.
    pub async fn is_available(&self) -> bool {
        if !self.enabled {
            return false;
        }
        if let Some(forced) = self.force {
            return forced;
        }
        if self.checked.load(Ordering::Relaxed) {
            return self.available.load(Ordering::Relaxed);
        }
        let ok = self.check_now().await;
        self.available.store(ok, Ordering::Relaxed);
        self.checked.store(true, Ordering::Relaxed);
        if ok {
            tracing::info!("Local Ollama backend reachable at {}", self.url);
        }
        ok
    }

    async fn check_now(&self) -> bool {
        self.client
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    /// Drop the cached result so the next call re-probes. Invoked by the
    /// failover controller after a rate-limit exhausts its cloud retries.
    pub fn reset(&self) {
        self.checked.store(false, Ordering::Relaxed);
        self.available.store(false, Ordering::Relaxed);
    }

    #[cfg(test)]
    pub(crate) fn forced(available: bool) -> Self {
        Self {
            enabled: true,
            url: String::new(),
            timeout: Duration::from_secs(2),
            checked: AtomicBool::new(false),
            available: AtomicBool::new(false),
            client: reqwest::Client::new(),
            force: Some(available),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_probe_is_never_available() {
        let probe = LocalProbe::new(&OllamaConfig::default());
        assert!(!probe.is_available().await);
    }

    #[tokio::test]
    async fn test_forced_probe_bypasses_network() {
        let probe = LocalProbe::forced(true);
        assert!(probe.is_available().await);
        probe.reset();
        assert!(probe.is_available().await);

        let probe = LocalProbe::forced(false);
        assert!(!probe.is_available().await);
    }
}

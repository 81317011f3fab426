//! Rate-limited, cached, retrying fetch layer.
//!
//! Every outbound HTTP call in the pipeline goes through
//! [`RateLimitedFetcher`]: workers run concurrently, but the minimum
//! inter-request interval is enforced here, in one place. Responses for
//! single-resource lookups are cached with a TTL; paginated pulls disable
//! caching at the call site.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use plenario_api::{CamaraClient, TransparenciaClient};

use crate::cache::DiskCache;
use crate::config::FetchConfig;
use crate::error::PipelineError;
use crate::shutdown::CancelFlag;

/// Which upstream a request targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Upstream {
    /// Câmara dos Deputados open-data API.
    Camara,
    /// Portal da Transparência API (requires an API key).
    Transparencia,
}

#[derive(Clone, Copy)]
enum ClientRef<'a> {
    Camara(&'a CamaraClient),
    Transparencia(&'a TransparenciaClient),
}

/// Shared fetch layer: one per run, cloned via `Arc` into every worker.
pub struct RateLimitedFetcher {
    camara: CamaraClient,
    transparencia: Option<TransparenciaClient>,
    cache: Arc<DiskCache>,
    cfg: FetchConfig,
    /// Timestamp of the last outbound request; the lock is held through the
    /// interval sleep so concurrent workers queue up behind it.
    last_request: Mutex<Option<Instant>>,
    tracker: RequestTracker,
    cancel: CancelFlag,
}

impl RateLimitedFetcher {
    pub fn new(
        camara: CamaraClient,
        transparencia: Option<TransparenciaClient>,
        cache: Arc<DiskCache>,
        cfg: FetchConfig,
        cancel: CancelFlag,
    ) -> Self {
        Self {
            camara,
            transparencia,
            cache,
            cfg,
            last_request: Mutex::new(None),
            tracker: RequestTracker::new(),
            cancel,
        }
    }

    /// Request-outcome counters for operator reporting.
    pub fn tracker(&self) -> &RequestTracker {
        &self.tracker
    }

    /// Fetches a JSON resource with the default API TTL and timeout.
    pub async fn fetch_json(
        &self,
        upstream: Upstream,
        path: &str,
        params: &[(String, String)],
        use_cache: bool,
    ) -> Result<serde_json::Value, PipelineError> {
        self.fetch_json_with_opts(upstream, path, params, use_cache, self.cfg.api_ttl(), None)
            .await
    }

    /// Fetches a JSON resource, caching successful responses for `ttl`,
    /// with an optional per-call timeout override.
    ///
    /// A cache hit within the TTL returns the stored bytes without any
    /// network call.
    pub async fn fetch_json_with_opts(
        &self,
        upstream: Upstream,
        path: &str,
        params: &[(String, String)],
        use_cache: bool,
        ttl: Duration,
        timeout: Option<Duration>,
    ) -> Result<serde_json::Value, PipelineError> {
        let client = self.client_for(upstream)?;
        let base = match client {
            ClientRef::Camara(c) => c.base_url(),
            ClientRef::Transparencia(c) => c.base_url(),
        };
        let key = DiskCache::key_for(&format!("{}{}", base, path), params);

        if use_cache {
            if let Some(bytes) = self.cache.get(&key) {
                self.tracker.record_cache_hit();
                tracing::debug!("cache hit: {}{}", base, path);
                return serde_json::from_slice(&bytes)
                    .map_err(|e| PipelineError::Cache(format!("corrupt cache entry: {}", e)));
            }
        }

        let value = self
            .with_retry(path, || async move {
                match client {
                    ClientRef::Camara(c) => c.get_json(path, params, timeout).await,
                    ClientRef::Transparencia(c) => c.get_json(path, params, timeout).await,
                }
            })
            .await?;

        if use_cache {
            match serde_json::to_vec(&value) {
                Ok(bytes) => {
                    if let Err(e) = self.cache.put(&key, &bytes, Some(ttl)) {
                        tracing::warn!("failed to cache response for {}: {}", path, e);
                    }
                }
                Err(e) => tracing::warn!("failed to serialize response for cache: {}", e),
            }
        }

        Ok(value)
    }

    /// Downloads a bulk payload (ZIP archive, JSON dump) with browser-like
    /// headers, cached under the URL with the bulk TTL.
    pub async fn fetch_bytes(&self, url: &str, use_cache: bool) -> Result<Vec<u8>, PipelineError> {
        let key = DiskCache::key_for(url, &[]);

        if use_cache {
            if let Some(bytes) = self.cache.get(&key) {
                self.tracker.record_cache_hit();
                tracing::debug!("cache hit for download: {}", url);
                return Ok(bytes);
            }
        }

        let (bytes, _content_type) = self
            .with_retry(url, || plenario_api::download_bytes(url))
            .await?;

        if use_cache {
            if let Err(e) = self.cache.put(&key, &bytes, Some(self.cfg.bulk_ttl())) {
                tracing::warn!("failed to cache download {}: {}", url, e);
            }
        }

        Ok(bytes)
    }

    fn client_for(&self, upstream: Upstream) -> Result<ClientRef<'_>, PipelineError> {
        match upstream {
            Upstream::Camara => Ok(ClientRef::Camara(&self.camara)),
            Upstream::Transparencia => self
                .transparencia
                .as_ref()
                .map(ClientRef::Transparencia)
                .ok_or_else(|| {
                    PipelineError::Config("no Transparência API key configured".to_string())
                }),
        }
    }

    /// Sleeps until the minimum inter-request interval has elapsed, then
    /// stamps the request. The lock is held through the sleep so concurrent
    /// callers serialize here.
    async fn rate_limit(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            let min = self.cfg.min_interval();
            if elapsed < min {
                sleep(min - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// Runs `f` with rate limiting, a single cooldown retry on HTTP 429,
    /// and exponential backoff with jitter on transient network errors.
    /// Other HTTP failures return immediately.
    async fn with_retry<T, F, Fut>(&self, label: &str, f: F) -> Result<T, PipelineError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, plenario_api::Error>>,
    {
        let mut transient_attempts = 0usize;
        let mut rate_limit_retried = false;

        loop {
            if self.cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            self.rate_limit().await;

            match f().await {
                Ok(value) => {
                    self.tracker.record_success();
                    return Ok(value);
                }
                Err(e) if e.is_rate_limited() => {
                    self.tracker.record_rate_limited();
                    if rate_limit_retried {
                        return Err(PipelineError::RateLimited);
                    }
                    rate_limit_retried = true;
                    let cooldown = self.cfg.rate_limit_cooldown();
                    tracing::warn!(
                        "{} rate limited, cooling down {:.1}s before one retry",
                        label,
                        cooldown.as_secs_f64()
                    );
                    self.tracker.record_backoff(cooldown);
                    sleep(cooldown).await;
                }
                Err(plenario_api::Error::RequestFailed) => {
                    transient_attempts += 1;
                    if transient_attempts > self.cfg.max_retries {
                        self.tracker.record_failure();
                        return Err(PipelineError::TransientNetwork(format!(
                            "{}: retries exhausted after {} attempts",
                            label, transient_attempts
                        )));
                    }
                    let delay = self.delay_for_attempt(transient_attempts);
                    tracing::warn!(
                        "{} request failed (attempt {}/{}), retrying in {:.1}s",
                        label,
                        transient_attempts,
                        self.cfg.max_retries,
                        delay.as_secs_f64()
                    );
                    self.tracker.record_backoff(delay);
                    sleep(delay).await;
                }
                Err(other) => {
                    self.tracker.record_failure();
                    return Err(other.into());
                }
            }
        }
    }

    /// Exponential backoff with 0.8-1.2x jitter, capped at the configured
    /// ceiling.
    fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let shift = (attempt.saturating_sub(1)).min(30) as u32;
        let exp = 1u64 << shift;
        let base = self
            .cfg
            .base_backoff_ms
            .saturating_mul(exp)
            .min(self.cfg.max_backoff_ms);
        let jitter = rand::thread_rng().gen_range(0.8..1.2);
        Duration::from_millis((base as f64 * jitter) as u64)
    }
}

/// Atomic counters tracking request outcomes across a run.
pub struct RequestTracker {
    requests_made: AtomicU64,
    requests_succeeded: AtomicU64,
    requests_rate_limited: AtomicU64,
    requests_failed: AtomicU64,
    cache_hits: AtomicU64,
    /// Cumulative backoff time in milliseconds.
    total_backoff_ms: AtomicU64,
}

impl RequestTracker {
    fn new() -> Self {
        Self {
            requests_made: AtomicU64::new(0),
            requests_succeeded: AtomicU64::new(0),
            requests_rate_limited: AtomicU64::new(0),
            requests_failed: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            total_backoff_ms: AtomicU64::new(0),
        }
    }

    pub fn record_success(&self) {
        self.requests_made.fetch_add(1, Ordering::Relaxed);
        self.requests_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limited(&self) {
        self.requests_made.fetch_add(1, Ordering::Relaxed);
        self.requests_rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.requests_made.fetch_add(1, Ordering::Relaxed);
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_backoff(&self, duration: Duration) {
        self.total_backoff_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    /// Snapshot the current counters.
    pub fn summary(&self) -> TrackerSummary {
        TrackerSummary {
            requests_made: self.requests_made.load(Ordering::Relaxed),
            requests_succeeded: self.requests_succeeded.load(Ordering::Relaxed),
            requests_rate_limited: self.requests_rate_limited.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            total_backoff_secs: self.total_backoff_ms.load(Ordering::Relaxed) as f64 / 1000.0,
        }
    }
}

/// Immutable snapshot of tracker counters for display.
#[derive(Debug, Clone)]
pub struct TrackerSummary {
    pub requests_made: u64,
    pub requests_succeeded: u64,
    pub requests_rate_limited: u64,
    pub requests_failed: u64,
    pub cache_hits: u64,
    pub total_backoff_secs: f64,
}

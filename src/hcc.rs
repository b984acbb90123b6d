//! HTTP Client with Conditional Cache (HCC). Upstream HTTP with retries,
//! primary/backup failover, `If-Modified-Since` + content caching, and
//! rate-limit shaping. Grounded line-for-line on
//! `original_source/utils/base_api.py`.

use crate::error::{BotError, BotResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};

const SHORT_TTL_SECS: u64 = 60;
const LONG_TTL_SECS: u64 = 86_400;
const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(100);
const MAX_CONCURRENT_REQUESTS: usize = 50;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const RETRY_BACKOFFS_MS: [u64; 3] = [1_000, 2_000, 4_000];

#[derive(Clone)]
struct ContentCacheEntry {
    bytes: Vec<u8>,
    stored_at: Instant,
    ttl: Duration,
}

impl ContentCacheEntry {
    fn is_fresh(&self) -> bool {
        self.stored_at.elapsed() < self.ttl
    }
}

pub struct HccResponse {
    pub bytes: Vec<u8>,
    pub degraded: bool,
}

/// Builds the cache key `(endpoint, sorted-params)` as a single string, the
/// same normalization `base_api.py` relies on so cache hits are stable
/// regardless of the caller's param insertion order.
pub fn cache_key(endpoint: &str, params: &[(&str, &str)]) -> String {
    let mut sorted: Vec<&(&str, &str)> = params.iter().collect();
    sorted.sort_by_key(|(k, _)| *k);
    let joined = sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    format!("{endpoint}?{joined}")
}

pub struct Hcc {
    client: reqwest::Client,
    primary_base: String,
    backup_base: Option<String>,
    using_backup: AtomicBool,
    min_interval: Duration,
    last_request_at: Mutex<Instant>,
    semaphore: Arc<Semaphore>,
    content_cache: Mutex<HashMap<String, ContentCacheEntry>>,
    lm_cache: Mutex<HashMap<String, String>>,
    user_agent: String,
}

impl Hcc {
    pub fn new(primary_base: String, backup_base: Option<String>) -> BotResult<Self> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(5)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BotError::Internal(format!("failed to build http client: {e}")))?;
        Ok(Self {
            client,
            primary_base,
            backup_base,
            using_backup: AtomicBool::new(false),
            min_interval: MIN_REQUEST_INTERVAL,
            last_request_at: Mutex::new(Instant::now() - MIN_REQUEST_INTERVAL),
            semaphore: Arc::new(Semaphore::new(MAX_CONCURRENT_REQUESTS)),
            content_cache: Mutex::new(HashMap::new()),
            lm_cache: Mutex::new(HashMap::new()),
            user_agent: "TheFinals-Bot/1.0".to_string(),
        })
    }

    fn active_base(&self) -> &str {
        if self.using_backup.load(Ordering::SeqCst) {
            self.backup_base.as_deref().unwrap_or(&self.primary_base)
        } else {
            &self.primary_base
        }
    }

    /// One-shot, one-direction latch: primary -> backup only. Open question
    /// #3 resolved this way per SPEC_FULL §4.13.
    fn switch_to_backup(&self) {
        if self.backup_base.is_some() {
            self.using_backup.store(true, Ordering::SeqCst);
        }
    }

    /// Explicit recovery path, not present in the source; an operator-only
    /// addition recorded in DESIGN.md.
    pub fn reset_to_primary(&self) {
        self.using_backup.store(false, Ordering::SeqCst);
    }

    async fn shape_rate(&self) {
        let _permit = self.semaphore.acquire().await;
        let mut last = self.last_request_at.lock().await;
        let elapsed = last.elapsed();
        if elapsed < self.min_interval {
            tokio::time::sleep(self.min_interval - elapsed).await;
        }
        *last = Instant::now();
    }

    pub async fn get(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
        use_cache: bool,
        cache_ttl: Option<Duration>,
    ) -> BotResult<HccResponse> {
        let key = cache_key(endpoint, params);

        if use_cache {
            let cache = self.content_cache.lock().await;
            if let Some(entry) = cache.get(&key) {
                if entry.is_fresh() {
                    return Ok(HccResponse { bytes: entry.bytes.clone(), degraded: false });
                }
            }
        }

        let lm = self.lm_cache.lock().await.get(&key).cloned();
        match self.send_with_retry(endpoint, params, lm.as_deref()).await {
            Ok(FetchOutcome::NotModified) => self.handle_not_modified(endpoint, params, &key).await,
            Ok(FetchOutcome::Success { bytes, last_modified }) => {
                self.store_success(&key, bytes.clone(), last_modified).await;
                Ok(HccResponse { bytes, degraded: false })
            }
            Err(e) => self.handle_failure(&key, e).await,
        }
    }

    async fn handle_not_modified(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
        key: &str,
    ) -> BotResult<HccResponse> {
        let mut cache = self.content_cache.lock().await;
        if let Some(entry) = cache.get_mut(key) {
            entry.ttl = Duration::from_secs(LONG_TTL_SECS);
            entry.stored_at = Instant::now();
            return Ok(HccResponse { bytes: entry.bytes.clone(), degraded: false });
        }
        drop(cache);
        // Inconsistency: LM existed but content cache didn't. Re-issue once
        // with no If-Modified-Since.
        match self.send_with_retry(endpoint, params, None).await {
            Ok(FetchOutcome::Success { bytes, last_modified }) => {
                self.store_success(key, bytes.clone(), last_modified).await;
                Ok(HccResponse { bytes, degraded: false })
            }
            Ok(FetchOutcome::NotModified) => Err(BotError::Internal(
                "upstream returned 304 with no prior cache entry".into(),
            )),
            Err(e) => self.handle_failure(key, e).await,
        }
    }

    async fn store_success(&self, key: &str, bytes: Vec<u8>, last_modified: Option<String>) {
        match last_modified {
            Some(lm) => {
                self.content_cache.lock().await.insert(
                    key.to_string(),
                    ContentCacheEntry { bytes, stored_at: Instant::now(), ttl: Duration::from_secs(LONG_TTL_SECS) },
                );
                self.lm_cache.lock().await.insert(key.to_string(), lm);
            }
            None => {
                self.content_cache.lock().await.insert(
                    key.to_string(),
                    ContentCacheEntry { bytes, stored_at: Instant::now(), ttl: Duration::from_secs(SHORT_TTL_SECS) },
                );
                self.lm_cache.lock().await.remove(key);
            }
        }
    }

    async fn handle_failure(&self, key: &str, err: BotError) -> BotResult<HccResponse> {
        let cache = self.content_cache.lock().await;
        if let Some(entry) = cache.get(key) {
            tracing::warn!(key, "serving stale cache after upstream failure");
            return Ok(HccResponse { bytes: entry.bytes.clone(), degraded: true });
        }
        drop(cache);
        self.switch_to_backup();
        Err(err)
    }

    async fn send_with_retry(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
        if_modified_since: Option<&str>,
    ) -> BotResult<FetchOutcome> {
        let mut last_err = None;
        for (attempt, backoff_ms) in std::iter::once(0).chain(RETRY_BACKOFFS_MS).enumerate() {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
            }
            self.shape_rate().await;
            match self.send_once(endpoint, params, if_modified_since).await {
                Ok(outcome) => return Ok(outcome),
                Err(e @ BotError::FatalUpstream { .. }) => return Err(e),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| BotError::TransientUpstream("exhausted retries".into())))
    }

    /// Non-cacheable write. Shares retry/backoff and backup failover with
    /// `get`, but never touches the content or LM cache — a write response
    /// has nothing worth keying on a `(endpoint, params)` cache key.
    pub async fn post(&self, endpoint: &str, body: &serde_json::Value) -> BotResult<HccResponse> {
        self.write_with_retry(reqwest::Method::POST, endpoint, Some(body)).await
    }

    pub async fn put(&self, endpoint: &str, body: &serde_json::Value) -> BotResult<HccResponse> {
        self.write_with_retry(reqwest::Method::PUT, endpoint, Some(body)).await
    }

    pub async fn delete(&self, endpoint: &str) -> BotResult<HccResponse> {
        self.write_with_retry(reqwest::Method::DELETE, endpoint, None).await
    }

    async fn write_with_retry(
        &self,
        method: reqwest::Method,
        endpoint: &str,
        body: Option<&serde_json::Value>,
    ) -> BotResult<HccResponse> {
        let mut last_err = None;
        for (attempt, backoff_ms) in std::iter::once(0).chain(RETRY_BACKOFFS_MS).enumerate() {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
            }
            self.shape_rate().await;
            match self.send_once_write(method.clone(), endpoint, body).await {
                Ok(bytes) => return Ok(HccResponse { bytes, degraded: false }),
                Err(e @ BotError::FatalUpstream { .. }) => return Err(e),
                Err(e) => last_err = Some(e),
            }
        }
        let err = last_err.unwrap_or_else(|| BotError::TransientUpstream("exhausted retries".into()));
        self.switch_to_backup();
        Err(err)
    }

    async fn send_once_write(
        &self,
        method: reqwest::Method,
        endpoint: &str,
        body: Option<&serde_json::Value>,
    ) -> BotResult<Vec<u8>> {
        let url = format!("{}{}", self.active_base(), endpoint);
        let mut req = self
            .client
            .request(method, &url)
            .header("Accept", "application/json")
            .header("User-Agent", &self.user_agent);
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() {
                BotError::TransientUpstream(format!("request failed: {e}"))
            } else {
                BotError::TransientUpstream(format!("request error: {e}"))
            }
        })?;

        let status = resp.status();
        if status.is_server_error() {
            return Err(BotError::TransientUpstream(format!("upstream 5xx: {status}")));
        }
        if status.is_client_error() && status.as_u16() != 404 {
            return Err(BotError::FatalUpstream { status: status.as_u16(), message: status.to_string() });
        }
        if status.as_u16() == 404 {
            return Err(BotError::NotFound(endpoint.to_string()));
        }

        resp.bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| BotError::TransientUpstream(format!("failed reading body: {e}")))
    }

    async fn send_once(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
        if_modified_since: Option<&str>,
    ) -> BotResult<FetchOutcome> {
        let url = format!("{}{}", self.active_base(), endpoint);
        let mut req = self
            .client
            .get(&url)
            .query(params)
            .header("Accept", "application/json")
            .header("User-Agent", &self.user_agent);
        if let Some(lm) = if_modified_since {
            req = req.header("If-Modified-Since", lm);
        }

        let resp = req.send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() {
                BotError::TransientUpstream(format!("request failed: {e}"))
            } else {
                BotError::TransientUpstream(format!("request error: {e}"))
            }
        })?;

        let status = resp.status();
        if status.as_u16() == 304 {
            return Ok(FetchOutcome::NotModified);
        }
        if status.is_server_error() {
            return Err(BotError::TransientUpstream(format!("upstream 5xx: {status}")));
        }
        if status.is_client_error() && status.as_u16() != 404 {
            return Err(BotError::FatalUpstream { status: status.as_u16(), message: status.to_string() });
        }
        if status.as_u16() == 404 {
            return Err(BotError::NotFound(endpoint.to_string()));
        }

        let last_modified = resp
            .headers()
            .get("Last-Modified")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| BotError::TransientUpstream(format!("failed reading body: {e}")))?
            .to_vec();
        Ok(FetchOutcome::Success { bytes, last_modified })
    }
}

enum FetchOutcome {
    NotModified,
    Success { bytes: Vec<u8>, last_modified: Option<String> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_is_order_independent() {
        let a = cache_key("/v1/leaderboard/s6", &[("platform", "crossplay"), ("page", "1")]);
        let b = cache_key("/v1/leaderboard/s6", &[("page", "1"), ("platform", "crossplay")]);
        assert_eq!(a, b);
    }

    #[test]
    fn entry_freshness_respects_ttl() {
        let entry = ContentCacheEntry {
            bytes: vec![],
            stored_at: Instant::now() - Duration::from_secs(61),
            ttl: Duration::from_secs(60),
        };
        assert!(!entry.is_fresh());
        let entry = ContentCacheEntry {
            bytes: vec![],
            stored_at: Instant::now(),
            ttl: Duration::from_secs(60),
        };
        assert!(entry.is_fresh());
    }

    #[tokio::test]
    async fn backup_latch_is_one_directional() {
        let hcc = Hcc::new("https://primary.example".into(), Some("https://backup.example".into())).unwrap();
        assert_eq!(hcc.active_base(), "https://primary.example");
        hcc.switch_to_backup();
        assert_eq!(hcc.active_base(), "https://backup.example");
        hcc.reset_to_primary();
        assert_eq!(hcc.active_base(), "https://primary.example");
    }
}

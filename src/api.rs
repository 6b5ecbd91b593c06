//! Cached, coalesced reads of the upstream repository API through the relay.
//!
//! Uses its own store (50 entries, 2 minute TTL), separate from the
//! translation store. Keys are the request path plus its encoded query, so
//! `clear_by_prefix("/search/")` drops every cached search page.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use serde_json::Value;
use tracing::debug;

use crate::cache::{CacheStats, CoalescingCache, ExpiringCacheStore};
use crate::metrics::{metric_names, MetricsRegistry};

pub const API_CACHE_CAPACITY: usize = 50;
pub const API_CACHE_TTL: Duration = Duration::from_secs(2 * 60);

#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    #[error("invalid request url: {0}")]
    InvalidUrl(String),
    #[error("upstream request failed: {0}")]
    Transport(String),
    #[error("upstream answered {status}: {detail}")]
    Status { status: u16, detail: String },
    #[error("upstream answered invalid JSON: {0}")]
    Decode(String),
}

pub struct UpstreamClient {
    http: reqwest::Client,
    /// Relay passthrough prefix, e.g. `http://localhost:5174/upstream`.
    base_url: String,
    cache: CoalescingCache<String, Value, ApiError>,
    metrics: Arc<MetricsRegistry>,
}

impl UpstreamClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        Self::with_store(
            base_url,
            ExpiringCacheStore::new(API_CACHE_CAPACITY, API_CACHE_TTL),
        )
    }

    pub fn with_store(
        base_url: impl Into<String>,
        store: ExpiringCacheStore<String, Value>,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(crate::config::DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            cache: CoalescingCache::new(Arc::new(store)),
            metrics: Arc::new(MetricsRegistry::new()),
        })
    }

    /// GET `path` with `query`, served from cache when fresh. Concurrent calls
    /// for the same request share one fetch; failures are not cached.
    pub async fn get_json(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, ApiError> {
        let url = self.request_url(path, query)?;
        let key = cache_key(path, &url);

        let http = self.http.clone();
        let metrics = Arc::clone(&self.metrics);
        self.cache
            .resolve(key, move || async move {
                let timer = metrics.timer(metric_names::UPSTREAM_FETCH);
                let fetched = fetch_json(&http, url).await;
                timer.finish(&fetched);
                fetched
            })
            .await
    }

    /// Drop cached responses whose path starts with `prefix`.
    pub fn clear_by_prefix(&self, prefix: &str) -> usize {
        let removed = self.cache.store().remove_by_prefix(prefix);
        debug!(prefix, removed, "api cache entries cleared");
        removed
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.store().stats()
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    fn request_url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, ApiError> {
        let raw = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut url = Url::parse(&raw).map_err(|e| ApiError::InvalidUrl(format!("{raw}: {e}")))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query.iter().copied());
        }
        Ok(url)
    }
}

/// `/path?query` relative to the relay prefix.
fn cache_key(path: &str, url: &Url) -> String {
    let path = path.trim_start_matches('/');
    match url.query() {
        Some(query) => format!("/{path}?{query}"),
        None => format!("/{path}"),
    }
}

async fn fetch_json(http: &reqwest::Client, url: Url) -> Result<Value, ApiError> {
    let response = http
        .get(url)
        .send()
        .await
        .map_err(|e| ApiError::Transport(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let detail = response.text().await.unwrap_or_default();
        return Err(ApiError::Status {
            status: status.as_u16(),
            detail: detail.chars().take(200).collect(),
        });
    }

    response
        .json()
        .await
        .map_err(|e| ApiError::Decode(e.to_string()))
}

/// Apple public key cache
///
/// Holds the last fetched JWKS for a bounded freshness window. A stale
/// cache, or a fresh cache that lacks the requested `kid`, triggers one
/// fetch that replaces the whole set.
use crate::{
    apple::{AppleJwk, AppleKeySet},
    error::{AppError, AppResult, AppleAuthError},
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::StatusCode;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Source of Apple's key set
#[async_trait]
pub trait KeySetSource: Send + Sync {
    async fn fetch(&self) -> Result<AppleKeySet, AppleAuthError>;
}

/// Fetches the key set over HTTPS
#[derive(Clone)]
pub struct HttpKeySetSource {
    http_client: reqwest::Client,
    url: String,
}

impl HttpKeySetSource {
    /// Create a source with a request timeout; a timeout is reported as a fetch failure
    pub fn new(url: impl Into<String>, timeout: std::time::Duration) -> AppResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("YachtLife/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl KeySetSource for HttpKeySetSource {
    async fn fetch(&self) -> Result<AppleKeySet, AppleAuthError> {
        let response = self
            .http_client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| AppleAuthError::KeyFetchFailed(format!("request to {} failed: {}", self.url, e)))?;

        if response.status() != StatusCode::OK {
            return Err(AppleAuthError::KeyFetchFailed(format!(
                "Apple keys endpoint returned status {}",
                response.status()
            )));
        }

        response
            .json::<AppleKeySet>()
            .await
            .map_err(|e| AppleAuthError::KeyFetchFailed(format!("Invalid key set: {}", e)))
    }
}

/// A fetched key set and when it was fetched
#[derive(Debug, Clone)]
pub struct CachedKeySet {
    pub keys: AppleKeySet,
    pub fetched_at: DateTime<Utc>,
}

impl CachedKeySet {
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.fetched_at < ttl
    }

    pub fn find(&self, kid: &str) -> Option<&AppleJwk> {
        self.keys.find(kid)
    }
}

/// In-memory Apple key cache owned by a verifier
pub struct AppleKeyCache {
    source: Arc<dyn KeySetSource>,
    ttl: Duration,
    current: RwLock<Option<Arc<CachedKeySet>>>,
    /// Serializes refreshes so concurrent misses share one fetch
    refresh_lock: Mutex<()>,
}

impl AppleKeyCache {
    /// Create a cache with the default 24 hour freshness window
    pub fn new(source: Arc<dyn KeySetSource>) -> Self {
        Self {
            source,
            ttl: Duration::hours(24),
            current: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Set a custom freshness window
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Current cached set, fresh or not
    pub async fn snapshot(&self) -> Option<Arc<CachedKeySet>> {
        self.current.read().await.clone()
    }

    /// Find the key for `kid`, fetching at most once
    pub async fn key_for(&self, kid: &str, now: DateTime<Utc>) -> Result<AppleJwk, AppleAuthError> {
        let observed = self.snapshot().await;

        if let Some(set) = &observed {
            if set.is_fresh(now, self.ttl) {
                if let Some(key) = set.find(kid) {
                    return Ok(key.clone());
                }
                debug!("kid {} not in cached Apple key set, refetching", kid);
            } else {
                debug!("Apple key set fetched at {} is stale", set.fetched_at);
            }
        }

        let refreshed = self
            .refresh_if_unchanged(observed.map(|set| set.fetched_at), now)
            .await?;

        refreshed.find(kid).cloned().ok_or_else(|| {
            warn!("kid {} not found in freshly fetched Apple key set", kid);
            AppleAuthError::KeyNotFound(kid.to_string())
        })
    }

    /// Unconditionally fetch and replace the cached set
    pub async fn refresh(&self, now: DateTime<Utc>) -> Result<Arc<CachedKeySet>, AppleAuthError> {
        let _guard = self.refresh_lock.lock().await;
        self.fetch_and_store(now).await
    }

    /// Fetch unless another task replaced the set while we waited for the lock
    async fn refresh_if_unchanged(
        &self,
        observed: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Arc<CachedKeySet>, AppleAuthError> {
        let _guard = self.refresh_lock.lock().await;

        if let Some(current) = self.snapshot().await {
            if Some(current.fetched_at) != observed && current.is_fresh(now, self.ttl) {
                debug!("Reusing Apple key set refreshed by a concurrent request");
                return Ok(current);
            }
        }

        self.fetch_and_store(now).await
    }

    async fn fetch_and_store(&self, now: DateTime<Utc>) -> Result<Arc<CachedKeySet>, AppleAuthError> {
        let keys = self.source.fetch().await.map_err(|e| {
            warn!("Apple key set fetch failed: {}", e);
            e
        })?;

        let set = Arc::new(CachedKeySet {
            keys,
            fetched_at: now,
        });
        *self.current.write().await = Some(Arc::clone(&set));

        info!("Refreshed Apple public key cache ({} keys)", set.keys.keys.len());

        Ok(set)
    }
}

//! Remote fetcher: read-only tracker queries with retry and a freshness window.
//!
//! The fetcher knows nothing about the local stores and never writes. A
//! request is tried once plus up to `max_retries` more times with a fixed
//! delay; the result is then cached per query for the freshness window.

use crate::error::AppError;
use crate::models::{EntityCollection, EntityKind, ProjectStats, SyncSettings};
use crate::services::query_cache::{CachePolicy, Freshness, QueryCache};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Retries after the first failed attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Fixed pause between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Retry behaviour for remote reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Parameters of one remote query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FetchParams {
    pub project_key: String,
    pub max_results: u32,
    pub proxy_url: Option<String>,
}

impl FetchParams {
    /// Query parameters for the configured project, if one is set.
    pub fn from_settings(settings: &SyncSettings) -> Option<Self> {
        settings.project_key.as_ref().map(|key| Self {
            project_key: key.clone(),
            max_results: settings.max_results,
            proxy_url: settings.proxy_url.clone(),
        })
    }
}

/// The tracker API boundary.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// One page (at most `max_results`) of entities of `kind`.
    async fn fetch_entities(
        &self,
        kind: EntityKind,
        params: &FetchParams,
    ) -> Result<EntityCollection, AppError>;

    /// Issue counts for the project.
    async fn fetch_stats(&self, params: &FetchParams) -> Result<ProjectStats, AppError>;
}

/// Retrying, caching front for a [`RemoteSource`].
pub struct RemoteFetcher {
    source: Arc<dyn RemoteSource>,
    retry: RetryPolicy,
    entities: QueryCache<(EntityKind, FetchParams), EntityCollection>,
    stats: QueryCache<FetchParams, ProjectStats>,
}

impl RemoteFetcher {
    pub fn new(source: Arc<dyn RemoteSource>, retry: RetryPolicy, cache: CachePolicy) -> Self {
        Self {
            source,
            retry,
            entities: QueryCache::new(cache),
            stats: QueryCache::new(cache),
        }
    }

    /// Fetch entities of `kind`, serving a fresh cached result when there is one.
    pub async fn fetch(
        &self,
        kind: EntityKind,
        params: &FetchParams,
    ) -> Result<EntityCollection, AppError> {
        let key = (kind, params.clone());
        if let Some(cached) = self.entities.get_fresh(&key) {
            log::debug!("[fetch] Serving cached {} for {}", kind, params.project_key);
            return Ok(cached);
        }

        let label = format!("{} for {}", kind, params.project_key);
        let fetched = self
            .with_retry(&label, || self.source.fetch_entities(kind, params))
            .await?;
        log::info!("[fetch] Fetched {} {}(s) for {}", fetched.len(), kind, params.project_key);

        self.prune();
        self.entities.insert(key, fetched.clone());
        Ok(fetched)
    }

    /// Fetch project statistics under the same retry and cache policy.
    pub async fn fetch_stats(&self, params: &FetchParams) -> Result<ProjectStats, AppError> {
        if let Some(cached) = self.stats.get_fresh(params) {
            return Ok(cached);
        }

        let label = format!("stats for {}", params.project_key);
        let stats = self
            .with_retry(&label, || self.source.fetch_stats(params))
            .await?;

        self.prune();
        self.stats.insert(params.clone(), stats);
        Ok(stats)
    }

    /// Forget cached results for `kind`, so the next fetch goes to the network.
    pub fn invalidate(&self, kind: EntityKind) {
        let dropped = self.entities.invalidate_where(|(k, _)| *k == kind);
        if kind == EntityKind::Issue {
            self.stats.invalidate_where(|_| true);
        }
        log::debug!("[fetch] Invalidated {} cached {} result(s)", dropped, kind);
    }

    pub fn freshness(&self, kind: EntityKind, params: &FetchParams) -> Freshness {
        self.entities.freshness(&(kind, params.clone()))
    }

    /// Evict results past the retention window. Runs before every insert, so
    /// keys that are never asked for again still leave the cache.
    pub fn prune(&self) -> usize {
        let evicted = self.entities.prune() + self.stats.prune();
        if evicted > 0 {
            log::debug!("[fetch] Evicted {} expired cached result(s)", evicted);
        }
        evicted
    }

    async fn with_retry<T, F, Fut>(&self, label: &str, mut attempt_fn: F) -> Result<T, AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let mut attempt = 1;
        loop {
            match attempt_fn().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt <= self.retry.max_retries => {
                    log::warn!(
                        "[fetch] Attempt {} for {} failed, retrying in {:?}: {}",
                        attempt,
                        label,
                        self.retry.delay,
                        e
                    );
                    tokio::time::sleep(self.retry.delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    log::error!(
                        "[fetch] Giving up on {} after {} attempt(s): {}",
                        label,
                        attempt,
                        e
                    );
                    return Err(AppError::remote_fetch_failed(&e, attempt));
                }
            }
        }
    }
}

//! Reconciler: merges remote results with local store contents.
//!
//! Local data always wins. The tracker is only asked when the local
//! collection is empty and remote sync is enabled for the kind, and a
//! successful non-empty fetch is persisted once so later reads stay local.

use crate::error::AppError;
use crate::models::{EntityCollection, EntityKind, ProjectStats, SyncSettings};
use crate::services::invalidation::{InvalidationBus, Topic};
use crate::services::local_store::{LocalStore, StoreSource};
use crate::services::remote_fetcher::{FetchParams, RemoteFetcher};
use crate::services::settings::load_settings;
use serde::Serialize;
use std::sync::Arc;

/// Where the entities of a view came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewOrigin {
    Primary,
    Fallback,
    Remote,
}

impl From<StoreSource> for ViewOrigin {
    fn from(source: StoreSource) -> Self {
        match source {
            StoreSource::Primary => Self::Primary,
            StoreSource::Fallback => Self::Fallback,
        }
    }
}

/// Result of a reconciled read.
///
/// `error` is a non-fatal error state: the entities are still the best data
/// available, and the caller may offer a retry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciledView {
    pub kind: EntityKind,
    pub entities: EntityCollection,
    pub origin: ViewOrigin,
    pub error: Option<AppError>,
}

impl ReconciledView {
    fn local(kind: EntityKind, entities: EntityCollection, origin: ViewOrigin) -> Self {
        Self {
            kind,
            entities,
            origin,
            error: None,
        }
    }

    fn with_error(mut self, error: AppError) -> Self {
        self.error = Some(error);
        self
    }
}

/// Merge a remote collection with a local one.
///
/// Remote entities come first in remote order, followed by local entities
/// whose ids the remote set lacks, in local order. On an id collision the
/// remote entity wins.
pub fn merge(remote: &EntityCollection, local: &EntityCollection) -> EntityCollection {
    remote
        .iter()
        .cloned()
        .chain(local.iter().filter(|e| !remote.contains(&e.id)).cloned())
        .collect()
}

pub struct Reconciler {
    store: LocalStore,
    fetcher: Arc<RemoteFetcher>,
    bus: InvalidationBus,
}

impl Reconciler {
    pub fn new(store: LocalStore, fetcher: Arc<RemoteFetcher>, bus: InvalidationBus) -> Self {
        Self {
            store,
            fetcher,
            bus,
        }
    }

    pub async fn load_settings(&self) -> SyncSettings {
        load_settings(&self.store).await
    }

    /// Reconciled entities of `kind`. Never fails; problems land in `error`.
    pub async fn read(&self, kind: EntityKind) -> ReconciledView {
        let (local, local_error) = match self.store.get(kind).await {
            Ok(served) => (
                ReconciledView::local(kind, served.value, served.source.into()),
                None,
            ),
            Err(e) => (
                ReconciledView::local(kind, EntityCollection::new(), ViewOrigin::Fallback),
                Some(e),
            ),
        };

        let settings = self.load_settings().await;
        let params = match FetchParams::from_settings(&settings) {
            Some(params) if settings.remote_enabled_for(kind) && local.entities.is_empty() => {
                params
            }
            _ => {
                return match local_error {
                    Some(e) => local.with_error(e),
                    None => local,
                }
            }
        };

        log::info!(
            "[reconcile] No local {} data, fetching from project {}",
            kind,
            params.project_key
        );
        let remote = match self.fetcher.fetch(kind, &params).await {
            Ok(remote) => remote,
            Err(e) => {
                log::warn!("[reconcile] Remote {} fetch failed, serving local: {}", kind, e);
                return local.with_error(e);
            }
        };
        if remote.is_empty() {
            return match local_error {
                Some(e) => local.with_error(e),
                None => local,
            };
        }

        self.seed(kind, remote).await
    }

    /// Persist a fetched collection once and return it merged with whatever
    /// local entities appeared while the fetch was in flight.
    async fn seed(&self, kind: EntityKind, remote: EntityCollection) -> ReconciledView {
        let current = match self.store.get(kind).await {
            Ok(served) => served.value,
            Err(_) => EntityCollection::new(),
        };
        let entities = merge(&remote, &current);
        let view = ReconciledView::local(kind, entities, ViewOrigin::Remote);

        // Only the remote entities are written; local-only ones are already stored.
        match self.store.seed(kind, &remote).await {
            Ok(source) => {
                log::info!(
                    "[reconcile] Seeded {} {}(s) into {:?} store",
                    remote.len(),
                    kind,
                    source
                );
                self.bus.publish(Topic::for_kind(kind));
                view
            }
            Err(e) => {
                log::error!("[reconcile] Could not persist fetched {}: {}", kind, e);
                view.with_error(e)
            }
        }
    }

    /// Drop cached remote results for `kind` and read again.
    pub async fn retry(&self, kind: EntityKind) -> ReconciledView {
        self.fetcher.invalidate(kind);
        self.read(kind).await
    }

    /// Project statistics, when secondary stats are enabled.
    pub async fn read_stats(&self) -> Result<Option<ProjectStats>, AppError> {
        let settings = self.load_settings().await;
        if !settings.stats_enabled() {
            return Ok(None);
        }
        let Some(params) = FetchParams::from_settings(&settings) else {
            return Ok(None);
        };
        self.fetcher.fetch_stats(&params).await.map(Some)
    }
}

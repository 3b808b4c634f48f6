//! Tracker Sync - local-first entity synchronization core.
//!
//! Keeps issues, projects, cycles and teams consistent between a primary
//! SQLite store, a session fallback store and a read-only tracker API, and
//! tells every mounted surface when the data it shows has changed.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

use config::AppConfig;
use error::AppError;
use models::EntityKind;
use services::{
    CommentService, EntityService, EntityStore, EntityView, FallbackStore, InvalidationBus,
    LocalStore, Reconciler, RemoteFetcher, RemoteSource, SessionStorage, SettingsService,
    SqliteEntityStore, TrackerClient,
};
use std::sync::Arc;

/// Fully wired services sharing one bus and one pair of stores.
#[derive(Clone)]
pub struct App {
    pub bus: InvalidationBus,
    pub store: LocalStore,
    pub fallback: Arc<FallbackStore>,
    pub fetcher: Arc<RemoteFetcher>,
    pub reconciler: Arc<Reconciler>,
    pub entities: EntityService,
    pub comments: CommentService,
    pub settings: SettingsService,
}

impl App {
    /// Wire services over already opened stores.
    pub fn new(
        store: LocalStore,
        fallback: Arc<FallbackStore>,
        source: Arc<dyn RemoteSource>,
        config: &AppConfig,
    ) -> Self {
        let bus = InvalidationBus::new();
        let fetcher = Arc::new(RemoteFetcher::new(source, config.retry, config.cache));
        let reconciler = Arc::new(Reconciler::new(
            store.clone(),
            Arc::clone(&fetcher),
            bus.clone(),
        ));

        Self {
            entities: EntityService::new(store.clone(), bus.clone()),
            comments: CommentService::new(store.clone(), bus.clone()),
            settings: SettingsService::new(store.clone(), bus.clone()),
            bus,
            store,
            fallback,
            fetcher,
            reconciler,
        }
    }

    /// Mount a live view of `kind`.
    pub async fn view(&self, kind: EntityKind) -> Arc<EntityView> {
        EntityView::mount(kind, Arc::clone(&self.reconciler), &self.bus).await
    }
}

/// Build the application against the configured tracker.
pub async fn bootstrap(config: AppConfig) -> Result<App, AppError> {
    let client = TrackerClient::new(config.remote.clone())?;
    Ok(bootstrap_with_source(&config, Arc::new(client)).await)
}

/// Build the application with an explicit remote source.
///
/// A database that fails to open is logged and replaced by a detached store,
/// so every read and write goes to the session fallback. Each bootstrap starts
/// a new session: fallback data left by an earlier run is discarded.
pub async fn bootstrap_with_source(config: &AppConfig, source: Arc<dyn RemoteSource>) -> App {
    let db_path = db::get_db_path(&config.data_dir);
    let primary = match db::initialize(&db_path).await {
        Ok(pool) => {
            log::info!("[store] Database ready at {}", db_path.display());
            SqliteEntityStore::new(pool)
        }
        Err(e) => {
            log::error!(
                "[store] Failed to initialize database at {}, using session store only: {}",
                db_path.display(),
                e
            );
            SqliteEntityStore::detached()
        }
    };

    let fallback = Arc::new(FallbackStore::new(SessionStorage::new(config.session_dir())));
    if let Err(e) = fallback.clear().await {
        log::warn!("[store] Failed to clear previous session store: {}", e);
    }
    let store = LocalStore::new(
        Arc::new(primary),
        Arc::clone(&fallback) as Arc<dyn EntityStore>,
    );
    App::new(store, fallback, source, config)
}

//! Cross-surface invalidation tests.
//!
//! Two live views of the same kind stand in for two UI surfaces. A write
//! through one must mark the other stale, and a re-read must show it.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use tokio::sync::Notify;
use tracker_sync::config::AppConfig;
use tracker_sync::error::AppError;
use tracker_sync::models::{
    Entity, EntityCollection, EntityKind, Fields, ProjectStats, SyncSettings,
};
use tracker_sync::services::{EntityView, FetchParams, RemoteSource, Topic};
use tracker_sync::App;

/// Tracker whose fetches block until released.
struct SlowTracker {
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl RemoteSource for SlowTracker {
    async fn fetch_entities(
        &self,
        _kind: EntityKind,
        _params: &FetchParams,
    ) -> Result<EntityCollection, AppError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(vec![Entity::new("CORE-1", Fields::new(), 0)].into())
    }

    async fn fetch_stats(&self, _params: &FetchParams) -> Result<ProjectStats, AppError> {
        Ok(ProjectStats::default())
    }
}

fn fields(value: serde_json::Value) -> Fields {
    value.as_object().cloned().unwrap()
}

async fn setup_app(dir: &std::path::Path) -> (App, Arc<SlowTracker>) {
    let tracker = Arc::new(SlowTracker {
        entered: Notify::new(),
        release: Notify::new(),
    });
    let config = AppConfig {
        data_dir: dir.to_path_buf(),
        ..AppConfig::default()
    };
    let app = tracker_sync::bootstrap_with_source(&config, tracker.clone()).await;
    (app, tracker)
}

#[tokio::test]
async fn test_write_in_one_surface_refreshes_the_other() {
    let dir = tempdir().unwrap();
    let (app, _tracker) = setup_app(dir.path()).await;

    let board = app.view(EntityKind::Issue).await;
    let sidebar = app.view(EntityKind::Issue).await;
    assert!(!board.is_stale());
    assert!(sidebar.current().unwrap().entities.is_empty());

    let created = app
        .entities
        .create(EntityKind::Issue, fields(json!({"title": "From the board"})))
        .await
        .unwrap();

    assert!(board.is_stale());
    assert!(sidebar.is_stale());
    tokio::time::timeout(Duration::from_secs(1), sidebar.changed())
        .await
        .unwrap();

    let refreshed = sidebar.refresh_if_stale().await.unwrap();
    assert_eq!(refreshed.entities.ids(), vec![created.id.as_str()]);
    assert!(!sidebar.is_stale());
}

#[tokio::test]
async fn test_views_only_hear_their_own_topic() {
    let dir = tempdir().unwrap();
    let (app, _tracker) = setup_app(dir.path()).await;

    let teams = app.view(EntityKind::Team).await;
    app.entities
        .create(EntityKind::Cycle, fields(json!({"name": "Sprint 4"})))
        .await
        .unwrap();
    assert!(!teams.is_stale());
    assert_eq!(app.bus.subscriber_count(Topic::Teams), 1);
}

#[tokio::test]
async fn test_unmount_detaches_and_discards_in_flight_result() {
    let dir = tempdir().unwrap();
    let (app, tracker) = setup_app(dir.path()).await;
    app.settings
        .update(&SyncSettings {
            remote_sync_enabled: true,
            project_key: Some("CORE".to_string()),
            ..SyncSettings::default()
        })
        .await
        .unwrap();

    let view = EntityView::new(EntityKind::Issue, Arc::clone(&app.reconciler), &app.bus);
    assert_eq!(app.bus.subscriber_count(Topic::Issues), 1);

    let in_flight = {
        let view = Arc::clone(&view);
        tokio::spawn(async move { view.refresh().await })
    };
    tracker.entered.notified().await;

    view.unmount();
    assert_eq!(app.bus.subscriber_count(Topic::Issues), 0);
    tracker.release.notify_one();

    assert!(in_flight.await.unwrap().is_none());
    assert!(view.current().is_none());
    assert!(view.refresh().await.is_none());

    // The fetch itself still completed and seeded the store.
    let stored = app.store.get(EntityKind::Issue).await.unwrap().value;
    assert_eq!(stored.ids(), vec!["CORE-1"]);
}

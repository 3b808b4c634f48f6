//! Entity store contract and the primary SQLite implementation.
//!
//! Stores never swallow failures: every storage problem comes back as a
//! `StoreError` so the caller can fall back deterministically. There are no
//! retries at this layer.

use crate::db::entities::{self, EntityRow};
use crate::db::pool::DbPool;
use crate::db::settings;
use crate::models::{Entity, EntityCollection, EntityKind, Fields};
use async_trait::async_trait;
use thiserror::Error;

/// Store-layer errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store not initialized")]
    NotInitialized,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Persistent key/value store of entity collections and settings.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// The whole collection of `kind`, in insertion order.
    async fn get(&self, kind: EntityKind) -> Result<EntityCollection, StoreError>;

    /// Shallow-merge `patch` into entity `id`, creating it if absent, and stamp `updated_at`.
    async fn put(&self, kind: EntityKind, id: &str, patch: &Fields) -> Result<Entity, StoreError>;

    /// Upsert whole entities as given, keeping their own timestamps.
    async fn seed(&self, kind: EntityKind, entities: &EntityCollection) -> Result<(), StoreError>;

    async fn get_setting(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set_setting(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// Get the current Unix timestamp.
pub(crate) fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Merge a patch into an optional existing entity.
pub(crate) fn merge_patch(existing: Option<Entity>, id: &str, patch: &Fields, now: i64) -> Entity {
    let mut entity = existing.unwrap_or_else(|| Entity::new(id, Fields::new(), now));
    entity.apply_patch(patch, now);
    entity
}

/// Primary entity store backed by SQLite.
///
/// A store created with [`SqliteEntityStore::detached`] has no database and
/// fails every call with `StoreError::NotInitialized`.
#[derive(Debug, Clone)]
pub struct SqliteEntityStore {
    pool: Option<DbPool>,
}

impl SqliteEntityStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool: Some(pool) }
    }

    /// A store whose database never came up.
    pub fn detached() -> Self {
        Self { pool: None }
    }

    pub fn is_initialized(&self) -> bool {
        self.pool.is_some()
    }

    fn pool(&self) -> Result<&DbPool, StoreError> {
        self.pool.as_ref().ok_or(StoreError::NotInitialized)
    }
}

fn decode_rows(kind: EntityKind, rows: Vec<EntityRow>) -> EntityCollection {
    rows.into_iter()
        .filter_map(|row| {
            let id = row.id.clone();
            match row.into_entity() {
                Ok(entity) => Some(entity),
                Err(e) => {
                    log::warn!("[store] Skipping malformed {} row {}: {}", kind, id, e);
                    None
                }
            }
        })
        .collect()
}

#[async_trait]
impl EntityStore for SqliteEntityStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn get(&self, kind: EntityKind) -> Result<EntityCollection, StoreError> {
        let rows = entities::list_entities(self.pool()?, kind).await?;
        Ok(decode_rows(kind, rows))
    }

    async fn put(&self, kind: EntityKind, id: &str, patch: &Fields) -> Result<Entity, StoreError> {
        let mut tx = self.pool()?.begin().await?;

        let existing = match entities::get_entity(&mut *tx, kind, id).await? {
            Some(row) => Some(row.into_entity()?),
            None => None,
        };
        let entity = merge_patch(existing, id, patch, now());
        entities::upsert_entity(&mut *tx, kind, &entity).await?;

        tx.commit().await?;
        Ok(entity)
    }

    async fn seed(
        &self,
        kind: EntityKind,
        collection: &EntityCollection,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool()?.begin().await?;
        for entity in collection.iter() {
            entities::upsert_entity(&mut *tx, kind, entity).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_setting(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(settings::get_setting(self.pool()?, key).await?)
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        settings::set_setting(self.pool()?, key, value, now()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use serde_json::json;
    use tempfile::tempdir;

    async fn setup_store() -> (tempfile::TempDir, SqliteEntityStore) {
        let dir = tempdir().unwrap();
        let pool = db::initialize(&db::get_db_path(dir.path())).await.unwrap();
        (dir, SqliteEntityStore::new(pool))
    }

    fn patch(value: serde_json::Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_put_creates_then_merges() {
        let (_dir, store) = setup_store().await;

        let created = store
            .put(EntityKind::Issue, "ISS-1", &patch(json!({"title": "Crash", "status": "todo"})))
            .await
            .unwrap();
        assert!(created.updated_at.is_some());

        let updated = store
            .put(EntityKind::Issue, "ISS-1", &patch(json!({"status": "done"})))
            .await
            .unwrap();
        assert_eq!(updated.str_field("title"), Some("Crash"));
        assert_eq!(updated.str_field("status"), Some("done"));
        assert_eq!(updated.created_at, created.created_at);

        let issues = store.get(EntityKind::Issue).await.unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues.get("ISS-1").unwrap(), &updated);
    }

    #[tokio::test]
    async fn test_get_keeps_insertion_order_and_kind_isolation() {
        let (_dir, store) = setup_store().await;

        for id in ["b", "a", "c"] {
            store.put(EntityKind::Team, id, &Fields::new()).await.unwrap();
        }
        store.put(EntityKind::Team, "a", &patch(json!({"name": "x"}))).await.unwrap();
        store.put(EntityKind::Cycle, "z", &Fields::new()).await.unwrap();

        let teams = store.get(EntityKind::Team).await.unwrap();
        assert_eq!(teams.ids(), vec!["b", "a", "c"]);
        assert_eq!(store.get(EntityKind::Cycle).await.unwrap().ids(), vec!["z"]);
        assert!(store.get(EntityKind::Issue).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_seed_preserves_timestamps() {
        let (_dir, store) = setup_store().await;

        let mut remote = Entity::new("P1", patch(json!({"name": "Core"})), 1_700_000_000);
        remote.updated_at = Some(1_700_000_100);
        let collection: EntityCollection = vec![remote.clone()].into();

        store.seed(EntityKind::Project, &collection).await.unwrap();
        let projects = store.get(EntityKind::Project).await.unwrap();
        assert_eq!(projects.get("P1").unwrap(), &remote);
    }

    #[tokio::test]
    async fn test_settings_round_trip() {
        let (_dir, store) = setup_store().await;

        assert_eq!(store.get_setting("project_key").await.unwrap(), None);
        store.set_setting("project_key", "CORE").await.unwrap();
        store.set_setting("project_key", "OPS").await.unwrap();
        assert_eq!(
            store.get_setting("project_key").await.unwrap().as_deref(),
            Some("OPS")
        );
    }

    #[tokio::test]
    async fn test_detached_store_fails_every_call() {
        let store = SqliteEntityStore::detached();
        assert!(matches!(
            store.get(EntityKind::Issue).await,
            Err(StoreError::NotInitialized)
        ));
        assert!(store.put(EntityKind::Issue, "x", &Fields::new()).await.is_err());
        assert!(store.get_setting("k").await.is_err());
    }

    #[tokio::test]
    async fn test_closed_pool_surfaces_error() {
        let (_dir, store) = setup_store().await;
        store.pool().unwrap().close().await;

        let result = store.put(EntityKind::Issue, "ISS-1", &Fields::new()).await;
        assert!(matches!(result, Err(StoreError::Database(_))));
    }
}

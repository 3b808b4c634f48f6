//! Session-scoped fallback store.
//!
//! A flat string-keyed map persisted as one file per key. Each value is a
//! serialized entity collection, so every write is a whole-collection
//! read-modify-write. Only used when the primary store fails.

use crate::models::{Entity, EntityCollection, EntityKind, Fields};
use crate::services::entity_store::{merge_patch, now, EntityStore, StoreError};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Prefix for setting keys, keeping them apart from collection keys.
const SETTING_PREFIX: &str = "setting:";

/// Flat `get_item`/`set_item` storage in a session directory.
#[derive(Debug, Clone)]
pub struct SessionStorage {
    dir: PathBuf,
}

impl SessionStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn item_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", urlencoding::encode(key)))
    }

    /// Raw value for `key`, `None` when it was never set.
    pub async fn get_item(&self, key: &str) -> Result<Option<String>, std::io::Error> {
        match tokio::fs::read_to_string(self.item_path(key)).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Replace the value for `key`. Written to a uniquely named temp file
    /// first, then renamed, so concurrent writers never share a temp path.
    pub async fn set_item(&self, key: &str, value: &str) -> Result<(), std::io::Error> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.item_path(key);
        let tmp = path.with_extension(format!("json.{}.tmp", Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, value).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e);
        }
        Ok(())
    }

    /// Drop every item; the session starts over empty.
    pub async fn clear(&self) -> Result<(), std::io::Error> {
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Fallback implementation of [`EntityStore`] over [`SessionStorage`].
#[derive(Debug)]
pub struct FallbackStore {
    storage: SessionStorage,
    write_lock: Mutex<()>,
}

impl FallbackStore {
    pub fn new(storage: SessionStorage) -> Self {
        Self {
            storage,
            write_lock: Mutex::new(()),
        }
    }

    pub fn storage(&self) -> &SessionStorage {
        &self.storage
    }

    /// End the session, discarding everything written so far.
    pub async fn clear(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        self.storage.clear().await?;
        Ok(())
    }

    /// Read a collection. Unparsable content counts as empty.
    async fn read_collection(&self, kind: EntityKind) -> Result<EntityCollection, StoreError> {
        let key = kind.collection_key();
        let Some(raw) = self.storage.get_item(key).await? else {
            return Ok(EntityCollection::new());
        };

        match serde_json::from_str::<EntityCollection>(&raw) {
            Ok(collection) => Ok(collection),
            Err(e) => {
                log::warn!(
                    "[store] Fallback collection '{}' is malformed, treating as empty: {}",
                    key,
                    e
                );
                Ok(EntityCollection::new())
            }
        }
    }

    async fn write_collection(
        &self,
        kind: EntityKind,
        collection: &EntityCollection,
    ) -> Result<(), StoreError> {
        let raw = serde_json::to_string(collection)?;
        self.storage.set_item(kind.collection_key(), &raw).await?;
        Ok(())
    }
}

#[async_trait]
impl EntityStore for FallbackStore {
    fn name(&self) -> &'static str {
        "session"
    }

    async fn get(&self, kind: EntityKind) -> Result<EntityCollection, StoreError> {
        self.read_collection(kind).await
    }

    async fn put(&self, kind: EntityKind, id: &str, patch: &Fields) -> Result<Entity, StoreError> {
        let _guard = self.write_lock.lock().await;

        let mut collection = self.read_collection(kind).await?;
        let entity = merge_patch(collection.get(id).cloned(), id, patch, now());
        collection.insert(entity.clone());
        self.write_collection(kind, &collection).await?;

        Ok(entity)
    }

    async fn seed(&self, kind: EntityKind, entities: &EntityCollection) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;

        let mut collection = self.read_collection(kind).await?;
        for entity in entities.iter() {
            collection.insert(entity.clone());
        }
        self.write_collection(kind, &collection).await
    }

    async fn get_setting(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .storage
            .get_item(&format!("{}{}", SETTING_PREFIX, key))
            .await?)
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        self.storage
            .set_item(&format!("{}{}", SETTING_PREFIX, key), value)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn patch(value: serde_json::Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let dir = tempdir().unwrap();
        let store = FallbackStore::new(SessionStorage::new(dir.path().join("session")));

        assert!(store.get(EntityKind::Issue).await.unwrap().is_empty());

        store
            .put(EntityKind::Issue, "ISS-1", &patch(json!({"title": "a", "status": "todo"})))
            .await
            .unwrap();
        store
            .put(EntityKind::Issue, "ISS-2", &patch(json!({"title": "b"})))
            .await
            .unwrap();
        let merged = store
            .put(EntityKind::Issue, "ISS-1", &patch(json!({"status": "done"})))
            .await
            .unwrap();
        assert_eq!(merged.str_field("title"), Some("a"));

        let issues = store.get(EntityKind::Issue).await.unwrap();
        assert_eq!(issues.ids(), vec!["ISS-1", "ISS-2"]);
        assert_eq!(issues.get("ISS-1").unwrap().str_field("status"), Some("done"));
    }

    #[tokio::test]
    async fn test_malformed_collection_reads_as_empty() {
        let dir = tempdir().unwrap();
        let storage = SessionStorage::new(dir.path());
        storage.set_item("issues", "{not json").await.unwrap();

        let store = FallbackStore::new(storage);
        assert!(store.get(EntityKind::Issue).await.unwrap().is_empty());

        // The next write replaces the broken value.
        store.put(EntityKind::Issue, "ISS-1", &Fields::new()).await.unwrap();
        assert_eq!(store.get(EntityKind::Issue).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_settings_do_not_collide_with_collections() {
        let dir = tempdir().unwrap();
        let store = FallbackStore::new(SessionStorage::new(dir.path()));

        store.set_setting("issues", "x").await.unwrap();
        assert!(store.get(EntityKind::Issue).await.unwrap().is_empty());
        assert_eq!(store.get_setting("issues").await.unwrap().as_deref(), Some("x"));
    }

    #[tokio::test]
    async fn test_clear_ends_session() {
        let dir = tempdir().unwrap();
        let store = FallbackStore::new(SessionStorage::new(dir.path().join("session")));
        store.put(EntityKind::Team, "t1", &Fields::new()).await.unwrap();

        store.clear().await.unwrap();
        assert!(store.get(EntityKind::Team).await.unwrap().is_empty());
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_setting_writes_all_succeed() {
        let dir = tempdir().unwrap();
        let store = std::sync::Arc::new(FallbackStore::new(SessionStorage::new(dir.path())));

        let writers: Vec<_> = (0..20)
            .map(|i| {
                let store = std::sync::Arc::clone(&store);
                tokio::spawn(async move {
                    store.set_setting("project_key", &format!("P{}", i)).await
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap().unwrap();
        }

        let value = store.get_setting("project_key").await.unwrap().unwrap();
        assert!(value.starts_with('P'));
        // No temp files are left behind.
        let mut entries = std::fs::read_dir(dir.path()).unwrap();
        assert!(entries.all(|e| !e.unwrap().file_name().to_string_lossy().ends_with(".tmp")));
    }

    #[tokio::test]
    async fn test_concurrent_item_writes_do_not_share_temp_files() {
        let dir = tempdir().unwrap();
        let storage = SessionStorage::new(dir.path());

        let (a, b) = tokio::join!(
            storage.set_item("k", "\"a\""),
            storage.set_item("k", "\"b\"")
        );
        a.unwrap();
        b.unwrap();
        let value = storage.get_item("k").await.unwrap().unwrap();
        assert!(value == "\"a\"" || value == "\"b\"");
    }
}

//! Entity create/update path.
//!
//! Writes go through the local store (primary, else fallback). A completed
//! write publishes exactly one invalidation for its kind.

use crate::error::AppError;
use crate::models::{Entity, EntityKind, Fields};
use crate::services::invalidation::{InvalidationBus, Topic};
use crate::services::local_store::{LocalStore, StoreSource};

#[derive(Clone)]
pub struct EntityService {
    store: LocalStore,
    bus: InvalidationBus,
}

impl EntityService {
    pub fn new(store: LocalStore, bus: InvalidationBus) -> Self {
        Self { store, bus }
    }

    /// Create a local entity with a fresh UUID.
    pub async fn create(&self, kind: EntityKind, fields: Fields) -> Result<Entity, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        self.write(kind, &id, &fields).await
    }

    /// Shallow-merge `patch` into entity `id`.
    pub async fn update(
        &self,
        kind: EntityKind,
        id: &str,
        patch: &Fields,
    ) -> Result<Entity, AppError> {
        if id.trim().is_empty() {
            return Err(AppError::invalid_input_field("Entity id is required", "id"));
        }
        self.write(kind, id, patch).await
    }

    async fn write(&self, kind: EntityKind, id: &str, patch: &Fields) -> Result<Entity, AppError> {
        let served = self.store.put(kind, id, patch).await.map_err(|e| {
            log::error!("[mutation] Failed to write {} {}: {}", kind, id, e);
            AppError::mutation_failed_for(e.to_string(), id)
        })?;

        if served.source == StoreSource::Fallback {
            log::info!("[mutation] Wrote {} {} to fallback store", kind, id);
        }
        self.bus.publish(Topic::for_kind(kind));
        Ok(served.value)
    }
}

//! Primary-then-fallback store adapter.
//!
//! Every operation goes to the primary store first. If it errors, the failure
//! is logged and the same operation is replayed against the fallback store.
//! Only when both fail does the caller see an error.

use crate::error::AppError;
use crate::models::{Entity, EntityCollection, EntityKind, Fields};
use crate::services::entity_store::{EntityStore, StoreError};
use serde::Serialize;
use std::sync::Arc;

/// Which store served an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreSource {
    Primary,
    Fallback,
}

/// A value together with the store that produced it.
#[derive(Debug, Clone)]
pub struct Served<T> {
    pub value: T,
    pub source: StoreSource,
}

impl<T> Served<T> {
    fn primary(value: T) -> Self {
        Self {
            value,
            source: StoreSource::Primary,
        }
    }

    fn fallback(value: T) -> Self {
        Self {
            value,
            source: StoreSource::Fallback,
        }
    }
}

/// Local persistence with automatic fallback.
#[derive(Clone)]
pub struct LocalStore {
    primary: Arc<dyn EntityStore>,
    fallback: Arc<dyn EntityStore>,
}

impl LocalStore {
    pub fn new(primary: Arc<dyn EntityStore>, fallback: Arc<dyn EntityStore>) -> Self {
        Self { primary, fallback }
    }

    fn degrade(&self, operation: &str, err: &StoreError) {
        log::warn!(
            "[store] {} on {} store failed, using {} store: {}",
            operation,
            self.primary.name(),
            self.fallback.name(),
            err
        );
    }

    fn both_failed(&self, operation: &str, primary: StoreError, fallback: StoreError) -> AppError {
        log::error!(
            "[store] {} failed on both stores ({}: {}; {}: {})",
            operation,
            self.primary.name(),
            primary,
            self.fallback.name(),
            fallback
        );
        AppError::store_unavailable(format!(
            "{} failed: {}; fallback: {}",
            operation, primary, fallback
        ))
    }

    pub async fn get(&self, kind: EntityKind) -> Result<Served<EntityCollection>, AppError> {
        let op = format!("get {}", kind);
        match self.primary.get(kind).await {
            Ok(collection) => Ok(Served::primary(collection)),
            Err(e) => {
                self.degrade(&op, &e);
                self.fallback
                    .get(kind)
                    .await
                    .map(Served::fallback)
                    .map_err(|fe| self.both_failed(&op, e, fe))
            }
        }
    }

    pub async fn put(
        &self,
        kind: EntityKind,
        id: &str,
        patch: &Fields,
    ) -> Result<Served<Entity>, AppError> {
        let op = format!("put {} {}", kind, id);
        match self.primary.put(kind, id, patch).await {
            Ok(entity) => Ok(Served::primary(entity)),
            Err(e) => {
                self.degrade(&op, &e);
                self.fallback
                    .put(kind, id, patch)
                    .await
                    .map(Served::fallback)
                    .map_err(|fe| self.both_failed(&op, e, fe))
            }
        }
    }

    pub async fn seed(
        &self,
        kind: EntityKind,
        entities: &EntityCollection,
    ) -> Result<StoreSource, AppError> {
        let op = format!("seed {}", kind);
        match self.primary.seed(kind, entities).await {
            Ok(()) => Ok(StoreSource::Primary),
            Err(e) => {
                self.degrade(&op, &e);
                self.fallback
                    .seed(kind, entities)
                    .await
                    .map(|()| StoreSource::Fallback)
                    .map_err(|fe| self.both_failed(&op, e, fe))
            }
        }
    }

    pub async fn get_setting(&self, key: &str) -> Result<Option<String>, AppError> {
        let op = format!("get setting {}", key);
        match self.primary.get_setting(key).await {
            Ok(value) => Ok(value),
            Err(e) => {
                self.degrade(&op, &e);
                self.fallback
                    .get_setting(key)
                    .await
                    .map_err(|fe| self.both_failed(&op, e, fe))
            }
        }
    }

    pub async fn set_setting(&self, key: &str, value: &str) -> Result<StoreSource, AppError> {
        let op = format!("set setting {}", key);
        match self.primary.set_setting(key, value).await {
            Ok(()) => Ok(StoreSource::Primary),
            Err(e) => {
                self.degrade(&op, &e);
                self.fallback
                    .set_setting(key, value)
                    .await
                    .map(|()| StoreSource::Fallback)
                    .map_err(|fe| self.both_failed(&op, e, fe))
            }
        }
    }
}

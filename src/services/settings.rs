//! Sync configuration service.
//!
//! Settings are read fresh on every load and written one durable key at a
//! time, so a crash between keys leaves each key either old or new.

use crate::error::AppError;
use crate::models::sync_settings::{
    FETCH_SECONDARY_STATS_KEY, MAX_RESULTS_KEY, PROJECT_KEY_KEY, PROXY_URL_KEY,
    REMOTE_SYNC_ENABLED_KEY,
};
use crate::models::SyncSettings;
use crate::services::invalidation::{InvalidationBus, Topic};
use crate::services::local_store::LocalStore;
use std::collections::HashMap;

const SETTING_KEYS: [&str; 5] = [
    REMOTE_SYNC_ENABLED_KEY,
    PROJECT_KEY_KEY,
    PROXY_URL_KEY,
    FETCH_SECONDARY_STATS_KEY,
    MAX_RESULTS_KEY,
];

/// Read the stored sync configuration. Unreadable keys take their defaults.
pub async fn load_settings(store: &LocalStore) -> SyncSettings {
    let mut stored = HashMap::new();
    for key in SETTING_KEYS {
        match store.get_setting(key).await {
            Ok(Some(value)) => {
                stored.insert(key, value);
            }
            Ok(None) => {}
            Err(e) => log::warn!("[settings] Could not read {}, using default: {}", key, e),
        }
    }
    SyncSettings::from_stored(|key| stored.get(key).cloned())
}

#[derive(Clone)]
pub struct SettingsService {
    store: LocalStore,
    bus: InvalidationBus,
}

impl SettingsService {
    pub fn new(store: LocalStore, bus: InvalidationBus) -> Self {
        Self { store, bus }
    }

    pub async fn load(&self) -> SyncSettings {
        load_settings(&self.store).await
    }

    /// Persist every field, then publish one settings invalidation.
    pub async fn update(&self, settings: &SyncSettings) -> Result<(), AppError> {
        if settings.max_results == 0 {
            return Err(AppError::invalid_input_field(
                "max_results must be positive",
                "max_results",
            ));
        }

        for (key, value) in settings.to_stored() {
            self.store.set_setting(key, &value).await.map_err(|e| {
                log::error!("[settings] Failed to save {}: {}", key, e);
                AppError::mutation_failed_for(e.to_string(), key)
            })?;
        }

        log::info!(
            "[settings] Saved sync settings (remote sync {})",
            if settings.remote_sync_enabled { "on" } else { "off" }
        );
        self.bus.publish(Topic::Settings);
        Ok(())
    }
}

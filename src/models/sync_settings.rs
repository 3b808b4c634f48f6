//! Sync configuration persisted in the settings table.
//!
//! Every field lives under its own durable key; there is no in-memory-only copy.

use crate::models::entity::EntityKind;
use serde::{Deserialize, Serialize};

pub const REMOTE_SYNC_ENABLED_KEY: &str = "remote_sync_enabled";
pub const PROJECT_KEY_KEY: &str = "project_key";
pub const PROXY_URL_KEY: &str = "proxy_url";
pub const FETCH_SECONDARY_STATS_KEY: &str = "fetch_secondary_stats";
pub const MAX_RESULTS_KEY: &str = "max_results";

/// Page cap used when no `max_results` setting is stored.
pub const DEFAULT_MAX_RESULTS: u32 = 50;

/// Remote sync settings, read at mount time by any surface that needs them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSettings {
    /// Whether the tracker API may be used to seed empty collections.
    pub remote_sync_enabled: bool,

    /// Tracker project key (e.g. `CORE`).
    pub project_key: Option<String>,

    /// Base URL override for the tracker API.
    pub proxy_url: Option<String>,

    /// Whether project statistics are fetched alongside entities.
    pub fetch_secondary_stats: bool,

    /// Single-page cap on fetched entities.
    pub max_results: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            remote_sync_enabled: false,
            project_key: None,
            proxy_url: None,
            fetch_secondary_stats: false,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }
}

impl SyncSettings {
    /// Build settings from raw stored values; missing or unparsable values take defaults.
    pub fn from_stored(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            remote_sync_enabled: lookup(REMOTE_SYNC_ENABLED_KEY)
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.remote_sync_enabled),
            project_key: lookup(PROJECT_KEY_KEY).and_then(non_blank),
            proxy_url: lookup(PROXY_URL_KEY).and_then(non_blank),
            fetch_secondary_stats: lookup(FETCH_SECONDARY_STATS_KEY)
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.fetch_secondary_stats),
            max_results: lookup(MAX_RESULTS_KEY)
                .and_then(|v| v.trim().parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_results),
        }
    }

    /// Key/value pairs to persist, one durable key per field.
    pub fn to_stored(&self) -> Vec<(&'static str, String)> {
        vec![
            (REMOTE_SYNC_ENABLED_KEY, self.remote_sync_enabled.to_string()),
            (PROJECT_KEY_KEY, self.project_key.clone().unwrap_or_default()),
            (PROXY_URL_KEY, self.proxy_url.clone().unwrap_or_default()),
            (
                FETCH_SECONDARY_STATS_KEY,
                self.fetch_secondary_stats.to_string(),
            ),
            (MAX_RESULTS_KEY, self.max_results.to_string()),
        ]
    }

    /// Whether the reconciler may call the tracker for `kind`.
    pub fn remote_enabled_for(&self, kind: EntityKind) -> bool {
        self.remote_sync_enabled && self.project_key.is_some() && kind.is_remote_backed()
    }

    /// Whether secondary statistics should be fetched.
    pub fn stats_enabled(&self) -> bool {
        self.remote_sync_enabled && self.project_key.is_some() && self.fetch_secondary_stats
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim(), "true" | "1" | "yes" | "on")
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_when_nothing_stored() {
        let settings = SyncSettings::from_stored(|_| None);
        assert_eq!(settings, SyncSettings::default());
        assert!(!settings.remote_enabled_for(EntityKind::Issue));
    }

    #[test]
    fn test_round_trip_through_stored_values() {
        let settings = SyncSettings {
            remote_sync_enabled: true,
            project_key: Some("CORE".to_string()),
            proxy_url: Some("http://localhost:8010/proxy".to_string()),
            fetch_secondary_stats: true,
            max_results: 25,
        };
        let stored: HashMap<&str, String> = settings.to_stored().into_iter().collect();
        let loaded = SyncSettings::from_stored(|k| stored.get(k).cloned());
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_remote_requires_project_key_and_backed_kind() {
        let mut settings = SyncSettings {
            remote_sync_enabled: true,
            ..SyncSettings::default()
        };
        assert!(!settings.remote_enabled_for(EntityKind::Issue));

        settings.project_key = Some("CORE".to_string());
        assert!(settings.remote_enabled_for(EntityKind::Issue));
        assert!(settings.remote_enabled_for(EntityKind::Project));
        assert!(!settings.remote_enabled_for(EntityKind::Team));
        assert!(!settings.stats_enabled());
    }

    #[test]
    fn test_blank_and_invalid_values_fall_back() {
        let settings = SyncSettings::from_stored(|k| match k {
            PROJECT_KEY_KEY => Some("   ".to_string()),
            MAX_RESULTS_KEY => Some("zero".to_string()),
            REMOTE_SYNC_ENABLED_KEY => Some("1".to_string()),
            _ => None,
        });
        assert!(settings.remote_sync_enabled);
        assert_eq!(settings.project_key, None);
        assert_eq!(settings.max_results, DEFAULT_MAX_RESULTS);
    }
}

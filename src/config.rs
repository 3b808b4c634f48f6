//! Process-level configuration.
//!
//! Runtime sync settings (project key, remote toggle, ...) live in the
//! settings table instead; see [`crate::models::SyncSettings`].

use crate::services::query_cache::CachePolicy;
use crate::services::remote_fetcher::RetryPolicy;
use crate::services::tracker_client::TrackerClientConfig;
use std::path::PathBuf;

pub const DATA_DIR_ENV: &str = "TRACKER_DATA_DIR";
pub const BASE_URL_ENV: &str = "TRACKER_BASE_URL";
pub const EMAIL_ENV: &str = "TRACKER_EMAIL";
pub const API_TOKEN_ENV: &str = "TRACKER_API_TOKEN";

/// Session directory name under the data directory.
const SESSION_DIR: &str = "session";

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Directory holding `tracker.db` and the fallback session.
    pub data_dir: PathBuf,

    pub remote: TrackerClientConfig,

    pub retry: RetryPolicy,

    pub cache: CachePolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".tracker"),
            remote: TrackerClientConfig::default(),
            retry: RetryPolicy::default(),
            cache: CachePolicy::default(),
        }
    }
}

impl AppConfig {
    /// Defaults overridden by `TRACKER_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(dir) = get(DATA_DIR_ENV) {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(url) = get(BASE_URL_ENV) {
            config.remote.base_url = url;
        }
        config.remote.email = get(EMAIL_ENV);
        config.remote.api_token = get(API_TOKEN_ENV);
        config
    }

    pub fn session_dir(&self) -> PathBuf {
        self.data_dir.join(SESSION_DIR)
    }
}

//! Application error types.
//!
//! These errors are serializable so that a UI surface can render them as a
//! non-fatal error state (with a retry action where it applies).

use serde::Serialize;
use thiserror::Error;

/// Application-level errors surfaced by the sync services.
///
/// All variants serialize to a structured JSON object for frontend consumption.
#[derive(Debug, Clone, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {message}")]
    Database { message: String },

    /// Both the primary and the fallback store rejected an operation.
    #[error("Store unavailable: {message}")]
    StoreUnavailable { message: String },

    /// Tracker API request failed with a non-success status.
    #[error("Tracker API error: {message}")]
    TrackerApi {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        status_code: Option<u16>,
        #[serde(skip_serializing_if = "Option::is_none")]
        endpoint: Option<String>,
    },

    /// Network request failed.
    #[error("Network error: {message}")]
    Network { message: String },

    /// Credentials missing, invalid, or rejected by the tracker.
    #[error("Authentication error: {message}")]
    Authentication { message: String },

    /// Remote fetch gave up after exhausting its retries.
    #[error("Remote fetch failed after {attempts} attempt(s): {message}")]
    RemoteFetchFailed {
        message: String,
        attempts: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        status_code: Option<u16>,
    },

    /// A local write could not be persisted anywhere.
    #[error("Mutation failed: {message}")]
    MutationFailed {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        entity_id: Option<String>,
    },

    /// Requested resource not found.
    #[error("Not found: {resource}")]
    NotFound {
        resource: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },

    /// Invalid input provided.
    #[error("Invalid input: {message}")]
    InvalidInput {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        field: Option<String>,
    },

    /// Internal application error.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AppError {
    /// Create a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    /// Create a store-unavailable error.
    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            message: message.into(),
        }
    }

    /// Create a tracker API error.
    pub fn tracker_api(message: impl Into<String>) -> Self {
        Self::TrackerApi {
            message: message.into(),
            status_code: None,
            endpoint: None,
        }
    }

    /// Create a tracker API error with status code and endpoint.
    pub fn tracker_api_full(
        message: impl Into<String>,
        status_code: u16,
        endpoint: impl Into<String>,
    ) -> Self {
        Self::TrackerApi {
            message: message.into(),
            status_code: Some(status_code),
            endpoint: Some(endpoint.into()),
        }
    }

    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Wrap the last error seen by the fetcher once retries are exhausted.
    pub fn remote_fetch_failed(last: &AppError, attempts: u32) -> Self {
        Self::RemoteFetchFailed {
            message: last.to_string(),
            attempts,
            status_code: last.status_code(),
        }
    }

    /// Create a mutation-failed error.
    pub fn mutation_failed(message: impl Into<String>) -> Self {
        Self::MutationFailed {
            message: message.into(),
            entity_id: None,
        }
    }

    /// Create a mutation-failed error for a specific entity.
    pub fn mutation_failed_for(message: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self::MutationFailed {
            message: message.into(),
            entity_id: Some(entity_id.into()),
        }
    }

    /// Create a not found error.
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: None,
        }
    }

    /// Create a not found error with ID.
    pub fn not_found_with_id(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: Some(id.into()),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            field: None,
        }
    }

    /// Create an invalid input error with field name.
    pub fn invalid_input_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Check if this is an authentication error.
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// Whether a fetcher should try the request again.
    ///
    /// Authentication failures and malformed input won't fix themselves.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::TrackerApi { status_code, .. } => {
                !matches!(status_code, Some(400) | Some(404))
            }
            _ => false,
        }
    }

    /// HTTP status code carried by the error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::TrackerApi { status_code, .. } | Self::RemoteFetchFailed { status_code, .. } => {
                *status_code
            }
            _ => None,
        }
    }
}

// Conversions from common error types

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::database(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::network("Request timed out")
        } else if err.is_connect() {
            Self::network("Failed to connect to server")
        } else if err.is_status() {
            Self::tracker_api(format!("HTTP error: {}", err))
        } else {
            Self::network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal(format!("JSON error: {}", err))
    }
}

impl From<crate::db::DbError> for AppError {
    fn from(err: crate::db::DbError) -> Self {
        Self::database(err.to_string())
    }
}

impl From<crate::services::entity_store::StoreError> for AppError {
    fn from(err: crate::services::entity_store::StoreError) -> Self {
        Self::store_unavailable(err.to_string())
    }
}

//! Data models for the application.
//!
//! These models represent the entities kept in the local stores and the
//! values handed to UI surfaces.

pub mod comment;
pub mod entity;
pub mod project_stats;
pub mod sync_settings;

// Re-exports for convenient access
pub use comment::{Comment, CommentThread, Reaction};
pub use entity::{Entity, EntityCollection, EntityKind, Fields};
pub use project_stats::ProjectStats;
pub use sync_settings::SyncSettings;

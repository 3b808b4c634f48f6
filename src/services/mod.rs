//! Sync services.
//!
//! Stores, the remote fetcher, the reconciler, the invalidation bus and the
//! mutation paths built on them. Nothing here depends on a UI toolkit.

pub mod comments;
pub mod entity_store;
pub mod fallback_store;
pub mod invalidation;
pub mod live_view;
pub mod local_store;
pub mod mutations;
pub mod query_cache;
pub mod reconciler;
pub mod remote_fetcher;
pub mod settings;
pub mod tracker_client;

pub use comments::CommentService;
pub use entity_store::{EntityStore, SqliteEntityStore, StoreError};
pub use fallback_store::{FallbackStore, SessionStorage};
pub use invalidation::{InvalidationBus, Subscription, Topic};
pub use live_view::EntityView;
pub use local_store::{LocalStore, StoreSource};
pub use mutations::EntityService;
pub use reconciler::{merge, ReconciledView, Reconciler, ViewOrigin};
pub use remote_fetcher::{FetchParams, RemoteFetcher, RemoteSource, RetryPolicy};
pub use settings::SettingsService;
pub use tracker_client::{TrackerClient, TrackerClientConfig};

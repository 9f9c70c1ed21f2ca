//! appcache-updater - Staleness-driven refresh service for offline application caches
//!
//! The service keeps a durable registry of cached resources, each with the
//! location it is refreshed from and the time of its last successful refresh.
//! A periodic reconciliation cycle walks the registry and refreshes every
//! entry whose last update is older than the staleness frequency, strictly
//! one at a time.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`registry`] - Public API: add/remove entries, enable/disable updates
//! - [`scheduler`] - Staleness policy, reconciliation cycle and timer
//! - [`refresh`] - Refresh backends (HTTP, scripted mock)
//! - [`storage`] - Entry store trait with SQLite and in-memory stores
//! - [`events`] - Topic-based event bus for completion notifications
//! - [`config`] - Configuration management and settings
//! - [`utils`] - Clock abstraction, retry, helpers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use appcache_updater::config::Config;
//! use appcache_updater::refresh::HttpRefreshBackend;
//! use appcache_updater::registry::UpdateRegistry;
//! use appcache_updater::storage::SqliteEntryStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let store = Arc::new(SqliteEntryStore::new(&config.storage.sqlite_path));
//!     let backend = Arc::new(HttpRefreshBackend::new(config.http_backend_config())?);
//!
//!     let registry = UpdateRegistry::from_config(&config, store, backend)?;
//!     registry.init().await?;
//!     registry.enable().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod refresh;
pub mod registry;
pub mod scheduler;
pub mod storage;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{AppcacheErrorTrait, Error, ErrorCategory, Result};
    pub use crate::events::{EventBus, SubscriptionToken, Topic, UpdateEvent};
    pub use crate::refresh::{RefreshBackend, RefreshOutcome, RefreshState, UpdateHandle};
    pub use crate::registry::UpdateRegistry;
    pub use crate::scheduler::{CycleReport, CycleState, StalenessPolicy};
    pub use crate::storage::{EntryStore, TrackedEntry};
}

// Direct re-exports for convenience
pub use error::{Error, Result};
pub use registry::UpdateRegistry;
pub use storage::TrackedEntry;

//! Durable registry of tracked cache entries
//!
//! This module defines the record kept for every offline application cache
//! and the store abstraction the scheduler reads and writes through.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              UpdateRegistry / Reconciler                    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    EntryStore trait                         │
//! │   open / get / insert / put / touch / delete / iterate_all  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                ┌─────────────┴─────────────┐
//!                ▼                           ▼
//!      ┌─────────────────┐         ┌─────────────────┐
//!      │     SQLite      │         │    In-memory    │
//!      │ SqliteEntryStore│         │MemoryEntryStore │
//!      └─────────────────┘         └─────────────────┘
//! ```
//!
//! Records are keyed by `resource_id`; a store never holds two records with
//! the same identifier.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memory::MemoryEntryStore;
pub use sqlite::SqliteEntryStore;

// ============================================================================
// Core Types
// ============================================================================

/// A registered cache subject to periodic staleness checking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedEntry {
    /// Unique identifier of the cached resource (e.g. a manifest URI)
    pub resource_id: String,

    /// Location the refresh is performed from (e.g. a document URI)
    pub source_location: String,

    /// Milliseconds since epoch of the last successful refresh, 0 if never
    pub last_update: i64,
}

impl TrackedEntry {
    /// Create a new entry
    pub fn new(
        resource_id: impl Into<String>,
        source_location: impl Into<String>,
        last_update: i64,
    ) -> Self {
        Self {
            resource_id: resource_id.into(),
            source_location: source_location.into(),
            last_update,
        }
    }

    /// Check if the entry has ever been refreshed
    pub fn is_never_refreshed(&self) -> bool {
        self.last_update <= 0
    }

    /// Last update as a UTC datetime, `None` for never-refreshed entries
    pub fn last_update_at(&self) -> Option<DateTime<Utc>> {
        if self.is_never_refreshed() {
            return None;
        }
        Utc.timestamp_millis_opt(self.last_update).single()
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors raised by entry stores
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be opened
    #[error("Failed to open entry store '{location}': {reason}")]
    Open { location: String, reason: String },

    /// A read (get or iteration) failed
    #[error("Failed to read entry store: {0}")]
    Read(String),

    /// A write (insert, put or delete) failed
    #[error("Failed to write entry store: {0}")]
    Write(String),

    /// An entry with this identifier already exists
    #[error("Entry already exists: {0}")]
    Duplicate(String),

    /// No entry with this identifier exists
    #[error("Entry not found: {0}")]
    NotFound(String),
}

impl StoreError {
    /// Check if the error is caused by store availability rather than caller input
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Open { .. } | Self::Read(_) | Self::Write(_))
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

// ============================================================================
// Store Trait
// ============================================================================

/// Durable mapping from resource identifier to tracked entry
///
/// Implementations open lazily: every operation opens the store on first use
/// and reuses the same handle afterwards.
#[async_trait]
pub trait EntryStore: Send + Sync {
    /// Open the store. Idempotent once open.
    async fn open(&self) -> StoreResult<()>;

    /// Get one entry
    async fn get(&self, resource_id: &str) -> StoreResult<TrackedEntry>;

    /// Insert a new entry, failing with `Duplicate` if the identifier exists
    async fn insert(&self, entry: &TrackedEntry) -> StoreResult<()>;

    /// Insert or replace an entry keyed by its identifier
    async fn put(&self, entry: &TrackedEntry) -> StoreResult<()>;

    /// Set `last_update` on an existing entry in one step.
    ///
    /// Fails with `NotFound` when no entry has this identifier; never creates
    /// a record.
    async fn touch(&self, resource_id: &str, last_update: i64) -> StoreResult<()>;

    /// Delete an entry, returning the removed record
    async fn delete(&self, resource_id: &str) -> StoreResult<TrackedEntry>;

    /// All entries in key order
    async fn iterate_all(&self) -> StoreResult<Vec<TrackedEntry>>;

    /// Number of stored entries
    async fn count(&self) -> StoreResult<usize> {
        Ok(self.iterate_all().await?.len())
    }
}
